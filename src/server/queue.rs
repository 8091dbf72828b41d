use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::message::CommandKind;

/// Pending commands, read without blocking. `None` means nothing is pending.
pub trait CommandQueue {
    fn read_next(&self, kind: CommandKind) -> Option<String>;
}

/// Keeps only the most recent pending value per command kind.
#[derive(Clone, Debug, Default)]
pub struct LatestQueue {
    slots: Arc<Mutex<BTreeMap<CommandKind, String>>>,
}

impl LatestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` as the pending command of `kind`, returning any value it replaced.
    pub fn push(&self, kind: CommandKind, value: String) -> Option<String> {
        self.slots().insert(kind, value)
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<CommandKind, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandQueue for LatestQueue {
    fn read_next(&self, kind: CommandKind) -> Option<String> {
        self.slots().remove(&kind)
    }
}
