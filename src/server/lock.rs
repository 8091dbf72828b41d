use std::process::{Command, Stdio};
use tracing::debug;

use crate::message::ComputerStatus;

/// Focused-window titles shown while the session is locked, one per supported locale.
pub const LOCK_SCREEN_TITLES: [&str; 2] = [
    "Windows-Standardsperrbildschirm",
    "Windows Default Lock Screen",
];

pub trait LockStateDetector {
    /// Evaluated fresh on every call.
    fn is_locked(&self) -> bool;

    fn status(&self) -> ComputerStatus {
        ComputerStatus::from_locked(self.is_locked())
    }
}

/// Result of a single lock probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
    /// No focused window, or a title that isn't text. Treated as unlocked.
    Undetermined,
}

impl LockState {
    pub fn from_title(title: Option<&[u8]>) -> Self {
        let Some(raw) = title else {
            return LockState::Undetermined;
        };
        match std::str::from_utf8(raw) {
            Ok(title) if LOCK_SCREEN_TITLES.iter().any(|t| *t == title) => LockState::Locked,
            Ok(_) => LockState::Unlocked,
            Err(_) => LockState::Undetermined,
        }
    }

    pub fn is_locked(self) -> bool {
        matches!(self, LockState::Locked)
    }
}

/// Source of the title of the currently focused top-level window.
pub trait FocusedWindow {
    fn focused_title(&self) -> Option<Vec<u8>>;
}

pub struct TitleDetector<W> {
    window: W,
}

impl<W: FocusedWindow> TitleDetector<W> {
    pub fn new(window: W) -> Self {
        Self { window }
    }

    pub fn probe(&self) -> LockState {
        let title = self.window.focused_title();
        let state = LockState::from_title(title.as_deref());
        if state == LockState::Undetermined {
            debug!("Could not determine focused window, assuming unlocked");
        }
        state
    }
}

impl<W: FocusedWindow> LockStateDetector for TitleDetector<W> {
    fn is_locked(&self) -> bool {
        self.probe().is_locked()
    }
}

/// Asks an external program for the focused window title, e.g.
/// `xdotool getactivewindow getwindowname`.
#[derive(Debug, Clone)]
pub struct FocusCommand {
    program: String,
    args: Vec<String>,
}

impl FocusCommand {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .stdout(Stdio::piped());
        cmd
    }
}

impl FocusedWindow for FocusCommand {
    fn focused_title(&self) -> Option<Vec<u8>> {
        let output = match self.command().output() {
            Ok(output) => output,
            Err(e) => {
                debug!(program = %self.program, error = %e, "Failed to run focus command");
                return None;
            }
        };
        if !output.status.success() {
            debug!(program = %self.program, code = ?output.status.code(), "Focus command failed");
            return None;
        }
        Some(strip_line_ending(output.stdout))
    }
}

fn strip_line_ending(mut raw: Vec<u8>) -> Vec<u8> {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    raw
}
