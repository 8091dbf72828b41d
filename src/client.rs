use tracing::debug;

use crate::message::ComputerStatus;
use crate::server::lock::LockState;
use crate::server::FocusArgs;

#[derive(Debug, serde::Serialize)]
pub struct StatusReport {
    /// Wire code of the status sent to the controller.
    pub status: ComputerStatus,
    pub determined: bool,
}

impl StatusReport {
    pub fn from_state(state: LockState) -> Self {
        Self {
            status: ComputerStatus::from_locked(state.is_locked()),
            determined: state != LockState::Undetermined,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            ComputerStatus::Locked => 1,
            ComputerStatus::Unlocked => 0,
        }
    }
}

/// Prints the current lock state. Returns the exit code: 1 when locked, 0 otherwise.
pub fn status(focus: FocusArgs, json: bool) -> anyhow::Result<i32> {
    let report = StatusReport::from_state(focus.detector().probe());
    debug!(?report, "Probed lock state");
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.determined {
        println!("{}", report.status);
    } else {
        println!("{} (focused window unknown)", report.status);
    }
    Ok(report.exit_code())
}
