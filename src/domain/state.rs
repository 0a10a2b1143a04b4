use super::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the gated worker.
///
/// `Starting` and `Stopping` are only left once the supervisor confirms the
/// transition, so a stop that has been signaled but not yet observed keeps
/// the controller busy and blocks a new start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl ControllerState {
    /// Whether a worker occupies the slot, including one being spawned.
    pub fn holds_worker(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// A single state change, broadcast to controller subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: ControllerState,
    pub to: ControllerState,
    pub worker: Option<WorkerId>,
}
