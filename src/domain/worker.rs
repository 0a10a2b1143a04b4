use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// What to launch when the gate opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl WorkerSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Supervisor-assigned identifier, unique for the life of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// What a supervisor reports back after a successful spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedWorker {
    pub id: WorkerId,
    pub pid: Option<u32>,
}

/// Opaque reference to a spawned worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerHandle {
    pub id: WorkerId,
    /// OS process ID, absent for workers that are not real processes.
    pub pid: Option<u32>,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
}

/// Notification that a worker terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker: WorkerId,
    /// Exit status, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl WorkerExit {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}
