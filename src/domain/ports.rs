use super::balance::BalanceObservation;
use super::profit::{NewProfitReport, ProfitReport};
use super::worker::{SpawnedWorker, WorkerId, WorkerSpec};
use crate::error::{BalanceError, LedgerError, SupervisorError};
use async_trait::async_trait;
use std::sync::Arc;

/// Looks up what a monitored address has received.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch(&self, label: &str) -> Result<BalanceObservation, BalanceError>;
}

/// Launches and terminates the external worker.
///
/// Implementations report termination of every spawned worker exactly once,
/// through the exit channel they were constructed with.
#[async_trait]
pub trait WorkerSupervisor: Send + Sync {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<SpawnedWorker, SupervisorError>;
    /// Asks the worker to shut down gracefully. Does not wait for it to exit.
    async fn signal_stop(&self, worker: WorkerId) -> Result<(), SupervisorError>;
    async fn force_kill(&self, worker: WorkerId) -> Result<(), SupervisorError>;
}

#[async_trait]
pub trait ProfitLedger: Send + Sync {
    async fn record(&self, report: NewProfitReport) -> Result<ProfitReport, LedgerError>;
    async fn all(&self) -> Result<Vec<ProfitReport>, LedgerError>;
}

pub type BalanceSourceBox = Box<dyn BalanceSource>;
pub type SupervisorRef = Arc<dyn WorkerSupervisor>;
pub type ProfitLedgerBox = Box<dyn ProfitLedger>;
