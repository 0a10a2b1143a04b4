use crate::domain::policy::VerificationResult;
use crate::domain::state::ControllerState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML file at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by a [`BalanceSource`](crate::domain::ports::BalanceSource).
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("no address configured for label '{0}'")]
    NotConfigured(String),
    #[error("network error fetching balance for '{label}': {reason}")]
    NetworkError { label: String, reason: String },
}

impl BalanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::NetworkError { .. } => "network_error",
        }
    }
}

/// Errors raised by a [`WorkerSupervisor`](crate::domain::ports::WorkerSupervisor).
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("failed to signal worker: {0}")]
    Signal(String),
}

/// Rejections returned by the gated process controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("worker is already active (state: {0})")]
    AlreadyActive(ControllerState),
    #[error("no running worker to stop (state: {0})")]
    NotActive(ControllerState),
    #[error("payment not verified: {}", .0.reason.as_deref().unwrap_or("unknown"))]
    PaymentNotVerified(Box<VerificationResult>),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("stop signal failed: {0}")]
    SignalFailed(String),
}

impl ControllerError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive(_) => "already_active",
            Self::NotActive(_) => "not_active",
            Self::PaymentNotVerified(_) => "payment_not_verified",
            Self::SpawnFailed(_) => "spawn_failed",
            Self::SignalFailed(_) => "signal_failed",
        }
    }
}

/// Errors raised by a [`ProfitLedger`](crate::domain::ports::ProfitLedger).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors surfaced by the [`GateService`](crate::application::service::GateService).
#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T, E = GateError> = std::result::Result<T, E>;
