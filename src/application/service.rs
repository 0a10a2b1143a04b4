use super::controller::GatedProcessController;
use crate::domain::balance::BalanceObservation;
use crate::domain::policy::{SplitPolicy, VerificationResult};
use crate::domain::ports::{BalanceSource, BalanceSourceBox, ProfitLedgerBox};
use crate::domain::profit::{self, NewProfitReport, ProfitReport};
use crate::domain::state::ControllerState;
use crate::domain::verifier::PaymentVerifier;
use crate::domain::worker::WorkerHandle;
use crate::error::{BalanceError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

/// Fetches a fresh observation for every label in `policy`.
///
/// Any failed lookup aborts the whole fetch; verifying a partial set would
/// treat the missing labels as unpaid.
pub async fn fetch_observations(
    source: &dyn BalanceSource,
    policy: &SplitPolicy,
) -> Result<Vec<BalanceObservation>, BalanceError> {
    let mut observations = Vec::with_capacity(policy.shares.len());
    for label in policy.labels() {
        observations.push(source.fetch(label).await?);
    }
    Ok(observations)
}

#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    pub state: ControllerState,
    pub worker: Option<WorkerHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfitSummary {
    pub reports: Vec<ProfitReport>,
    pub total: Decimal,
}

/// Entry point used by the HTTP layer and the CLI.
///
/// Fetches balances, runs verification and drives the controller. The
/// controller itself never performs network I/O.
pub struct GateService {
    policy: SplitPolicy,
    balances: BalanceSourceBox,
    controller: GatedProcessController,
    ledger: ProfitLedgerBox,
}

impl GateService {
    pub fn new(
        policy: SplitPolicy,
        balances: BalanceSourceBox,
        controller: GatedProcessController,
        ledger: ProfitLedgerBox,
    ) -> Self {
        Self {
            policy,
            balances,
            controller,
            ledger,
        }
    }

    pub fn policy(&self) -> &SplitPolicy {
        &self.policy
    }

    pub fn controller(&self) -> &GatedProcessController {
        &self.controller
    }

    pub async fn observe(&self) -> Result<Vec<BalanceObservation>> {
        Ok(fetch_observations(self.balances.as_ref(), &self.policy).await?)
    }

    pub async fn verify(&self) -> Result<VerificationResult> {
        let observations = self.observe().await?;
        Ok(PaymentVerifier::verify(&observations, &self.policy))
    }

    #[instrument(skip(self))]
    pub async fn start(&self, caller: &str) -> Result<WorkerHandle> {
        let observations = self.observe().await?;
        let handle = self
            .controller
            .request_start(caller, &self.policy, &observations)
            .await?;
        Ok(handle)
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, caller: &str) -> Result<()> {
        self.controller.request_stop(caller).await?;
        Ok(())
    }

    pub async fn status(&self) -> GateStatus {
        GateStatus {
            state: self.controller.current_state(),
            worker: self.controller.current_worker().await,
        }
    }

    pub async fn report_profit(&self, report: NewProfitReport) -> Result<ProfitReport> {
        let report = self.ledger.record(report).await?;
        info!(
            id = report.id,
            amount = %report.amount.value(),
            currency = %report.currency,
            reported_by = %report.reported_by,
            "profit reported"
        );
        Ok(report)
    }

    pub async fn profits(&self) -> Result<ProfitSummary> {
        let reports = self.ledger.all().await?;
        let total = profit::total(&reports);
        Ok(ProfitSummary { reports, total })
    }
}
