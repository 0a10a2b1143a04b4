use crate::domain::balance::BalanceObservation;
use crate::domain::ports::{BalanceSource, ProfitLedger};
use crate::domain::profit::{NewProfitReport, ProfitReport};
use crate::error::{BalanceError, LedgerError};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A balance source backed by a shared map of label to BTC amount.
///
/// Labels that were never set are reported as `NotConfigured`, the same way
/// the block-explorer source treats labels without an address.
#[derive(Default, Clone)]
pub struct InMemoryBalanceSource {
    balances: Arc<RwLock<HashMap<String, Decimal>>>,
}

impl InMemoryBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            balances: Arc::new(RwLock::new(balances.into_iter().collect())),
        }
    }

    pub async fn set(&self, label: &str, amount: Decimal) {
        let mut balances = self.balances.write().await;
        balances.insert(label.to_string(), amount);
    }
}

#[async_trait]
impl BalanceSource for InMemoryBalanceSource {
    async fn fetch(&self, label: &str) -> Result<BalanceObservation, BalanceError> {
        let balances = self.balances.read().await;
        balances
            .get(label)
            .map(|amount| BalanceObservation::btc(label, *amount))
            .ok_or_else(|| BalanceError::NotConfigured(label.to_string()))
    }
}

/// A thread-safe in-memory profit ledger. Reports are lost on restart.
#[derive(Default, Clone)]
pub struct InMemoryProfitLedger {
    reports: Arc<RwLock<Vec<ProfitReport>>>,
}

impl InMemoryProfitLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfitLedger for InMemoryProfitLedger {
    async fn record(&self, report: NewProfitReport) -> Result<ProfitReport, LedgerError> {
        let mut reports = self.reports.write().await;
        let report = report.into_report(reports.len() as u64 + 1, Utc::now());
        reports.push(report.clone());
        Ok(report)
    }

    async fn all(&self) -> Result<Vec<ProfitReport>, LedgerError> {
        let reports = self.reports.read().await;
        Ok(reports.clone())
    }
}
