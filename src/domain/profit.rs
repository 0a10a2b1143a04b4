use super::balance::{Amount, Currency};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A profit figure reported by hand for the bot's trading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitReport {
    pub id: u64,
    pub amount: Amount,
    pub currency: Currency,
    pub note: Option<String>,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
}

/// A profit report that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProfitReport {
    pub amount: Amount,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_reporter")]
    pub reported_by: String,
}

fn default_reporter() -> String {
    "anonymous".to_string()
}

impl NewProfitReport {
    pub fn into_report(self, id: u64, reported_at: DateTime<Utc>) -> ProfitReport {
        ProfitReport {
            id,
            amount: self.amount,
            currency: self.currency,
            note: self.note.filter(|n| !n.trim().is_empty()),
            reported_by: self.reported_by,
            reported_at,
        }
    }
}

/// Sum of all report amounts.
pub fn total(reports: &[ProfitReport]) -> Decimal {
    reports.iter().map(|r| r.amount.value()).sum()
}
