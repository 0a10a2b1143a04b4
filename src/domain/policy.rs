use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected proportional split of a payment across labeled recipients.
///
/// `shares` fractions are expected to sum to 1.0; configuration loading
/// validates this, and [`PaymentVerifier`](super::verifier::PaymentVerifier)
/// fails closed if it receives a policy that does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPolicy {
    pub shares: BTreeMap<String, Decimal>,
    /// Absolute deviation allowed between observed ratio and target share.
    pub tolerance: Decimal,
    pub minimum_total: Decimal,
}

impl SplitPolicy {
    pub fn new(
        shares: impl IntoIterator<Item = (String, Decimal)>,
        tolerance: Decimal,
        minimum_total: Decimal,
    ) -> Self {
        Self {
            shares: shares.into_iter().collect(),
            tolerance,
            minimum_total,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.shares.keys().map(String::as_str)
    }
}

/// Machine-readable reason for a negative verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationCode {
    /// An observed amount was negative or the amounts overflowed.
    InvalidObservation,
    PolicyMisconfigured,
    NoFundsObserved,
    BelowMinimum,
    ShareOutOfTolerance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub total_observed: Decimal,
    pub per_label_ratio: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<VerificationCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationResult {
    pub(crate) fn accepted(total: Decimal, ratios: BTreeMap<String, Decimal>) -> Self {
        Self {
            valid: true,
            total_observed: total,
            per_label_ratio: ratios,
            code: None,
            reason: None,
        }
    }

    pub(crate) fn rejected(
        total: Decimal,
        ratios: BTreeMap<String, Decimal>,
        code: VerificationCode,
        reason: String,
    ) -> Self {
        Self {
            valid: false,
            total_observed: total,
            per_label_ratio: ratios,
            code: Some(code),
            reason: Some(reason),
        }
    }
}
