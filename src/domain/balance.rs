use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of satoshis in one bitcoin.
pub const SATS_PER_BTC: Decimal = dec!(100000000);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Btc,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Btc => f.write_str("BTC"),
        }
    }
}

/// Represents a strictly positive monetary amount.
///
/// Used for manually reported profits, where a zero or negative value is
/// always an input mistake.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LedgerError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// The amount observed at one monitored address.
///
/// A snapshot taken fresh for every verification; never cached, since a
/// stale value could hide an underpayment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceObservation {
    pub label: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Currency,
}

impl BalanceObservation {
    pub fn btc(label: impl Into<String>, amount: Decimal) -> Self {
        Self {
            label: label.into(),
            amount,
            currency: Currency::Btc,
        }
    }

    /// Builds an observation from a satoshi count.
    pub fn from_sats(label: impl Into<String>, sats: u64) -> Self {
        Self::btc(label, Decimal::from(sats) / SATS_PER_BTC)
    }
}
