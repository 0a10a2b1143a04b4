use super::balance::BalanceObservation;
use super::policy::{SplitPolicy, VerificationCode, VerificationResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Maximum distance from 1.0 the policy shares may sum to.
const SHARE_SUM_EPSILON: Decimal = dec!(0.000001);

/// Decides whether observed balances satisfy a [`SplitPolicy`].
///
/// Verification is pure arithmetic: it never fails, never mutates, and yields
/// the same result for the same inputs. Rejections are encoded in the
/// returned [`VerificationResult`].
pub struct PaymentVerifier;

impl PaymentVerifier {
    pub fn verify(
        observations: &[BalanceObservation],
        policy: &SplitPolicy,
    ) -> VerificationResult {
        // Duplicate reports for one label are summed, so an address funded
        // by several transactions verifies the same as a single payment.
        let mut by_label: BTreeMap<&str, Decimal> = BTreeMap::new();
        for obs in observations {
            if obs.amount < Decimal::ZERO {
                return Self::invalid_observation(format!(
                    "negative amount {} observed for '{}'",
                    obs.amount, obs.label
                ));
            }
            let entry = by_label.entry(obs.label.as_str()).or_default();
            let Some(sum) = entry.checked_add(obs.amount) else {
                return Self::invalid_observation(format!(
                    "amounts observed for '{}' overflow",
                    obs.label
                ));
            };
            *entry = sum;
        }
        let Some(total) = checked_sum(by_label.values().copied()) else {
            return Self::invalid_observation("total observed amount overflows".to_string());
        };

        let shares_balanced = checked_sum(policy.shares.values().copied())
            .and_then(|sum| sum.checked_sub(Decimal::ONE))
            .filter(|deviation| deviation.abs() <= SHARE_SUM_EPSILON);
        if shares_balanced.is_none() {
            let shares: Vec<String> = policy.shares.values().map(Decimal::to_string).collect();
            return VerificationResult::rejected(
                total,
                BTreeMap::new(),
                VerificationCode::PolicyMisconfigured,
                format!(
                    "policy misconfigured: shares [{}] do not sum to 1",
                    shares.join(", ")
                ),
            );
        }

        if total < policy.minimum_total {
            return VerificationResult::rejected(
                total,
                BTreeMap::new(),
                VerificationCode::BelowMinimum,
                format!(
                    "total received {total} BTC is below the required minimum of {} BTC",
                    policy.minimum_total
                ),
            );
        }

        if total.is_zero() {
            return VerificationResult::rejected(
                total,
                BTreeMap::new(),
                VerificationCode::NoFundsObserved,
                "no funds observed at any monitored address".to_string(),
            );
        }

        let ratios: BTreeMap<String, Decimal> = policy
            .shares
            .keys()
            .map(|label| {
                let amount = by_label.get(label.as_str()).copied().unwrap_or_default();
                (label.clone(), amount / total)
            })
            .collect();

        let offending: Vec<String> = policy
            .shares
            .iter()
            .filter_map(|(label, expected)| {
                let actual = ratios[label];
                ((actual - *expected).abs() > policy.tolerance).then(|| {
                    format!(
                        "{label} expected {} but received {}",
                        percent(*expected),
                        percent(actual)
                    )
                })
            })
            .collect();

        if offending.is_empty() {
            VerificationResult::accepted(total, ratios)
        } else {
            VerificationResult::rejected(
                total,
                ratios,
                VerificationCode::ShareOutOfTolerance,
                format!("split out of tolerance: {}", offending.join("; ")),
            )
        }
    }

    fn invalid_observation(reason: String) -> VerificationResult {
        VerificationResult::rejected(
            Decimal::ZERO,
            BTreeMap::new(),
            VerificationCode::InvalidObservation,
            reason,
        )
    }
}

fn percent(fraction: Decimal) -> String {
    match fraction.checked_mul(dec!(100)) {
        Some(p) => format!("{p:.2}%"),
        None => format!("{fraction} (as a fraction)"),
    }
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}
