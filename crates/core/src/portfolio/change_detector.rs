//! Balance change detection between two portfolio snapshots.
//!
//! Used by the refresh engine to decide whether an expected external change
//! (an incoming transfer, a swap) has become visible upstream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::portfolio_model::Portfolio;
use crate::constants::{FIAT_EPSILON, NATIVE_EPSILON};

/// What counts as "the balance changed".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ChangeBasis {
    /// Native total or fiat total moved beyond its epsilon.
    ///
    /// Fiat totals also move with prices, so a price tick alone can read as
    /// a change.
    #[default]
    Totals,
    /// Native total moved beyond its epsilon, or any token amount moved by at
    /// least one unit of that token's precision. Fiat values are ignored.
    Holdings,
}

/// Compares snapshots according to a [`ChangeBasis`] and fixed epsilons.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    basis: ChangeBasis,
    native_epsilon: Decimal,
    fiat_epsilon: Decimal,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(ChangeBasis::Totals, NATIVE_EPSILON, FIAT_EPSILON)
    }
}

impl ChangeDetector {
    pub fn new(basis: ChangeBasis, native_epsilon: Decimal, fiat_epsilon: Decimal) -> Self {
        Self {
            basis,
            native_epsilon,
            fiat_epsilon,
        }
    }

    pub fn basis(&self) -> ChangeBasis {
        self.basis
    }

    /// Returns true when `current` differs from `previous` beyond noise.
    ///
    /// A missing previous snapshot is compared as an empty wallet.
    pub fn has_changed(&self, previous: Option<&Portfolio>, current: &Portfolio) -> bool {
        let empty = Portfolio::empty();
        let previous = previous.unwrap_or(&empty);

        let native_delta = (current.total_native_value - previous.total_native_value).abs();
        if native_delta > self.native_epsilon {
            return true;
        }

        match self.basis {
            ChangeBasis::Totals => {
                let fiat_delta = (current.total_fiat_value - previous.total_fiat_value).abs();
                fiat_delta > self.fiat_epsilon
            }
            ChangeBasis::Holdings => holdings_changed(previous, current),
        }
    }
}

fn holdings_changed(previous: &Portfolio, current: &Portfolio) -> bool {
    let before: HashMap<&str, _> = previous
        .tokens
        .iter()
        .map(|t| (t.mint.as_str(), t))
        .collect();
    let after: HashMap<&str, _> = current
        .tokens
        .iter()
        .map(|t| (t.mint.as_str(), t))
        .collect();

    for (mint, token) in &after {
        match before.get(mint) {
            Some(old) => {
                let unit = token.unit().min(old.unit());
                if (token.amount - old.amount).abs() >= unit {
                    return true;
                }
            }
            None if !token.amount.is_zero() => return true,
            None => {}
        }
    }

    before
        .iter()
        .any(|(mint, token)| !after.contains_key(mint) && !token.amount.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::TokenBalance;
    use rust_decimal_macros::dec;

    fn token(mint: &str, amount: Decimal, price: Decimal) -> TokenBalance {
        TokenBalance {
            mint: mint.to_string(),
            symbol: mint.to_uppercase(),
            amount,
            price,
            native_value: Decimal::ZERO,
            fiat_value: amount * price,
            image: None,
            link: None,
            decimals: 6,
        }
    }

    #[test]
    fn test_totals_within_epsilon_are_unchanged() {
        let detector = ChangeDetector::default();
        let before = Portfolio::new(dec!(1.0), dec!(150.00), vec![]);
        let after = Portfolio::new(dec!(1.000004), dec!(150.004), vec![]);

        assert!(!detector.has_changed(Some(&before), &after));
    }

    #[test]
    fn test_native_delta_is_a_change() {
        let detector = ChangeDetector::default();
        let before = Portfolio::new(dec!(1.0), dec!(150.0), vec![]);
        let after = Portfolio::new(dec!(1.5), dec!(150.0), vec![]);

        assert!(detector.has_changed(Some(&before), &after));
    }

    #[test]
    fn test_fiat_drift_counts_under_totals_basis_only() {
        let before = Portfolio::new(dec!(1.0), dec!(150.0), vec![token("bonk", dec!(10), dec!(1))]);
        let after = Portfolio::new(dec!(1.0), dec!(152.5), vec![token("bonk", dec!(10), dec!(1.25))]);

        let totals = ChangeDetector::default();
        assert!(totals.has_changed(Some(&before), &after));

        let holdings = ChangeDetector::new(ChangeBasis::Holdings, NATIVE_EPSILON, FIAT_EPSILON);
        assert!(!holdings.has_changed(Some(&before), &after));
    }

    #[test]
    fn test_holdings_basis_detects_token_amount_change() {
        let holdings = ChangeDetector::new(ChangeBasis::Holdings, NATIVE_EPSILON, FIAT_EPSILON);
        let before = Portfolio::new(dec!(1.0), dec!(150.0), vec![token("usdc", dec!(10), dec!(1))]);
        let after = Portfolio::new(dec!(1.0), dec!(150.0), vec![token("usdc", dec!(10.000001), dec!(1))]);
        let noise = Portfolio::new(dec!(1.0), dec!(150.0), vec![token("usdc", dec!(10.0000001), dec!(1))]);

        assert!(holdings.has_changed(Some(&before), &after));
        assert!(!holdings.has_changed(Some(&before), &noise));
    }

    #[test]
    fn test_holdings_basis_detects_new_and_removed_mints() {
        let holdings = ChangeDetector::new(ChangeBasis::Holdings, NATIVE_EPSILON, FIAT_EPSILON);
        let before = Portfolio::new(dec!(1.0), dec!(0), vec![token("usdc", dec!(10), dec!(1))]);
        let added = Portfolio::new(
            dec!(1.0),
            dec!(0),
            vec![token("usdc", dec!(10), dec!(1)), token("jup", dec!(3), dec!(1))],
        );
        let removed = Portfolio::new(dec!(1.0), dec!(0), vec![]);

        assert!(holdings.has_changed(Some(&before), &added));
        assert!(holdings.has_changed(Some(&before), &removed));
    }

    #[test]
    fn test_missing_previous_compares_against_empty() {
        let detector = ChangeDetector::default();

        assert!(!detector.has_changed(None, &Portfolio::empty()));
        assert!(detector.has_changed(None, &Portfolio::new(dec!(0.5), dec!(75), vec![])));
    }
}
