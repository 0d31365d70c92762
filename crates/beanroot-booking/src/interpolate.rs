//! Transaction interpolation.
//!
//! Fills in the posting left without an amount so the transaction balances,
//! and checks the ones that have none missing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use beanroot_core::{Amount, Options, Transaction};

/// Tolerance used for a currency no amount or option speaks for.
pub const FALLBACK_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Errors that can occur during interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InterpolationError {
    /// More than one posting is missing its amount.
    #[error("{count} postings are missing an amount; at most one can be inferred")]
    MultipleMissing {
        /// Number of postings without an amount.
        count: usize,
    },

    /// Transaction does not balance.
    #[error("transaction does not balance: residual {residual} {currency}")]
    DoesNotBalance {
        /// The unbalanced currency.
        currency: String,
        /// The residual amount.
        residual: Decimal,
    },

    /// A weight or a residual is too large for a decimal.
    #[error("amounts in {currency} are out of range")]
    Overflow {
        /// Currency whose sum overflowed, or the posting's units currency.
        currency: String,
    },
}

/// Sum of posting weights per currency.
///
/// Postings whose weight is not known yet (no units, or an unresolved cost)
/// are skipped.
pub fn calculate_residual(
    transaction: &Transaction,
) -> Result<BTreeMap<String, Decimal>, InterpolationError> {
    let mut residuals: BTreeMap<String, Decimal> = BTreeMap::new();
    for posting in &transaction.postings {
        let weight = posting.checked_weight().map_err(|_| InterpolationError::Overflow {
            currency: posting
                .units
                .as_ref()
                .map(|u| u.currency.clone())
                .unwrap_or_default(),
        })?;
        let Some(weight) = weight else {
            continue;
        };
        let residual = residuals.entry(weight.currency.clone()).or_default();
        *residual = residual
            .checked_add(weight.number)
            .ok_or(InterpolationError::Overflow {
                currency: weight.currency,
            })?;
    }
    Ok(residuals)
}

/// Per-currency tolerance for a transaction.
///
/// Half of the last written digit of the most coarsely written amount in
/// each currency. Integer amounts say nothing about precision and are
/// ignored.
#[must_use]
pub fn calculate_tolerance(transaction: &Transaction) -> BTreeMap<String, Decimal> {
    let mut tolerances: BTreeMap<String, Decimal> = BTreeMap::new();
    let amounts = transaction.postings.iter().flat_map(|p| {
        let cost_amount = p.cost.as_ref().and_then(|c| {
            let number = c.number_per.or(c.number_total)?;
            Some(Amount::new(number, c.currency.clone()?))
        });
        let price_amount = p.price.as_ref().map(|price| price.amount().clone());
        p.units.iter().cloned().chain(cost_amount).chain(price_amount)
    });
    for amount in amounts.filter(|a| a.number.scale() > 0) {
        let tolerance = amount.inferred_tolerance();
        tolerances
            .entry(amount.currency)
            .and_modify(|t| *t = (*t).max(tolerance))
            .or_insert(tolerance);
    }
    tolerances
}

/// Tolerance for `currency`, falling back to the ledger options.
fn tolerance_for(
    tolerances: &BTreeMap<String, Decimal>,
    currency: &str,
    options: &Options,
) -> Decimal {
    tolerances
        .get(currency)
        .copied()
        .or_else(|| options.default_tolerance(currency))
        .unwrap_or(FALLBACK_TOLERANCE)
}

/// True if every residual of `transaction` is within tolerance.
#[must_use]
pub fn is_balanced(transaction: &Transaction, options: &Options) -> bool {
    let tolerances = calculate_tolerance(transaction);
    calculate_residual(transaction).is_ok_and(|residuals| {
        residuals
            .iter()
            .all(|(currency, r)| r.abs() <= tolerance_for(&tolerances, currency, options))
    })
}

/// Fill in the missing amount of `transaction`.
///
/// A single posting without units absorbs every currency's residual; it is
/// split into one posting per currency, in currency order, and dropped if
/// nothing is left to absorb. Without such a posting the residuals must be
/// within tolerance.
pub fn interpolate(
    transaction: &Transaction,
    options: &Options,
) -> Result<Transaction, InterpolationError> {
    let missing: Vec<usize> = transaction
        .postings
        .iter()
        .enumerate()
        .filter(|(_, p)| p.units.is_none())
        .map(|(i, _)| i)
        .collect();

    let residuals = calculate_residual(transaction)?;

    match missing.as_slice() {
        [] => {
            let tolerances = calculate_tolerance(transaction);
            for (currency, residual) in &residuals {
                if residual.abs() > tolerance_for(&tolerances, currency, options) {
                    return Err(InterpolationError::DoesNotBalance {
                        currency: currency.clone(),
                        residual: *residual,
                    });
                }
            }
            Ok(transaction.clone())
        }
        [index] => {
            let template = &transaction.postings[*index];
            let filled = residuals
                .into_iter()
                .filter(|(_, r)| !r.is_zero())
                .map(|(currency, residual)| {
                    let mut posting = template.clone();
                    posting.units = Some(Amount::new(-residual, currency));
                    posting
                });
            let mut result = transaction.clone();
            result.postings.splice(*index..=*index, filled);
            Ok(result)
        }
        _ => Err(InterpolationError::MultipleMissing {
            count: missing.len(),
        }),
    }
}
