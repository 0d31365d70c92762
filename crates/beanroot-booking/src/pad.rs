//! Pad directive processing.
//!
//! A `pad` directive asks for a synthetic transaction that brings an account
//! to the amount asserted by its next `balance` directive. The transaction
//! transfers from the source account and is dated on the pad.
//!
//! ```beancount
//! 2024-01-01 pad Assets:Bank Equity:Opening-Balances
//! 2024-01-02 balance Assets:Bank 1000.00 USD
//! ```
//!
//! generates:
//!
//! ```beancount
//! 2024-01-01 P "(Padding inserted for balance assertion)"
//!   Assets:Bank             1000.00 USD
//!   Equity:Opening-Balances -1000.00 USD
//! ```
//!
//! A pad fills each currency at most once; a pad that never fills anything
//! is reported.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use beanroot_core::{account, Amount, Directive, Inventory, Pad, Posting, Transaction};

/// Narration of generated padding transactions.
pub const PADDING_NARRATION: &str = "(Padding inserted for balance assertion)";

/// Flag of generated padding transactions.
pub const PADDING_FLAG: char = 'P';

/// Error during pad processing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{date} pad {account}: {message}")]
pub struct PadError {
    /// Date of the pad.
    pub date: NaiveDate,
    /// Padded account.
    pub account: String,
    /// Error message.
    pub message: String,
}

/// Result of processing pad directives.
#[derive(Debug, Clone, Default)]
pub struct PadResult {
    /// Input directives with each padding transaction right after its pad.
    pub directives: Vec<Directive>,
    /// Unused pads.
    pub errors: Vec<PadError>,
}

struct PendingPad {
    index: usize,
    pad: Pad,
    filled: BTreeSet<String>,
}

/// Insert padding transactions into date-sorted `directives`.
pub fn process_pads(directives: Vec<Directive>) -> PadResult {
    let mut inventories: BTreeMap<String, Inventory> = BTreeMap::new();
    let mut pending: HashMap<String, PendingPad> = HashMap::new();
    let mut padding: BTreeMap<usize, Vec<Transaction>> = BTreeMap::new();
    let mut errors = Vec::new();

    for (index, directive) in directives.iter().enumerate() {
        match directive {
            Directive::Transaction(txn) => {
                for posting in &txn.postings {
                    if let Some(units) = &posting.units {
                        inventories
                            .entry(posting.account.clone())
                            .or_default()
                            .add(units, None);
                    }
                }
            }
            Directive::Pad(pad) => {
                let replaced = pending.insert(
                    pad.account.clone(),
                    PendingPad {
                        index,
                        pad: pad.clone(),
                        filled: BTreeSet::new(),
                    },
                );
                errors.extend(replaced.and_then(unused));
            }
            Directive::Balance(bal) => {
                let Some(pad) = pending.get_mut(&bal.account) else {
                    continue;
                };
                if !pad.filled.insert(bal.amount.currency.clone()) {
                    continue;
                }
                let current = units_under(&inventories, &bal.account, &bal.amount.currency);
                let Some(difference) = bal.amount.number.checked_sub(current) else {
                    errors.push(PadError {
                        date: pad.pad.date,
                        account: pad.pad.account.clone(),
                        message: format!("padding to {} is out of range", bal.amount),
                    });
                    continue;
                };
                if difference.is_zero() {
                    continue;
                }
                let amount = Amount::new(difference, bal.amount.currency.clone());
                inventories
                    .entry(pad.pad.account.clone())
                    .or_default()
                    .add(&amount, None);
                inventories
                    .entry(pad.pad.source_account.clone())
                    .or_default()
                    .add(&-&amount, None);
                padding
                    .entry(pad.index)
                    .or_default()
                    .push(padding_transaction(&pad.pad, amount));
            }
            _ => {}
        }
    }

    let mut leftover: Vec<PendingPad> = pending.into_values().collect();
    leftover.sort_by_key(|p| p.index);
    errors.extend(leftover.into_iter().filter_map(unused));

    let mut result = Vec::with_capacity(directives.len() + padding.len());
    for (index, directive) in directives.into_iter().enumerate() {
        result.push(directive);
        if let Some(txns) = padding.remove(&index) {
            result.extend(txns.into_iter().map(Directive::Transaction));
        }
    }

    PadResult {
        directives: result,
        errors,
    }
}

fn unused(pending: PendingPad) -> Option<PadError> {
    pending.filled.is_empty().then(|| PadError {
        date: pending.pad.date,
        account: pending.pad.account,
        message: "unused pad: no balance assertion follows it".to_string(),
    })
}

fn units_under(inventories: &BTreeMap<String, Inventory>, ancestor: &str, currency: &str) -> Decimal {
    inventories
        .range(ancestor.to_string()..)
        .take_while(|(name, _)| name.starts_with(ancestor))
        .filter(|(name, _)| account::is_under(name, ancestor))
        .fold(Decimal::ZERO, |total, (_, inv)| {
            total.saturating_add(inv.units(currency))
        })
}

fn padding_transaction(pad: &Pad, amount: Amount) -> Transaction {
    let mut txn = Transaction::new(pad.date, PADDING_NARRATION)
        .with_flag(PADDING_FLAG)
        .with_posting(Posting::new(&pad.account, amount.clone()))
        .with_posting(Posting::new(&pad.source_account, -amount));
    txn.meta = pad.meta.clone();
    txn
}
