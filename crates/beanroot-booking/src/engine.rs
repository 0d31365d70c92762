//! Booking a whole ledger.
//!
//! Walks date-sorted directives, keeps one inventory per account and books
//! every posting with [`book`]. Postings that matched lots are rewritten to
//! carry the concrete lot cost, one posting per lot, so later stages see
//! complete weights.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use beanroot_core::{
    location_of, BookingMethod, CostSpec, Directive, Inventory, Location, NaiveDate, Posting,
    Transaction,
};

use crate::book::{book, BookingConfig, BookingError, BookingRequest};

/// A booking error with the transaction it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{date}: {error}")]
pub struct BookingFailure {
    /// Transaction date.
    pub date: NaiveDate,
    /// Where the transaction was written.
    pub location: Option<Location>,
    /// What went wrong.
    #[source]
    pub error: BookingError,
}

/// Booked directives and the errors found along the way.
#[derive(Debug, Clone, Default)]
pub struct BookedLedger {
    /// Directives with reducing postings split per lot.
    pub directives: Vec<Directive>,
    /// Postings that could not be booked cleanly.
    pub errors: Vec<BookingFailure>,
}

/// Per-account booking methods declared on `open` directives.
///
/// An unparseable method name is reported and falls back to `default`.
pub fn account_methods(
    directives: &[Directive],
    default: BookingMethod,
) -> (HashMap<String, BookingMethod>, Vec<BookingFailure>) {
    let mut methods = HashMap::new();
    let mut errors = Vec::new();
    for directive in directives {
        let Directive::Open(open) = directive else {
            continue;
        };
        let method = match open.booking.as_deref().map(str::parse::<BookingMethod>) {
            None => default,
            Some(Ok(method)) => method,
            Some(Err(_)) => {
                errors.push(BookingFailure {
                    date: open.date,
                    location: location_of(&open.meta),
                    error: BookingError::UnknownMethod {
                        account: open.account.clone(),
                        method: open.booking.clone().unwrap_or_default(),
                    },
                });
                default
            }
        };
        methods.insert(open.account.clone(), method);
    }
    (methods, errors)
}

/// Book every transaction of date-sorted `directives`.
pub fn book_transactions(directives: Vec<Directive>, config: &BookingConfig) -> BookedLedger {
    let (methods, mut errors) = account_methods(&directives, config.default_method);
    let mut inventories: HashMap<String, Inventory> = HashMap::new();

    let directives = directives
        .into_iter()
        .map(|directive| match directive {
            Directive::Transaction(txn) => Directive::Transaction(book_transaction(
                txn,
                &methods,
                &mut inventories,
                config,
                &mut errors,
            )),
            other => other,
        })
        .collect();

    debug!(
        accounts = inventories.len(),
        errors = errors.len(),
        "booked transactions"
    );
    BookedLedger { directives, errors }
}

fn book_transaction(
    mut txn: Transaction,
    methods: &HashMap<String, BookingMethod>,
    inventories: &mut HashMap<String, Inventory>,
    config: &BookingConfig,
    errors: &mut Vec<BookingFailure>,
) -> Transaction {
    let location = location_of(&txn.meta);
    let mut postings = Vec::with_capacity(txn.postings.len());
    for posting in std::mem::take(&mut txn.postings) {
        let Some(units) = posting.units.clone() else {
            postings.push(posting);
            continue;
        };
        let request = BookingRequest {
            account: &posting.account,
            units: &units,
            cost: posting.cost.as_ref(),
            date: txn.date,
            method: methods
                .get(&posting.account)
                .copied()
                .unwrap_or(config.default_method),
        };
        let inventory = inventories.entry(posting.account.clone()).or_default();
        let outcome = book(inventory, &request, config);
        if let Some(error) = outcome.error {
            errors.push(BookingFailure {
                date: txn.date,
                location: location.clone(),
                error,
            });
        }
        if outcome.legs.is_empty() {
            postings.push(posting);
            continue;
        }
        for leg in outcome.legs {
            let mut split = posting.clone();
            split.units = Some(leg.units);
            if let Some(cost) = &leg.cost {
                split.cost = Some(CostSpec::from(cost));
            }
            postings.push(split);
        }
    }
    txn.postings = merge_legs(postings);
    txn
}

/// Fold legs that landed on the same lot back into one posting.
fn merge_legs(postings: Vec<Posting>) -> Vec<Posting> {
    let mut merged: Vec<Posting> = Vec::with_capacity(postings.len());
    for posting in postings {
        if let Some(last) = merged.last_mut() {
            if last.account == posting.account
                && last.cost.is_some()
                && last.cost == posting.cost
                && last.price == posting.price
            {
                if let (Some(a), Some(b)) = (&mut last.units, &posting.units) {
                    if a.currency == b.currency {
                        if let Some(sum) = a.number.checked_add(b.number) {
                            a.number = sum;
                            continue;
                        }
                    }
                }
            }
        }
        merged.push(posting);
    }
    merged
}
