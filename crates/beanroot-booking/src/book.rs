//! Lot matching.
//!
//! [`book`] applies one posting to an account's [`Inventory`]. A posting
//! whose units oppose existing at-cost lots of the same currency is a
//! reduction: it is matched against those lots according to the account's
//! [`BookingMethod`]. A posting with a cost that opposes plain units of its
//! currency matches no lot. Anything else augments the inventory, opening a
//! lot at the resolved cost.
//!
//! A failed match still changes the inventory. The units are recorded against
//! the best candidate lot (or at no cost when there is none) so running
//! balances stay numerically consistent; the error is returned alongside.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use beanroot_core::{Amount, BookingMethod, Cost, CostSpec, Inventory, MatchResult, Position};

/// How far a lot's per-unit cost may be from the cost written on a reducing
/// posting and still match. Zero means exact.
pub const DEFAULT_COST_TOLERANCE: Decimal = Decimal::ZERO;

/// Booking settings shared by every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingConfig {
    /// Method for accounts whose `open` doesn't name one.
    pub default_method: BookingMethod,
    /// Cost matching tolerance for reductions.
    pub cost_tolerance: Decimal,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_method: BookingMethod::Strict,
            cost_tolerance: DEFAULT_COST_TOLERANCE,
        }
    }
}

impl BookingConfig {
    /// Set the default method.
    #[must_use]
    pub const fn with_method(mut self, method: BookingMethod) -> Self {
        self.default_method = method;
        self
    }

    /// Set the cost matching tolerance.
    #[must_use]
    pub const fn with_cost_tolerance(mut self, tolerance: Decimal) -> Self {
        self.cost_tolerance = tolerance;
        self
    }
}

/// A reduction or augmentation that could not be booked cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BookingError {
    /// Several lots match and the method can't choose.
    #[error("ambiguous reduction of {units} in {account}: {candidates} lots match {spec}")]
    AmbiguousMatch {
        /// Account being reduced.
        account: String,
        /// Units of the reducing posting.
        units: Amount,
        /// Cost written on the posting.
        spec: String,
        /// How many lots matched.
        candidates: usize,
    },
    /// Strict booking needs the posting to identify a lot.
    #[error("reduction of {units} in {account} must name a lot (cost, date or label) under STRICT booking")]
    ExplicitLotRequired {
        /// Account being reduced.
        account: String,
        /// Units of the reducing posting.
        units: Amount,
    },
    /// No lot matches the cost written on the posting.
    #[error("no lot in {account} matches {units} {spec}")]
    NoMatchingLot {
        /// Account being reduced.
        account: String,
        /// Units of the reducing posting.
        units: Amount,
        /// Cost written on the posting.
        spec: String,
    },
    /// The matching lots hold fewer units than the posting removes.
    #[error("not enough {currency} in {account}: reducing {requested}, only {available} held")]
    InsufficientUnits {
        /// Account being reduced.
        account: String,
        /// Currency of the units.
        currency: String,
        /// Units removed.
        requested: Decimal,
        /// Units held in matching lots.
        available: Decimal,
    },
    /// A new lot was written with a cost lacking its number or currency.
    #[error("cost {spec} for new lot of {units} in {account} is incomplete")]
    IncompleteCost {
        /// Account being augmented.
        account: String,
        /// Units of the posting.
        units: Amount,
        /// Cost written on the posting.
        spec: String,
    },
    /// The posting would push a lot past the decimal range.
    #[error("booking {units} in {account} overflows the lot quantity")]
    Overflow {
        /// Account being booked.
        account: String,
        /// Units of the posting.
        units: Amount,
    },
    /// An `open` names a booking method that doesn't exist.
    #[error("unknown booking method {method:?} for {account}")]
    UnknownMethod {
        /// Account being opened.
        account: String,
        /// Method as written.
        method: String,
    },
}

/// One posting to apply.
#[derive(Debug, Clone, Copy)]
pub struct BookingRequest<'a> {
    /// Account the posting belongs to.
    pub account: &'a str,
    /// Signed units.
    pub units: &'a Amount,
    /// Cost written on the posting, if any.
    pub cost: Option<&'a CostSpec>,
    /// Transaction date, used as the acquisition date of new lots.
    pub date: NaiveDate,
    /// The account's booking method.
    pub method: BookingMethod,
}

/// What [`book`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingOutcome {
    /// Positions applied to the inventory, one per lot touched.
    pub legs: Vec<Position>,
    /// Set when the posting could not be booked cleanly.
    pub error: Option<BookingError>,
}

impl BookingOutcome {
    fn ok(legs: Vec<Position>) -> Self {
        Self { legs, error: None }
    }

    fn failed(legs: Vec<Position>, error: BookingError) -> Self {
        Self {
            legs,
            error: Some(error),
        }
    }
}

/// Apply `request` to `inventory`.
pub fn book(
    inventory: &mut Inventory,
    request: &BookingRequest<'_>,
    config: &BookingConfig,
) -> BookingOutcome {
    match try_book(inventory, request, config) {
        Ok(outcome) => outcome,
        Err(error) => BookingOutcome::failed(Vec::new(), error),
    }
}

fn try_book(
    inventory: &mut Inventory,
    request: &BookingRequest<'_>,
    config: &BookingConfig,
) -> Result<BookingOutcome, BookingError> {
    let units = request.units;
    if units.is_zero() {
        return Ok(BookingOutcome::default());
    }
    let opposing: Vec<(Cost, Decimal)> = inventory
        .opposing_lots(&units.currency, units.number)
        .map(|(cost, quantity)| (cost.clone(), quantity))
        .collect();

    if request.method == BookingMethod::None {
        return augment(inventory, request);
    }
    if opposing.is_empty() {
        // A lot can't be carved out of plain units of the same currency.
        if let Some(spec) = request.cost {
            if inventory.opposing_plain(&units.currency, units.number).is_some() {
                let leg = record(inventory, request.account, units, None)?;
                return Ok(BookingOutcome::failed(
                    vec![leg],
                    BookingError::NoMatchingLot {
                        account: request.account.to_string(),
                        units: units.clone(),
                        spec: spec.to_string(),
                    },
                ));
            }
        }
        return augment(inventory, request);
    }

    let spec = request.cost.cloned().unwrap_or_default();
    let mut candidates: Vec<(Cost, Decimal)> = opposing
        .into_iter()
        .filter(|(cost, _)| spec.matches(cost, units.number, config.cost_tolerance))
        .collect();

    if candidates.is_empty() {
        let cost = spec.resolve(units.number, request.date);
        let leg = record(inventory, request.account, units, cost)?;
        return Ok(BookingOutcome::failed(
            vec![leg],
            BookingError::NoMatchingLot {
                account: request.account.to_string(),
                units: units.clone(),
                spec: spec.to_string(),
            },
        ));
    }

    sort_for(request.method, &mut candidates);
    let wanted = units.number.abs();
    let held = candidates
        .iter()
        .fold(Decimal::ZERO, |total, (_, q)| total.saturating_add(q.abs()));

    match request.method {
        BookingMethod::Strict if !spec.is_selective() && held != wanted => {
            let leg = record(inventory, request.account, units, Some(candidates[0].0.clone()))?;
            return Ok(BookingOutcome::failed(
                vec![leg],
                BookingError::ExplicitLotRequired {
                    account: request.account.to_string(),
                    units: units.clone(),
                },
            ));
        }
        BookingMethod::Strict if candidates.len() > 1 && held != wanted => {
            let leg = record(inventory, request.account, units, Some(candidates[0].0.clone()))?;
            return Ok(BookingOutcome::failed(
                vec![leg],
                BookingError::AmbiguousMatch {
                    account: request.account.to_string(),
                    units: units.clone(),
                    spec: spec.to_string(),
                    candidates: candidates.len(),
                },
            ));
        }
        BookingMethod::Average => {
            candidates = average(inventory, request, &candidates)?;
        }
        _ => {}
    }

    reduce(inventory, request, &candidates)
}

fn augment(
    inventory: &mut Inventory,
    request: &BookingRequest<'_>,
) -> Result<BookingOutcome, BookingError> {
    let units = request.units;
    let Some(spec) = request.cost else {
        return Ok(BookingOutcome::ok(vec![record(inventory, request.account, units, None)?]));
    };
    let outcome = match spec.resolve(units.number, request.date) {
        Some(cost) => BookingOutcome::ok(vec![record(inventory, request.account, units, Some(cost))?]),
        None if request.method == BookingMethod::None => {
            BookingOutcome::ok(vec![record(inventory, request.account, units, None)?])
        }
        None => BookingOutcome::failed(
            vec![record(inventory, request.account, units, None)?],
            BookingError::IncompleteCost {
                account: request.account.to_string(),
                units: units.clone(),
                spec: spec.to_string(),
            },
        ),
    };
    Ok(outcome)
}

fn record(
    inventory: &mut Inventory,
    account: &str,
    units: &Amount,
    cost: Option<Cost>,
) -> Result<Position, BookingError> {
    if inventory.add(units, cost.as_ref()) == MatchResult::Overflow {
        return Err(BookingError::Overflow {
            account: account.to_string(),
            units: units.clone(),
        });
    }
    Ok(Position {
        units: units.clone(),
        cost,
    })
}

fn sort_for(method: BookingMethod, candidates: &mut [(Cost, Decimal)]) {
    match method {
        BookingMethod::Lifo => candidates.sort_by(|(a, _), (b, _)| b.date.cmp(&a.date)),
        BookingMethod::Hifo => candidates.sort_by(|(a, _), (b, _)| b.number.cmp(&a.number)),
        _ => candidates.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date)),
    }
}

/// Replace every lot in `candidates` with one lot at their weighted-average
/// cost, dated at the earliest acquisition.
fn average(
    inventory: &mut Inventory,
    request: &BookingRequest<'_>,
    candidates: &[(Cost, Decimal)],
) -> Result<Vec<(Cost, Decimal)>, BookingError> {
    let cost_currency = &candidates[0].0.currency;
    if candidates.len() < 2 || candidates.iter().any(|(c, _)| c.currency != *cost_currency) {
        return Ok(candidates.to_vec());
    }
    let overflow = || BookingError::Overflow {
        account: request.account.to_string(),
        units: request.units.clone(),
    };
    let mut quantity = Decimal::ZERO;
    let mut book_value = Decimal::ZERO;
    for (cost, held) in candidates {
        quantity = quantity.checked_add(*held).ok_or_else(overflow)?;
        book_value = cost
            .number
            .checked_mul(*held)
            .and_then(|value| book_value.checked_add(value))
            .ok_or_else(overflow)?;
    }
    let per_unit = book_value.checked_div(quantity).ok_or_else(overflow)?;

    let currency = &request.units.currency;
    for (cost, held) in candidates {
        inventory.add(&Amount::new(-*held, currency.clone()), Some(cost));
    }
    let mut merged = Cost::new(per_unit, cost_currency.clone());
    merged.date = candidates.iter().filter_map(|(c, _)| c.date).min();
    inventory.add(&Amount::new(quantity, currency.clone()), Some(&merged));
    Ok(vec![(merged, quantity)])
}

fn reduce(
    inventory: &mut Inventory,
    request: &BookingRequest<'_>,
    candidates: &[(Cost, Decimal)],
) -> Result<BookingOutcome, BookingError> {
    let units = request.units;
    let sign = if units.is_negative() {
        -Decimal::ONE
    } else {
        Decimal::ONE
    };
    let mut remaining = units.number.abs();
    let mut legs = Vec::new();
    for (cost, held) in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(held.abs());
        let leg_units = Amount::new(sign * take, units.currency.clone());
        legs.push(record(inventory, request.account, &leg_units, Some(cost.clone()))?);
        remaining -= take;
    }
    if remaining.is_zero() {
        return Ok(BookingOutcome::ok(legs));
    }
    let available = units.number.abs() - remaining;
    let overflow = Amount::new(sign * remaining, units.currency.clone());
    legs.push(record(inventory, request.account, &overflow, Some(candidates[0].0.clone()))?);
    Ok(BookingOutcome::failed(
        legs,
        BookingError::InsufficientUnits {
            account: request.account.to_string(),
            currency: units.currency.clone(),
            requested: units.number.abs(),
            available,
        },
    ))
}
