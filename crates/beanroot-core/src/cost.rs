//! Cost basis of a lot, and the partial cost specification written on postings.
//!
//! A [`Cost`] is fully determined: per-unit number, currency, acquisition
//! date and optional label. It is part of an inventory lot key.
//!
//! A [`CostSpec`] is what appears between braces on a posting. Any field may
//! be missing; the booking engine either fills it in (augmentation) or uses
//! it as a filter against existing lots (reduction).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Amount;

/// Acquisition cost of a lot.
///
/// ```
/// use beanroot_core::Cost;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let cost = Cost::new(dec!(45), "USD")
///     .with_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
/// assert_eq!(cost.total(dec!(10)).number, dec!(450));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cost {
    /// Cost per unit
    pub number: Decimal,
    /// Currency of the cost
    pub currency: String,
    /// Acquisition date
    pub date: Option<NaiveDate>,
    /// Lot label
    pub label: Option<String>,
}

impl Cost {
    /// Create a cost with no date and no label.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
            date: None,
            label: None,
        }
    }

    /// Set the acquisition date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the lot label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Total cost of `units` units held at this cost.
    #[must_use]
    pub fn total(&self, units: Decimal) -> Amount {
        Amount::new(units * self.number, self.currency.clone())
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}", self.number, self.currency)?;
        if let Some(date) = self.date {
            write!(f, ", {date}")?;
        }
        if let Some(label) = &self.label {
            write!(f, ", \"{label}\"")?;
        }
        write!(f, "}}")
    }
}

/// A possibly incomplete cost written on a posting.
///
/// `{}` is an empty spec. `{45 USD}` sets a per-unit number, `{{450 USD}}`
/// a total number that is divided by the units when resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSpec {
    /// Per-unit cost
    pub number_per: Option<Decimal>,
    /// Total cost for all units
    pub number_total: Option<Decimal>,
    /// Currency of the cost
    pub currency: Option<String>,
    /// Acquisition date
    pub date: Option<NaiveDate>,
    /// Lot label
    pub label: Option<String>,
}

impl CostSpec {
    /// An empty spec (`{}`).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the per-unit number.
    #[must_use]
    pub const fn with_number_per(mut self, number: Decimal) -> Self {
        self.number_per = Some(number);
        self
    }

    /// Set the total number.
    #[must_use]
    pub const fn with_number_total(mut self, number: Decimal) -> Self {
        self.number_total = Some(number);
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// True for `{}`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.number_per.is_none()
            && self.number_total.is_none()
            && self.currency.is_none()
            && self.date.is_none()
            && self.label.is_none()
    }

    /// True if the spec names something that can select a lot on its own:
    /// a number, a date or a label. A bare currency is not selective.
    #[must_use]
    pub const fn is_selective(&self) -> bool {
        self.number_per.is_some()
            || self.number_total.is_some()
            || self.date.is_some()
            || self.label.is_some()
    }

    /// Check whether an existing lot cost satisfies every field given here.
    ///
    /// Per-unit numbers compare within `tolerance`; a total number is
    /// converted to per-unit using `units` first.
    #[must_use]
    pub fn matches(&self, cost: &Cost, units: Decimal, tolerance: Decimal) -> bool {
        // Outer `None`: no number to compare. Inner `None`: not representable.
        let difference = match (self.number_per, self.number_total) {
            (Some(per), _) => Some(per.checked_sub(cost.number)),
            (None, Some(total)) if !units.is_zero() => Some(
                total
                    .checked_div(units.abs())
                    .and_then(|per| per.checked_sub(cost.number)),
            ),
            _ => None,
        };
        if let Some(difference) = difference {
            if !difference.is_some_and(|d| d.abs() <= tolerance) {
                return false;
            }
        }
        if self.currency.as_ref().is_some_and(|c| *c != cost.currency) {
            return false;
        }
        if self.date.is_some() && self.date != cost.date {
            return false;
        }
        if self.label.is_some() && self.label != cost.label {
            return false;
        }
        true
    }

    /// Turn this spec into a full cost for newly acquired `units`.
    ///
    /// Returns `None` when the number or currency is missing, or when a total
    /// does not divide into a representable per-unit number. A missing date
    /// defaults to `date`, the posting's transaction date.
    #[must_use]
    pub fn resolve(&self, units: Decimal, date: NaiveDate) -> Option<Cost> {
        let currency = self.currency.clone()?;
        let number = match (self.number_per, self.number_total) {
            (Some(per), _) => per,
            (None, Some(total)) => total.checked_div(units.abs())?,
            _ => return None,
        };
        Some(Cost {
            number,
            currency,
            date: self.date.or(Some(date)),
            label: self.label.clone(),
        })
    }
}

impl From<&Cost> for CostSpec {
    fn from(cost: &Cost) -> Self {
        Self {
            number_per: Some(cost.number),
            number_total: None,
            currency: Some(cost.currency.clone()),
            date: cost.date,
            label: cost.label.clone(),
        }
    }
}

impl fmt::Display for CostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match (self.number_per, self.number_total) {
            (Some(per), _) => parts.push(per.to_string()),
            (None, Some(total)) => parts.push(format!("# {total}")),
            (None, None) => {}
        }
        if let Some(currency) = &self.currency {
            match parts.last_mut() {
                Some(number) => {
                    number.push(' ');
                    number.push_str(currency);
                }
                None => parts.push(currency.clone()),
            }
        }
        if let Some(date) = self.date {
            parts.push(date.to_string());
        }
        if let Some(label) = &self.label {
            parts.push(format!("\"{label}\""));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}
