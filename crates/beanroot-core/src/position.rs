//! A position: some units, optionally held at a cost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, Cost};

/// Units held, with the lot cost if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// The units held
    pub units: Amount,
    /// The lot cost, if held at cost
    pub cost: Option<Cost>,
}

impl Position {
    /// A position with no cost.
    #[must_use]
    pub const fn simple(units: Amount) -> Self {
        Self { units, cost: None }
    }

    /// A position held at `cost`.
    #[must_use]
    pub const fn with_cost(units: Amount, cost: Cost) -> Self {
        Self {
            units,
            cost: Some(cost),
        }
    }

    /// Currency of the units.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.units.currency
    }

    /// Book value: units times cost, or the units themselves without a cost.
    #[must_use]
    pub fn book_value(&self) -> Amount {
        match &self.cost {
            Some(cost) => cost.total(self.units.number),
            None => self.units.clone(),
        }
    }

    /// Number of units.
    #[must_use]
    pub const fn number(&self) -> Decimal {
        self.units.number
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.units)?;
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        Ok(())
    }
}
