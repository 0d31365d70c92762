//! Per-account lot ledger.
//!
//! An [`Inventory`] maps a lot key, the pair (currency, cost or none), to a
//! signed quantity. Keys are unique and a lot whose quantity reaches exactly
//! zero is dropped on the spot, so two inventories compare equal exactly when
//! they hold the same (key, quantity) pairs regardless of how they were built.
//!
//! This module only does arithmetic on lots. Choosing *which* lot a reducing
//! posting applies to lives in the booking crate; [`BookingMethod`] is defined
//! here because `open` directives and options carry it.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::{Amount, Cost, Position};

/// How a reduction picks among several candidate lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookingMethod {
    /// The posting must identify the lot; ambiguity is an error.
    #[default]
    Strict,
    /// Oldest acquisition date first.
    Fifo,
    /// Newest acquisition date first.
    Lifo,
    /// Highest per-unit cost first.
    Hifo,
    /// Merge all lots of the currency at weighted-average cost, then reduce.
    Average,
    /// No lot matching; reductions are recorded as-is.
    None,
}

impl FromStr for BookingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRICT" => Ok(Self::Strict),
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "HIFO" => Ok(Self::Hifo),
            "AVERAGE" => Ok(Self::Average),
            "NONE" => Ok(Self::None),
            _ => Err(format!("unknown booking method: {s}")),
        }
    }
}

impl fmt::Display for BookingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Strict => "STRICT",
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Hifo => "HIFO",
            Self::Average => "AVERAGE",
            Self::None => "NONE",
        };
        f.write_str(name)
    }
}

/// Identity of a lot inside one inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LotKey {
    /// Currency of the units
    pub currency: String,
    /// Lot cost, absent for plain units
    pub cost: Option<Cost>,
}

impl LotKey {
    /// Build a key from a currency and optional cost.
    #[must_use]
    pub fn new(currency: impl Into<String>, cost: Option<Cost>) -> Self {
        Self {
            currency: currency.into(),
            cost,
        }
    }
}

/// What [`Inventory::add`] did with the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A new lot was opened.
    Created,
    /// An existing lot grew in magnitude.
    Augmented,
    /// An existing lot shrank or was closed.
    Reduced,
    /// The amount was zero; nothing changed.
    Ignored,
    /// The new quantity is not representable; nothing changed.
    Overflow,
}

/// Mapping from lot key to signed quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    lots: BTreeMap<LotKey, Decimal>,
}

impl Inventory {
    /// An empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no lot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Number of lots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lots.len()
    }

    /// Add `units` to the lot keyed by (units currency, `cost`).
    ///
    /// Quantities sum exactly; a lot that lands on zero is removed. A sum
    /// past the decimal range leaves the lot as it was.
    pub fn add(&mut self, units: &Amount, cost: Option<&Cost>) -> MatchResult {
        if units.is_zero() {
            return MatchResult::Ignored;
        }
        let key = LotKey::new(units.currency.clone(), cost.cloned());
        match self.lots.get_mut(&key) {
            Some(quantity) => {
                let Some(sum) = quantity.checked_add(units.number) else {
                    return MatchResult::Overflow;
                };
                let extends = quantity.is_sign_negative() == units.number.is_sign_negative();
                *quantity = sum;
                if quantity.is_zero() {
                    self.lots.remove(&key);
                }
                if extends {
                    MatchResult::Augmented
                } else {
                    MatchResult::Reduced
                }
            }
            None => {
                self.lots.insert(key, units.number);
                MatchResult::Created
            }
        }
    }

    /// Add a whole position.
    pub fn add_position(&mut self, position: &Position) -> MatchResult {
        self.add(&position.units, position.cost.as_ref())
    }

    /// Add every lot of `other` into this inventory.
    pub fn merge(&mut self, other: &Self) {
        for (key, quantity) in &other.lots {
            self.add(&Amount::new(*quantity, key.currency.clone()), key.cost.as_ref());
        }
    }

    /// Quantity held under an exact lot key, zero if absent.
    #[must_use]
    pub fn get(&self, currency: &str, cost: Option<&Cost>) -> Decimal {
        self.lots
            .get(&LotKey::new(currency, cost.cloned()))
            .copied()
            .unwrap_or_default()
    }

    /// Total units of `currency` across every lot, saturating at the
    /// decimal range.
    #[must_use]
    pub fn units(&self, currency: &str) -> Decimal {
        self.lots
            .iter()
            .filter(|(key, _)| key.currency == currency)
            .fold(Decimal::ZERO, |total, (_, quantity)| {
                total.saturating_add(*quantity)
            })
    }

    /// Every currency held.
    #[must_use]
    pub fn currencies(&self) -> BTreeSet<&str> {
        self.lots.keys().map(|key| key.currency.as_str()).collect()
    }

    /// At-cost lots of `currency` whose sign is opposite to `number`.
    ///
    /// These are the lots a posting of `number` units would reduce.
    pub fn opposing_lots<'a>(
        &'a self,
        currency: &'a str,
        number: Decimal,
    ) -> impl Iterator<Item = (&'a Cost, Decimal)> + 'a {
        self.lots.iter().filter_map(move |(key, quantity)| {
            let cost = key.cost.as_ref()?;
            let opposes = quantity.is_sign_negative() != number.is_sign_negative();
            (key.currency == currency && opposes).then_some((cost, *quantity))
        })
    }

    /// Quantity of the plain (no cost) `currency` position, if its sign is
    /// opposite to `number`.
    #[must_use]
    pub fn opposing_plain(&self, currency: &str, number: Decimal) -> Option<Decimal> {
        let quantity = self.get(currency, None);
        (!quantity.is_zero() && quantity.is_sign_negative() != number.is_sign_negative())
            .then_some(quantity)
    }

    /// Iterate over (lot key, quantity) in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&LotKey, &Decimal)> {
        self.lots.iter()
    }

    /// The lots as positions, in key order.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.lots
            .iter()
            .map(|(key, quantity)| Position {
                units: Amount::new(*quantity, key.currency.clone()),
                cost: key.cost.clone(),
            })
            .collect()
    }

    /// The same holdings with costs stripped and units summed per currency.
    #[must_use]
    pub fn units_only(&self) -> Self {
        let mut out = Self::new();
        for (key, quantity) in &self.lots {
            out.add(&Amount::new(*quantity, key.currency.clone()), None);
        }
        out
    }
}

impl FromIterator<Position> for Inventory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut inv = Self::new();
        for position in iter {
            inv.add_position(&position);
        }
        inv
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.positions().iter().map(ToString::to_string).collect();
        write!(f, "({})", parts.join(", "))
    }
}

// Serialized as a list of positions; the map key is a struct.
impl Serialize for Inventory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.positions().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Inventory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let positions = Vec::<Position>::deserialize(deserializer)?;
        Ok(positions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn goog_at(cost: Decimal) -> Cost {
        Cost::new(cost, "USD")
    }

    #[test]
    fn test_add_sums_same_key() {
        let mut inv = Inventory::new();
        assert_eq!(
            inv.add(&Amount::new(dec!(100), "CAD"), None),
            MatchResult::Created
        );
        assert_eq!(
            inv.add(&Amount::new(dec!(50), "CAD"), None),
            MatchResult::Augmented
        );
        assert_eq!(
            inv.add(&Amount::new(dec!(-30), "CAD"), None),
            MatchResult::Reduced
        );
        assert_eq!(inv.units("CAD"), dec!(120));
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn test_zero_lot_is_removed() {
        let mut inv = Inventory::new();
        let cost = goog_at(dec!(45));
        inv.add(&Amount::new(dec!(10), "GOOG"), Some(&cost));
        inv.add(&Amount::new(dec!(-10), "GOOG"), Some(&cost));
        assert!(inv.is_empty());
        assert_eq!(inv, Inventory::new());
    }

    #[test]
    fn test_zero_amount_is_ignored() {
        let mut inv = Inventory::new();
        assert_eq!(inv.add(&Amount::zero("USD"), None), MatchResult::Ignored);
        assert!(inv.is_empty());
    }

    #[test]
    fn test_distinct_costs_are_distinct_lots() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(dec!(10), "GOOG"), Some(&goog_at(dec!(45))));
        inv.add(&Amount::new(dec!(5), "GOOG"), Some(&goog_at(dec!(50))));
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.units("GOOG"), dec!(15));
        assert_eq!(inv.get("GOOG", Some(&goog_at(dec!(50)))), dec!(5));
    }

    #[test]
    fn test_equality_ignores_construction_order() {
        let a: Inventory = vec![
            Position::simple(Amount::new(dec!(1), "USD")),
            Position::simple(Amount::new(dec!(2), "CAD")),
        ]
        .into_iter()
        .collect();
        let b: Inventory = vec![
            Position::simple(Amount::new(dec!(2), "CAD")),
            Position::simple(Amount::new(dec!(1), "USD")),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_opposing_lots() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(dec!(10), "GOOG"), Some(&goog_at(dec!(45))));
        inv.add(&Amount::new(dec!(3), "GOOG"), None);
        assert_eq!(inv.opposing_lots("GOOG", dec!(-4)).count(), 1);
        assert_eq!(inv.opposing_lots("GOOG", dec!(4)).count(), 0);
    }

    #[test]
    fn test_opposing_plain() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(dec!(10), "GOOG"), None);
        inv.add(&Amount::new(dec!(-2), "GOOG"), Some(&goog_at(dec!(45))));
        assert_eq!(inv.opposing_plain("GOOG", dec!(-4)), Some(dec!(10)));
        assert_eq!(inv.opposing_plain("GOOG", dec!(4)), None);
        assert_eq!(inv.opposing_plain("USD", dec!(-4)), None);
    }

    #[test]
    fn test_overflowing_add_leaves_lot_unchanged() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(Decimal::MAX, "USD"), None);
        assert_eq!(
            inv.add(&Amount::new(Decimal::MAX, "USD"), None),
            MatchResult::Overflow
        );
        assert_eq!(inv.get("USD", None), Decimal::MAX);

        inv.add(&Amount::new(Decimal::MAX, "USD"), Some(&goog_at(dec!(1))));
        assert_eq!(inv.units("USD"), Decimal::MAX);
    }

    #[test]
    fn test_units_only() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(dec!(10), "GOOG"), Some(&goog_at(dec!(45))));
        inv.add(&Amount::new(dec!(5), "GOOG"), Some(&goog_at(dec!(50))));
        let units = inv.units_only();
        assert_eq!(units.len(), 1);
        assert_eq!(units.get("GOOG", None), dec!(15));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut inv = Inventory::new();
        inv.add(&Amount::new(dec!(10), "GOOG"), Some(&goog_at(dec!(45))));
        inv.add(&Amount::new(dec!(-3.5), "EUR"), None);
        let json = serde_json::to_string(&inv).unwrap();
        let back: Inventory = serde_json::from_str(&json).unwrap();
        assert_eq!(inv, back);
    }

    #[test]
    fn test_booking_method_parse() {
        assert_eq!("fifo".parse::<BookingMethod>(), Ok(BookingMethod::Fifo));
        assert_eq!(BookingMethod::Average.to_string(), "AVERAGE");
        assert!("SOMETIMES".parse::<BookingMethod>().is_err());
    }
}
