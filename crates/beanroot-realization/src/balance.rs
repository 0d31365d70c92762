//! Folding postings into inventories.

use std::slice;

use beanroot_core::{Cost, Directive, Inventory, MatchResult, NaiveDate, Posting};
use beanroot_booking::BookingError;

use crate::RealPosting;

/// Anything that carries postings: a posting, a transaction directive, or an
/// item of a realized account's history.
pub trait PostingSource {
    /// Date given to lots whose cost names none.
    fn acquisition_date(&self) -> Option<NaiveDate>;

    /// The postings carried; empty for directives other than transactions.
    fn postings(&self) -> &[Posting];
}

impl PostingSource for Posting {
    fn acquisition_date(&self) -> Option<NaiveDate> {
        None
    }

    fn postings(&self) -> &[Posting] {
        slice::from_ref(self)
    }
}

impl PostingSource for Directive {
    fn acquisition_date(&self) -> Option<NaiveDate> {
        Some(self.date())
    }

    fn postings(&self) -> &[Posting] {
        match self {
            Self::Transaction(t) => &t.postings,
            _ => &[],
        }
    }
}

impl PostingSource for RealPosting<'_> {
    fn acquisition_date(&self) -> Option<NaiveDate> {
        Some(self.entry().date())
    }

    fn postings(&self) -> &[Posting] {
        match self {
            Self::Posting { posting, .. } => slice::from_ref(*posting),
            Self::Entry(_) => &[],
        }
    }
}

impl<T: PostingSource + ?Sized> PostingSource for &T {
    fn acquisition_date(&self) -> Option<NaiveDate> {
        (**self).acquisition_date()
    }

    fn postings(&self) -> &[Posting] {
        (**self).postings()
    }
}

/// The lot key cost of `posting`, if its cost spec is complete.
pub(crate) fn lot_cost(posting: &Posting, date: Option<NaiveDate>) -> Option<Cost> {
    let spec = posting.cost.as_ref()?;
    let units = posting.units.as_ref()?;
    let mut cost = spec.resolve(units.number, date.unwrap_or_default())?;
    if date.is_none() && spec.date.is_none() {
        cost.date = None;
    }
    Some(cost)
}

/// Sum the units of `items` into one inventory, by exact lot key.
///
/// Inputs are not modified. Final quantities don't depend on the order of
/// `items`; see [`compute_postings_balance_checked`] for the errors.
pub fn compute_postings_balance<I>(items: I) -> Inventory
where
    I: IntoIterator,
    I::Item: PostingSource,
{
    compute_postings_balance_checked(items).0
}

/// Like [`compute_postings_balance`], also reporting postings that oppose
/// held units without matching any of their lots, and postings whose sum
/// leaves the decimal range. An overflowing posting is left out of the
/// inventory.
///
/// The report depends on order: whether a posting finds lots to oppose
/// depends on what was added before it.
pub fn compute_postings_balance_checked<I>(items: I) -> (Inventory, Vec<BookingError>)
where
    I: IntoIterator,
    I::Item: PostingSource,
{
    let mut inventory = Inventory::new();
    let mut errors = Vec::new();
    for item in items {
        let date = item.acquisition_date();
        for posting in item.postings() {
            let Some(units) = &posting.units else {
                continue;
            };
            let cost = lot_cost(posting, date);
            let opposes_lot = inventory
                .opposing_lots(&units.currency, units.number)
                .next()
                .is_some();
            let opposes_plain = posting.cost.is_some()
                && inventory
                    .opposing_plain(&units.currency, units.number)
                    .is_some();
            let unmatched = inventory.get(&units.currency, cost.as_ref()).is_zero()
                && (opposes_lot || opposes_plain);
            if unmatched {
                errors.push(BookingError::NoMatchingLot {
                    account: posting.account.clone(),
                    units: units.clone(),
                    spec: posting
                        .cost
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                });
            }
            if inventory.add(units, cost.as_ref()) == MatchResult::Overflow {
                errors.push(BookingError::Overflow {
                    account: posting.account.clone(),
                    units: units.clone(),
                });
            }
        }
    }
    (inventory, errors)
}

/// One step of [`iterate_with_balance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceStep<'a> {
    /// The directive of this step.
    pub entry: &'a Directive,
    /// This account's postings within `entry`; empty for other directives.
    pub postings: Vec<&'a Posting>,
    /// What `entry` added to the account.
    pub change: Inventory,
    /// Running balance after `entry`.
    pub balance: Inventory,
}

/// Walk an account's history one directive at a time with a running balance.
///
/// Consecutive postings of one transaction form a single step. Snapshots are
/// built as the iterator advances and are not kept anywhere else.
pub fn iterate_with_balance<'a>(postings: &'a [RealPosting<'a>]) -> IterWithBalance<'a> {
    IterWithBalance {
        items: postings,
        balance: Inventory::new(),
    }
}

/// Iterator returned by [`iterate_with_balance`].
#[derive(Debug, Clone)]
pub struct IterWithBalance<'a> {
    items: &'a [RealPosting<'a>],
    balance: Inventory,
}

impl<'a> Iterator for IterWithBalance<'a> {
    type Item = BalanceStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.items.first()?.entry();
        let len = self
            .items
            .iter()
            .take_while(|item| std::ptr::eq(item.entry(), entry))
            .count();
        let (group, rest) = self.items.split_at(len);
        self.items = rest;

        let postings: Vec<&Posting> = group.iter().filter_map(RealPosting::posting).collect();
        let change = compute_postings_balance(group);
        self.balance.merge(&change);
        Some(BalanceStep {
            entry,
            postings,
            change,
            balance: self.balance.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beanroot_core::{Amount, CostSpec, Decimal};
    use rust_decimal_macros::dec;

    #[test]
    fn test_plain_postings() {
        let postings = vec![
            Posting::new("Assets:Cash", Amount::new(dec!(10), "USD")),
            Posting::new("Assets:Cash", Amount::new(dec!(-4), "USD")),
        ];
        let inv = compute_postings_balance(&postings);
        assert_eq!(inv.units("USD"), dec!(6));
        assert_eq!(postings.len(), 2);
    }

    #[test]
    fn test_undated_cost_has_no_date() {
        let posting = Posting::new("Assets:Broker", Amount::new(dec!(2), "GOOG"))
            .with_cost(CostSpec::empty().with_number_per(dec!(45)).with_currency("USD"));
        let inv = compute_postings_balance([&posting]);
        assert_eq!(inv.get("GOOG", Some(&Cost::new(dec!(45), "USD"))), dec!(2));
    }

    #[test]
    fn test_unmatched_reduction_is_reported() {
        let buy = Posting::new("Assets:Broker", Amount::new(dec!(2), "GOOG"))
            .with_cost(CostSpec::empty().with_number_per(dec!(45)).with_currency("USD"));
        let sell = Posting::new("Assets:Broker", Amount::new(dec!(-1), "GOOG"))
            .with_cost(CostSpec::empty().with_number_per(dec!(50)).with_currency("USD"));

        let (inv, errors) = compute_postings_balance_checked([&buy, &sell]);
        assert_eq!(errors.len(), 1);
        assert_eq!(inv.len(), 2);

        let (reordered, errors) = compute_postings_balance_checked([&sell, &buy]);
        assert_eq!(reordered, inv);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_cost_against_plain_units_is_reported() {
        let deposit = Posting::new("Assets:Broker", Amount::new(dec!(10), "GOOG"));
        let sell = Posting::new("Assets:Broker", Amount::new(dec!(-4), "GOOG"))
            .with_cost(CostSpec::empty().with_number_per(dec!(45)).with_currency("USD"));
        let (_, errors) = compute_postings_balance_checked([&deposit, &sell]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], BookingError::NoMatchingLot { .. }));

        let withdraw = Posting::new("Assets:Broker", Amount::new(dec!(-4), "GOOG"));
        let (_, errors) = compute_postings_balance_checked([&deposit, &withdraw]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = Posting::new("Assets:A", Amount::new(Decimal::MAX, "USD"));
        let (inv, errors) = compute_postings_balance_checked([&big, &big]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], BookingError::Overflow { .. }));
        assert_eq!(inv.units("USD"), Decimal::MAX);
    }
}
