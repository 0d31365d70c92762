//! Integration tests for realization.

use beanroot_booking::{BookingConfig, BookingError};
use beanroot_core::{Amount, BookingMethod, Cost, Directive, Inventory, Options, Posting, Position};
use beanroot_parser::parse;
use beanroot_realization::{
    compute_postings_balance, iterate_with_balance, realize, realize_with, RealAccount,
};
use proptest::prelude::*;
use rust_decimal_macros::dec;

fn entries(source: &str) -> Vec<Directive> {
    let result = parse(source, "test.beancount");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    result.directives
}

fn postings(source: &str) -> Vec<Posting> {
    entries(source)
        .iter()
        .filter_map(Directive::as_transaction)
        .flat_map(|t| t.postings.clone())
        .collect()
}

const MIXED: &str = r#"
2014-01-01 * "Deposit"
  Assets:Bank:Checking   300.00 USD
  Assets:Bank:Checking    33.97 USD
  Assets:Bank:Savings     17.23 CAD

2014-01-02 * "Buy"
  Assets:Broker           12 GOOG {45.203 USD}
  Assets:Broker           20 GOOG {45.203 USD}

2014-01-03 * "Wire"
  Assets:Bank:Euro     10000 EUR
  Assets:Bank:Euro      2000 EUR
"#;

#[test]
fn test_realize_empty_creates_top_accounts() {
    let options = Options::new();
    let root = realize(&[], &options.account_types());
    assert_eq!(root.len(), 5);
    for node in root.children() {
        assert!(node.is_empty());
        assert!(node.postings.is_empty());
        assert!(node.balance.is_empty());
    }
    assert!(root.get("Equity").is_some());
}

#[test]
fn test_realize_restaurant() {
    let ledger = entries(
        r#"
2014-01-01 open Expenses:Restaurant
2014-01-01 open Assets:Cash

2014-02-01 * "Dinner"
  Expenses:Restaurant   100 CAD
  Assets:Cash          -100 CAD
"#,
    );
    let root = realize(&ledger, &[]);

    let restaurant = root.get("Expenses:Restaurant").unwrap();
    assert_eq!(
        restaurant.balance,
        Inventory::from_iter([Position::simple(Amount::new(dec!(100), "CAD"))])
    );
    assert_eq!(restaurant.postings.len(), 2);

    let cash = root.get("Assets:Cash").unwrap();
    assert_eq!(
        cash.balance,
        Inventory::from_iter([Position::simple(Amount::new(dec!(-100), "CAD"))])
    );
    assert!(root.get("Expenses").unwrap().balance.is_empty());
}

#[test]
fn test_realize_iter_children_order() {
    let ledger = entries(
        r#"
2014-01-01 open Assets:US:Bank
2014-01-01 open Assets:CA:Cash
2014-01-01 open Income:Salary
2014-01-01 open Expenses:Food
"#,
    );
    let root = realize(&ledger, &[]);
    let paths: Vec<&str> = root.iter_children(false).map(RealAccount::account).collect();
    assert_eq!(
        &paths[..6],
        &["", "Assets", "Assets:CA", "Assets:CA:Cash", "Assets:US", "Assets:US:Bank"]
    );
}

#[test]
fn test_compute_postings_balance() {
    let inventory = compute_postings_balance(&postings(MIXED));
    let expected: Inventory = [
        Position::simple(Amount::new(dec!(333.97), "USD")),
        Position::simple(Amount::new(dec!(17.23), "CAD")),
        Position::with_cost(Amount::new(dec!(32), "GOOG"), Cost::new(dec!(45.203), "USD")),
        Position::simple(Amount::new(dec!(12000), "EUR")),
    ]
    .into_iter()
    .collect();
    assert_eq!(inventory, expected);
}

#[test]
fn test_booking_scenario() {
    let strict = entries(
        r#"
2014-01-01 open Assets:Broker
2014-01-02 * "Buy"
  Assets:Broker    10 GOOG {45 USD}
  Assets:Cash    -450 USD
2014-01-03 * "Sell"
  Assets:Broker    -4 GOOG
  Assets:Cash     180 USD
"#,
    );
    let realized = realize_with(&strict, &[], &BookingConfig::default());
    assert_eq!(realized.errors.len(), 1);
    assert!(matches!(
        realized.errors[0].error,
        BookingError::ExplicitLotRequired { .. }
    ));
    assert_eq!(
        realized.errors[0].location.as_ref().map(|l| l.lineno),
        Some(6)
    );

    let fifo = BookingConfig::default().with_method(BookingMethod::Fifo);
    let realized = realize_with(&strict, &[], &fifo);
    assert!(realized.errors.is_empty());
    let broker = realized.root.get("Assets:Broker").unwrap();
    let lot = Cost::new(dec!(45), "USD").with_date(strict[1].date());
    assert_eq!(
        broker.balance,
        Inventory::from_iter([Position::with_cost(Amount::new(dec!(6), "GOOG"), lot)])
    );
}

#[test]
fn test_iterate_with_balance() {
    let ledger = entries(
        r#"
2014-01-01 open Assets:Cash
2014-01-02 * "Withdraw"
  Assets:Cash    20 USD
  Assets:Cash    30 USD
  Assets:Bank   -50 USD
2014-01-03 * "Lunch"
  Assets:Cash   -12 USD
  Expenses:Food  12 USD
"#,
    );
    let root = realize(&ledger, &[]);
    let cash = root.get("Assets:Cash").unwrap();
    let steps: Vec<_> = iterate_with_balance(&cash.postings).collect();
    assert_eq!(steps.len(), 3);
    assert!(steps[0].postings.is_empty());
    assert_eq!(steps[1].postings.len(), 2);
    assert_eq!(steps[1].change.units("USD"), dec!(50));
    assert_eq!(steps[2].balance.units("USD"), dec!(38));
    assert_eq!(steps[2].balance, cash.balance);
}

proptest! {
    #[test]
    fn test_compute_postings_balance_ignores_order(
        shuffled in Just(postings(MIXED)).prop_shuffle()
    ) {
        prop_assert_eq!(
            compute_postings_balance(&shuffled),
            compute_postings_balance(&postings(MIXED))
        );
    }
}
