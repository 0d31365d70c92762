//! Realization: the per-account balance tree.
//!
//! [`realize`] groups a chronological directive stream by account and folds
//! each account's postings through the booking engine, producing a tree of
//! [`RealAccount`] nodes rooted at the empty path.
//!
//! ```
//! use beanroot_core::{Amount, Directive, NaiveDate, Posting, Transaction};
//! use beanroot_realization::realize;
//! use rust_decimal_macros::dec;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! let entries = vec![Directive::Transaction(
//!     Transaction::new(date, "Dinner")
//!         .with_posting(Posting::new("Expenses:Restaurant", Amount::new(dec!(100), "CAD")))
//!         .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-100), "CAD"))),
//! )];
//!
//! let root = realize(&entries, &["Assets", "Expenses"]);
//! let cash = root.get("Assets:Cash").unwrap();
//! assert_eq!(cash.balance.units("CAD"), dec!(-100));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod balance;
mod real_account;
mod realize;

pub use balance::{
    compute_postings_balance, compute_postings_balance_checked, iterate_with_balance,
    BalanceStep, IterWithBalance, PostingSource,
};
pub use real_account::{IterChildren, RealAccount, RealPosting, RealizationError};
pub use realize::{
    compute_balance, dump_balances, group_by_account, realize, realize_with, Realization,
};
