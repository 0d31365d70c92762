//! Core types for beanroot
//!
//! The value types every other crate in the workspace speaks:
//!
//! - [`Amount`] - a decimal number with a currency
//! - [`Cost`] / [`CostSpec`] - the cost basis of a lot, and its partial form on postings
//! - [`Position`] - units held, optionally at a cost
//! - [`Inventory`] - the lot ledger of one account
//! - [`Directive`] - every dated statement of a ledger
//! - [`Options`] - the ledger's `option` settings
//!
//! # Example
//!
//! ```
//! use beanroot_core::{Amount, Cost, Inventory};
//! use rust_decimal_macros::dec;
//!
//! let mut inv = Inventory::new();
//! let lot = Cost::new(dec!(45), "USD");
//! inv.add(&Amount::new(dec!(10), "GOOG"), Some(&lot));
//! inv.add(&Amount::new(dec!(-4), "GOOG"), Some(&lot));
//! assert_eq!(inv.units("GOOG"), dec!(6));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod amount;
pub mod cost;
pub mod directive;
pub mod inventory;
pub mod options;
pub mod position;

pub use amount::{Amount, ArithmeticOverflow};
pub use cost::{Cost, CostSpec};
pub use directive::{
    location_meta, location_of, sort_directives, Balance, Close, Commodity, Custom, Directive,
    DirectivePriority, Document, Event, Location, MetaValue, Metadata, Note, Open, Pad, Posting,
    Price, PriceAnnotation, Query, Transaction,
};
pub use inventory::{BookingMethod, Inventory, LotKey, MatchResult};
pub use options::{OptionError, Options, PluginDecl, ProcessingMode};
pub use position::Position;

pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
