//! Booking engine for beanroot.
//!
//! This crate provides:
//! - Lot matching for reductions under each [`BookingMethod`](beanroot_core::BookingMethod)
//! - Ledger-wide booking that pins reducing postings to concrete lots
//! - Transaction interpolation and balance verification
//! - Pad expansion into synthetic transactions
//!
//! # Booking
//!
//! ```
//! use beanroot_booking::{book, BookingConfig, BookingRequest};
//! use beanroot_core::{Amount, BookingMethod, Cost, Inventory, NaiveDate};
//! use rust_decimal_macros::dec;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//! let mut inv = Inventory::new();
//! inv.add(&Amount::new(dec!(10), "GOOG"), Some(&Cost::new(dec!(45), "USD")));
//!
//! let units = Amount::new(dec!(-4), "GOOG");
//! let request = BookingRequest {
//!     account: "Assets:Broker",
//!     units: &units,
//!     cost: None,
//!     date,
//!     method: BookingMethod::Fifo,
//! };
//! let outcome = book(&mut inv, &request, &BookingConfig::default());
//! assert!(outcome.error.is_none());
//! assert_eq!(inv.units("GOOG"), dec!(6));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod book;
mod engine;
mod interpolate;
mod pad;

pub use book::{
    book, BookingConfig, BookingError, BookingOutcome, BookingRequest, DEFAULT_COST_TOLERANCE,
};
pub use engine::{account_methods, book_transactions, BookedLedger, BookingFailure};
pub use interpolate::{
    calculate_residual, calculate_tolerance, interpolate, is_balanced, InterpolationError,
    FALLBACK_TOLERANCE,
};
pub use pad::{process_pads, PadError, PadResult, PADDING_FLAG, PADDING_NARRATION};
