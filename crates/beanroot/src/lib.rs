//! Command-line tools for beanroot ledgers.
//!
//! - `beanroot-check`: load a ledger with its includes and plugins, report
//!   every error, and print the realized account balances
//!
//! # Example Usage
//!
//! ```bash
//! beanroot-check ledger.beancount
//! beanroot-check --no-cache --leaves-only ledger.beancount
//! RUST_LOG=beanroot_loader=debug beanroot-check ledger.beancount
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cmd;
