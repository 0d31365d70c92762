//! Ledger text parser.
//!
//! Turns the content of one source file into directives plus the file-level
//! declarations the loader acts on: `option`, `include` and `plugin` lines,
//! and the set of currencies the text mentions.
//!
//! Parsing never fails as a whole. A malformed entry is reported in
//! [`ParseResult::errors`] and skipped.
//!
//! # Example
//!
//! ```
//! use beanroot_parser::parse;
//!
//! let source = r#"
//! 2024-01-15 * "Cafe" "Morning coffee"
//!   Expenses:Food:Coffee  5.00 USD
//!   Assets:Cash
//! "#;
//!
//! let result = parse(source, "main.beancount");
//! assert!(result.errors.is_empty());
//! assert_eq!(result.directives.len(), 1);
//! assert_eq!(result.commodities, vec!["USD"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod lexer;
mod parser;

pub use error::ParseError;
pub use parser::parse;

use beanroot_core::Directive;

/// Everything read from one file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Directives in file order.
    pub directives: Vec<Directive>,
    /// `option` lines as (key, value, line).
    pub options: Vec<(String, String, u32)>,
    /// `include` lines as (path as written, line).
    pub includes: Vec<(String, u32)>,
    /// `plugin` lines as (name, config, line).
    pub plugins: Vec<(String, Option<String>, u32)>,
    /// Currencies mentioned, in first-seen order.
    pub commodities: Vec<String>,
    /// Syntax errors.
    pub errors: Vec<ParseError>,
}
