//! Ledger options.
//!
//! `option "key" "value"` lines end up here. Most keys are scalars: the
//! first file in resolution order that sets one decides it. A few keys
//! accumulate across every file as an ordered union; see
//! [`Options::is_accumulating`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::BookingMethod;

/// Options that union across files instead of overriding.
const ACCUMULATING_OPTIONS: &[&str] = &[
    "operating_currency",
    "documents",
    "include",
    "commodities",
    "plugin",
];

/// Options computed by the loader; a ledger cannot set them.
const READ_ONLY_OPTIONS: &[&str] = &[
    "filename",
    "include",
    "missing_includes",
    "commodities",
    "input_hash",
];

/// A rejected option value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum OptionError {
    /// The value does not parse for this key.
    #[error("invalid value \"{value}\" for option \"{key}\": expected {expected}")]
    InvalidValue {
        /// Option name.
        key: String,
        /// Offending value.
        value: String,
        /// What would have been accepted.
        expected: String,
    },
    /// The key is computed by the loader.
    #[error("option \"{key}\" may not be set in a ledger")]
    ReadOnly {
        /// Option name.
        key: String,
    },
}

/// A plugin declared with `plugin "name" "config"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDecl {
    /// Registered plugin name.
    pub name: String,
    /// Opaque configuration string.
    pub config: Option<String>,
}

impl fmt::Display for PluginDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config {
            Some(config) => write!(f, "{} ({config})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Whether built-in stages run before user plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Built-in stages, then user plugins.
    #[default]
    Default,
    /// User plugins only.
    Raw,
}

/// Aggregated ledger options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Ledger title.
    pub title: Option<String>,
    /// Root file the ledger was loaded from.
    pub filename: Option<String>,
    /// Operating currencies, for reports.
    pub operating_currency: Vec<String>,
    /// Every currency seen in the ledger text.
    pub commodities: Vec<String>,
    /// The include closure: absolute paths in resolution order, root first.
    pub include: Vec<String>,
    /// Includes that did not exist at load time.
    #[serde(default)]
    pub missing_includes: Vec<String>,
    /// User plugins in declaration order.
    pub plugin: Vec<PluginDecl>,
    /// Document directories.
    pub documents: Vec<String>,
    /// Root name of asset accounts.
    pub name_assets: String,
    /// Root name of liability accounts.
    pub name_liabilities: String,
    /// Root name of equity accounts.
    pub name_equity: String,
    /// Root name of income accounts.
    pub name_income: String,
    /// Root name of expense accounts.
    pub name_expenses: String,
    /// Account used to book opening balances.
    pub account_previous_balances: String,
    /// Default booking method for accounts that don't set one.
    pub booking_method: BookingMethod,
    /// Per-currency default tolerances; `*` applies to any currency.
    pub inferred_tolerance_default: BTreeMap<String, Decimal>,
    /// Built-in stage handling.
    pub plugin_processing_mode: ProcessingMode,
    /// Digest of the include closure's file stamps at load time.
    pub input_hash: Option<String>,
    /// Keys this engine doesn't interpret.
    pub custom: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Engine defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            title: None,
            filename: None,
            operating_currency: Vec::new(),
            commodities: Vec::new(),
            include: Vec::new(),
            missing_includes: Vec::new(),
            plugin: Vec::new(),
            documents: Vec::new(),
            name_assets: "Assets".to_string(),
            name_liabilities: "Liabilities".to_string(),
            name_equity: "Equity".to_string(),
            name_income: "Income".to_string(),
            name_expenses: "Expenses".to_string(),
            account_previous_balances: "Equity:Opening-Balances".to_string(),
            booking_method: BookingMethod::Strict,
            inferred_tolerance_default: BTreeMap::new(),
            plugin_processing_mode: ProcessingMode::Default,
            input_hash: None,
            custom: BTreeMap::new(),
        }
    }

    /// True for keys whose values union across files.
    #[must_use]
    pub fn is_accumulating(key: &str) -> bool {
        ACCUMULATING_OPTIONS.contains(&key)
    }

    /// Apply one `option` line.
    ///
    /// Accumulating keys append unless the value is already present. On
    /// error the current value is left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        if READ_ONLY_OPTIONS.contains(&key) {
            return Err(OptionError::ReadOnly {
                key: key.to_string(),
            });
        }
        let invalid = |expected: &str| OptionError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        };
        match key {
            "title" => self.title = Some(value.to_string()),
            "operating_currency" => push_unique(&mut self.operating_currency, value),
            "documents" => push_unique(&mut self.documents, value),
            "plugin" => self.add_plugin(value, None),
            "name_assets" => self.name_assets = value.to_string(),
            "name_liabilities" => self.name_liabilities = value.to_string(),
            "name_equity" => self.name_equity = value.to_string(),
            "name_income" => self.name_income = value.to_string(),
            "name_expenses" => self.name_expenses = value.to_string(),
            "account_previous_balances" => self.account_previous_balances = value.to_string(),
            "booking_method" => {
                self.booking_method = value
                    .parse()
                    .map_err(|_| invalid("one of STRICT, FIFO, LIFO, HIFO, AVERAGE, NONE"))?;
            }
            "inferred_tolerance_default" => {
                let (currency, tolerance) = value
                    .split_once(':')
                    .ok_or_else(|| invalid("CURRENCY:TOLERANCE"))?;
                let tolerance =
                    Decimal::from_str(tolerance).map_err(|_| invalid("CURRENCY:TOLERANCE"))?;
                self.inferred_tolerance_default
                    .insert(currency.to_string(), tolerance);
            }
            "plugin_processing_mode" => {
                self.plugin_processing_mode = match value {
                    "default" => ProcessingMode::Default,
                    "raw" => ProcessingMode::Raw,
                    _ => return Err(invalid("\"default\" or \"raw\"")),
                };
            }
            _ => {
                self.custom.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Record a declared plugin, skipping exact repeats.
    pub fn add_plugin(&mut self, name: &str, config: Option<&str>) {
        let decl = PluginDecl {
            name: name.to_string(),
            config: config.map(str::to_string),
        };
        if !self.plugin.contains(&decl) {
            self.plugin.push(decl);
        }
    }

    /// Record a currency seen in the ledger.
    pub fn add_commodity(&mut self, currency: &str) {
        push_unique(&mut self.commodities, currency);
    }

    /// Record a file of the include closure.
    pub fn add_include(&mut self, path: &str) {
        push_unique(&mut self.include, path);
    }

    /// The five root account names, in canonical order.
    #[must_use]
    pub fn account_types(&self) -> [&str; 5] {
        [
            &self.name_assets,
            &self.name_liabilities,
            &self.name_equity,
            &self.name_income,
            &self.name_expenses,
        ]
    }

    /// Tolerance to apply to `currency` when nothing more specific is known.
    #[must_use]
    pub fn default_tolerance(&self, currency: &str) -> Option<Decimal> {
        self.inferred_tolerance_default
            .get(currency)
            .or_else(|| self.inferred_tolerance_default.get("*"))
            .copied()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let opts = Options::new();
        assert_eq!(
            opts.account_types(),
            ["Assets", "Liabilities", "Equity", "Income", "Expenses"]
        );
        assert_eq!(opts.booking_method, BookingMethod::Strict);
        assert!(opts.input_hash.is_none());
    }

    #[test]
    fn test_accumulating_option_dedups() {
        let mut opts = Options::new();
        opts.set("operating_currency", "USD").unwrap();
        opts.set("operating_currency", "CAD").unwrap();
        opts.set("operating_currency", "USD").unwrap();
        assert_eq!(opts.operating_currency, vec!["USD", "CAD"]);
        assert!(Options::is_accumulating("operating_currency"));
        assert!(!Options::is_accumulating("title"));
    }

    #[test]
    fn test_invalid_booking_method_keeps_default() {
        let mut opts = Options::new();
        let err = opts.set("booking_method", "RANDOM").unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));
        assert!(err.to_string().contains("STRICT"));
        assert_eq!(opts.booking_method, BookingMethod::Strict);
    }

    #[test]
    fn test_read_only_option() {
        let mut opts = Options::new();
        assert_eq!(
            opts.set("include", "other.beancount"),
            Err(OptionError::ReadOnly {
                key: "include".to_string()
            })
        );
        assert!(opts.include.is_empty());
        assert!(opts.set("missing_includes", "later.beancount").is_err());
        assert!(opts.missing_includes.is_empty());
    }

    #[test]
    fn test_tolerance_default() {
        let mut opts = Options::new();
        opts.set("inferred_tolerance_default", "*:0.001").unwrap();
        opts.set("inferred_tolerance_default", "USD:0.01").unwrap();
        assert_eq!(opts.default_tolerance("USD"), Some(dec!(0.01)));
        assert_eq!(opts.default_tolerance("CAD"), Some(dec!(0.001)));
        assert!(opts.set("inferred_tolerance_default", "0.01").is_err());
    }

    #[test]
    fn test_unknown_option_is_kept() {
        let mut opts = Options::new();
        opts.set("fava_option", "x").unwrap();
        assert_eq!(opts.custom.get("fava_option").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_plugins_keep_declaration_order() {
        let mut opts = Options::new();
        opts.add_plugin("b", None);
        opts.add_plugin("a", Some("cfg"));
        opts.add_plugin("b", None);
        let names: Vec<_> = opts.plugin.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
