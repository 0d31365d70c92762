//! Directive transformation passes.
//!
//! A [`Plugin`] takes the whole, date-sorted directive list and returns a
//! new one along with any ledger errors it found. The loader runs
//! [`default_stages`] first (unless the ledger sets
//! `plugin_processing_mode` to `raw`), then each plugin the ledger declares,
//! looked up by name in a [`PluginRegistry`].
//!
//! # Native plugins
//!
//! - `auto_accounts`: opens accounts that are used without an `open`
//! - `implicit_prices`: adds `price` entries from posting prices and costs
//! - `filter_future`: drops transactions after a cutoff date
//!
//! # Example
//!
//! ```
//! use beanroot_core::Options;
//! use beanroot_plugin::{PluginInput, PluginRegistry};
//!
//! let registry = PluginRegistry::builtin();
//! let plugin = registry.find("beancount.plugins.auto_accounts").unwrap();
//! let options = Options::new();
//! let output = plugin
//!     .process(PluginInput {
//!         directives: Vec::new(),
//!         options: &options,
//!         config: None,
//!     })
//!     .unwrap();
//! assert!(output.directives.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtin;
pub mod native;
mod registry;
mod types;

pub use builtin::default_stages;
pub use registry::{DeprecatedPlugins, PluginRegistry, PLUGIN_PREFIX};
pub use types::{Plugin, PluginError, PluginInput, PluginOutput};
