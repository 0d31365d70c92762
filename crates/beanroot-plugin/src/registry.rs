//! Plugin lookup by name.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::native::{AutoAccountsPlugin, FilterFuturePlugin, ImplicitPricesPlugin};
use crate::Plugin;

/// Prefix accepted in front of registered names.
pub const PLUGIN_PREFIX: &str = "beancount.plugins.";

/// Name to plugin table.
///
/// Built once and handed to the loader; there is no global registry.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

impl PluginRegistry {
    /// A registry with no plugins.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the native plugins.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(AutoAccountsPlugin);
        registry.register(ImplicitPricesPlugin);
        registry.register(FilterFuturePlugin);
        registry
    }

    /// Add `plugin` under its own name, replacing any previous one.
    pub fn register(&mut self, plugin: impl Plugin + 'static) {
        self.plugins
            .insert(plugin.name().to_string(), Arc::new(plugin));
    }

    /// Look up `name`, with or without [`PLUGIN_PREFIX`].
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let name = name.strip_prefix(PLUGIN_PREFIX).unwrap_or(name);
        self.plugins.get(name).cloned()
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

/// Old plugin names and their replacements.
///
/// Resolving an old name warns once per name for the life of the table.
#[derive(Debug)]
pub struct DeprecatedPlugins {
    renames: BTreeMap<String, String>,
    warned: Mutex<HashSet<String>>,
}

impl Default for DeprecatedPlugins {
    fn default() -> Self {
        Self::new([
            (
                "beancount.ops.auto_accounts",
                "beancount.plugins.auto_accounts",
            ),
            (
                "beancount.ops.implicit_prices",
                "beancount.plugins.implicit_prices",
            ),
        ])
    }
}

impl DeprecatedPlugins {
    /// A table of `(old, new)` names.
    pub fn new<'a>(renames: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            renames: renames
                .into_iter()
                .map(|(old, new)| (old.to_string(), new.to_string()))
                .collect(),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// The name to look up for `name`.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        let Some(replacement) = self.renames.get(name) else {
            return name;
        };
        let mut warned = self.warned.lock().unwrap_or_else(PoisonError::into_inner);
        if warned.insert(name.to_string()) {
            warn!(
                plugin = name,
                replacement = replacement.as_str(),
                "plugin name is deprecated"
            );
        }
        replacement
    }

    /// True once `name` has been resolved through this table.
    pub fn was_warned(&self, name: &str) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_with_prefix() {
        let registry = PluginRegistry::builtin();
        assert!(registry.find("auto_accounts").is_some());
        assert!(registry.find("beancount.plugins.implicit_prices").is_some());
        assert!(registry.find("beancount.plugins.nope").is_none());
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["auto_accounts", "filter_future", "implicit_prices"]
        );
    }

    #[test]
    fn test_deprecated_warns_once() {
        let table = DeprecatedPlugins::default();
        assert!(!table.was_warned("beancount.ops.auto_accounts"));
        assert_eq!(
            table.resolve("beancount.ops.auto_accounts"),
            "beancount.plugins.auto_accounts"
        );
        assert!(table.was_warned("beancount.ops.auto_accounts"));
        assert_eq!(
            table.resolve("beancount.ops.auto_accounts"),
            "beancount.plugins.auto_accounts"
        );
        assert_eq!(table.resolve("mine.plugin"), "mine.plugin");
        assert!(!table.was_warned("mine.plugin"));
    }
}
