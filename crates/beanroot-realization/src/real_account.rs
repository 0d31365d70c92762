//! The account tree.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use beanroot_core::{account, Directive, Inventory, Posting};

/// Misuse of the tree API. Returned immediately, never accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealizationError {
    /// A child key must be a single non-empty segment.
    #[error("invalid child key {key:?}: expected a non-empty name without ':'")]
    InvalidKey {
        /// Offending key.
        key: String,
    },
    /// The child's own path doesn't extend the parent's by the key.
    #[error("child account {found:?} cannot be stored as {expected:?}")]
    PathMismatch {
        /// Path the child must have.
        expected: String,
        /// Path the child has.
        found: String,
    },
}

/// One item of an account's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealPosting<'a> {
    /// A directive naming the account (open, close, pad, balance, ...).
    Entry(&'a Directive),
    /// A posting to the account, with the transaction that owns it.
    Posting {
        /// The transaction directive.
        entry: &'a Directive,
        /// The posting.
        posting: &'a Posting,
    },
}

impl<'a> RealPosting<'a> {
    /// The directive this item belongs to.
    #[must_use]
    pub const fn entry(&self) -> &'a Directive {
        match self {
            Self::Entry(entry) | Self::Posting { entry, .. } => entry,
        }
    }

    /// The posting, for transaction items.
    #[must_use]
    pub const fn posting(&self) -> Option<&'a Posting> {
        match self {
            Self::Entry(_) => None,
            Self::Posting { posting, .. } => Some(posting),
        }
    }
}

/// A node of the realized account tree.
///
/// Children are keyed by their last path segment. The root has the empty
/// path. Nodes own their children; there are no parent links, a parent is
/// found through [`account::parent`] on the path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealAccount<'a> {
    account: String,
    children: BTreeMap<String, RealAccount<'a>>,
    /// Items touching exactly this account, in ledger order.
    pub postings: Vec<RealPosting<'a>>,
    /// Final balance of this account alone.
    pub balance: Inventory,
}

impl<'a> RealAccount<'a> {
    /// An empty node for `account`.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }

    /// Full path of this node.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Last segment of the path; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        account::leaf(&self.account)
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True without children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// True when `key` is a direct child.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.children.contains_key(key)
    }

    /// Direct children in name order.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.values()
    }

    /// Direct child named `key`.
    #[must_use]
    pub fn child(&self, key: &str) -> Option<&Self> {
        self.children.get(key)
    }

    /// Descendant at `path`, relative to this node.
    ///
    /// Never creates anything. The empty path names no descendant.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Self> {
        if path.is_empty() {
            return None;
        }
        path.split(account::SEP)
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    /// Mutable counterpart of [`get`](Self::get).
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Self> {
        if path.is_empty() {
            return None;
        }
        path.split(account::SEP)
            .try_fold(self, |node, segment| node.children.get_mut(segment))
    }

    /// Descendant at `path`, creating it and any missing ancestors.
    ///
    /// The empty path is this node itself.
    pub fn get_or_create(&mut self, path: &str) -> &mut Self {
        let mut node = self;
        for segment in account::components(path) {
            let child_path = account::join(&node.account, segment);
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Self::new(child_path));
        }
        node
    }

    /// Store `child` under `key`, returning the node it replaces.
    pub fn insert(&mut self, key: &str, child: Self) -> Result<Option<Self>, RealizationError> {
        if !account::is_segment(key) {
            return Err(RealizationError::InvalidKey {
                key: key.to_string(),
            });
        }
        let expected = account::join(&self.account, key);
        if child.account != expected {
            return Err(RealizationError::PathMismatch {
                expected,
                found: child.account,
            });
        }
        Ok(self.children.insert(key.to_string(), child))
    }

    /// Remove the direct child named `key`.
    pub fn remove(&mut self, key: &str) -> Option<Self> {
        self.children.remove(key)
    }

    /// This node and every descendant, depth first, children in name order.
    pub fn iter_children(&self, leaves_only: bool) -> IterChildren<'_, 'a> {
        IterChildren {
            stack: vec![self],
            leaves_only,
        }
    }
}

impl fmt::Display for RealAccount<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = account::components(&self.account).count();
        for node in self.iter_children(false).skip(1) {
            let depth = account::components(&node.account).count() - base - 1;
            writeln!(f, "{:indent$}{}", "", node.name(), indent = depth * 2)?;
        }
        Ok(())
    }
}

/// Pre-order walk returned by [`RealAccount::iter_children`].
pub struct IterChildren<'r, 'a> {
    stack: Vec<&'r RealAccount<'a>>,
    leaves_only: bool,
}

impl<'r, 'a> Iterator for IterChildren<'r, 'a> {
    type Item = &'r RealAccount<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.stack.pop()?;
            self.stack.extend(node.children.values().rev());
            if !self.leaves_only || node.is_empty() {
                return Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RealAccount<'static> {
        let mut root = RealAccount::new("");
        for path in [
            "Assets:US:Bank",
            "Assets:CA:Cash",
            "Income:Salary",
            "Expenses:Food",
        ] {
            root.get_or_create(path);
        }
        root
    }

    #[test]
    fn test_get_never_creates() {
        let root = tree();
        assert!(root.get("Assets:US:Bank").is_some());
        assert!(root.get("Assets:EU").is_none());
        assert!(root.get("").is_none());
        assert!(root.get("Assets::Bank").is_none());
        assert_eq!(root.len(), 3);
    }

    #[test]
    fn test_get_or_create_builds_paths() {
        let mut root = RealAccount::new("");
        let node = root.get_or_create("Liabilities:Card");
        assert_eq!(node.account(), "Liabilities:Card");
        assert_eq!(node.name(), "Card");
        assert_eq!(root.get("Liabilities").unwrap().account(), "Liabilities");
        assert_eq!(root.get_or_create("").account(), "");
    }

    #[test]
    fn test_insert_checks_key_and_path() {
        let mut root = RealAccount::new("");
        assert!(root.insert("Assets", RealAccount::new("Assets")).unwrap().is_none());
        assert_eq!(
            root.insert("", RealAccount::new("")),
            Err(RealizationError::InvalidKey { key: String::new() })
        );
        assert!(matches!(
            root.insert("Assets:Cash", RealAccount::new("Assets:Cash")),
            Err(RealizationError::InvalidKey { .. })
        ));
        assert!(matches!(
            root.insert("Income", RealAccount::new("Assets")),
            Err(RealizationError::PathMismatch { .. })
        ));

        let assets = root.get_mut("Assets").unwrap();
        assert!(assets.insert("Cash", RealAccount::new("Assets:Cash")).is_ok());
        assert!(root.get("Assets:Cash").is_some());
    }

    #[test]
    fn test_iter_children_pre_order() {
        let root = tree();
        let paths: Vec<&str> = root.iter_children(false).map(RealAccount::account).collect();
        assert_eq!(
            paths,
            vec![
                "",
                "Assets",
                "Assets:CA",
                "Assets:CA:Cash",
                "Assets:US",
                "Assets:US:Bank",
                "Expenses",
                "Expenses:Food",
                "Income",
                "Income:Salary",
            ]
        );

        let leaves: Vec<&str> = root.iter_children(true).map(RealAccount::account).collect();
        assert_eq!(
            leaves,
            vec!["Assets:CA:Cash", "Assets:US:Bank", "Expenses:Food", "Income:Salary"]
        );
    }

    #[test]
    fn test_display_nests_names() {
        let mut root = RealAccount::new("");
        root.get_or_create("Assets:Cash");
        assert_eq!(root.to_string(), "Assets\n  Cash\n");
    }
}
