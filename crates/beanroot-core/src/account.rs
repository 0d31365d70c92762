//! Account name helpers.
//!
//! Account names are colon-separated paths such as `Assets:US:Bank`. The
//! empty string is the root of the account tree.

/// Separator between account name segments.
pub const SEP: char = ':';

/// Join two path pieces, treating the empty string as the root.
#[must_use]
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}{SEP}{child}")
    }
}

/// Parent of `account`, or `None` for the root.
///
/// ```
/// use beanroot_core::account;
/// assert_eq!(account::parent("Assets:US:Bank"), Some("Assets:US"));
/// assert_eq!(account::parent("Assets"), Some(""));
/// assert_eq!(account::parent(""), None);
/// ```
#[must_use]
pub fn parent(account: &str) -> Option<&str> {
    if account.is_empty() {
        return None;
    }
    Some(account.rsplit_once(SEP).map_or("", |(parent, _)| parent))
}

/// Last segment of `account`.
#[must_use]
pub fn leaf(account: &str) -> &str {
    account.rsplit_once(SEP).map_or(account, |(_, leaf)| leaf)
}

/// First segment of `account`.
#[must_use]
pub fn root(account: &str) -> &str {
    account.split_once(SEP).map_or(account, |(root, _)| root)
}

/// Segments of `account`; empty for the root.
pub fn components(account: &str) -> impl Iterator<Item = &str> {
    account.split(SEP).filter(|s| !s.is_empty())
}

/// True when `account` is `ancestor` itself or lies below it.
#[must_use]
pub fn is_under(account: &str, ancestor: &str) -> bool {
    ancestor.is_empty()
        || account == ancestor
        || (account.starts_with(ancestor) && account[ancestor.len()..].starts_with(SEP))
}

/// A segment is non-empty and does not contain the separator.
#[must_use]
pub fn is_segment(key: &str) -> bool {
    !key.is_empty() && !key.contains(SEP)
}

/// Check that `account` starts with one of `roots` and has no empty segment.
#[must_use]
pub fn is_valid(account: &str, roots: &[&str]) -> bool {
    !account.is_empty()
        && account.split(SEP).all(|s| !s.is_empty())
        && roots.contains(&root(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "Assets"), "Assets");
        assert_eq!(join("Assets", "Cash"), "Assets:Cash");
    }

    #[test]
    fn test_leaf_and_root() {
        assert_eq!(leaf("Assets:US:Bank"), "Bank");
        assert_eq!(leaf("Assets"), "Assets");
        assert_eq!(root("Assets:US:Bank"), "Assets");
    }

    #[test]
    fn test_components() {
        assert_eq!(
            components("Assets:US:Bank").collect::<Vec<_>>(),
            vec!["Assets", "US", "Bank"]
        );
        assert_eq!(components("").count(), 0);
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("Assets:US:Bank", "Assets:US"));
        assert!(is_under("Assets:US", "Assets:US"));
        assert!(!is_under("Assets:USD", "Assets:US"));
        assert!(is_under("Income", ""));
    }

    #[test]
    fn test_is_valid() {
        let roots = ["Assets", "Expenses"];
        assert!(is_valid("Assets:Cash", &roots));
        assert!(!is_valid("Assets::Cash", &roots));
        assert!(!is_valid("Revenue:Sales", &roots));
        assert!(!is_segment("Assets:Cash"));
        assert!(!is_segment(""));
    }
}
