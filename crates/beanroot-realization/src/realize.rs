//! Building the tree from a directive stream.

use std::collections::BTreeMap;
use tracing::debug;

use beanroot_booking::{account_methods, book, BookingConfig, BookingFailure, BookingRequest};
use beanroot_core::{Directive, Inventory};

use crate::{RealAccount, RealPosting};

/// A realized tree and the booking errors met while building it.
#[derive(Debug, Clone, Default)]
pub struct Realization<'a> {
    /// Root of the tree, with the empty path.
    pub root: RealAccount<'a>,
    /// Reductions that could not be booked cleanly, grouped by account in
    /// account order, then in ledger order.
    pub errors: Vec<BookingFailure>,
}

/// Group `entries` by the accounts they touch, keeping ledger order.
///
/// Each posting of a transaction is its own item, so a transaction posting
/// twice to an account shows up twice in that account's list. A pad is
/// listed under both its account and its source account.
pub fn group_by_account(entries: &[Directive]) -> BTreeMap<&str, Vec<RealPosting<'_>>> {
    let mut groups: BTreeMap<&str, Vec<RealPosting<'_>>> = BTreeMap::new();
    for entry in entries {
        match entry {
            Directive::Transaction(txn) => {
                for posting in &txn.postings {
                    groups
                        .entry(posting.account.as_str())
                        .or_default()
                        .push(RealPosting::Posting { entry, posting });
                }
            }
            other => {
                let mut accounts = other.accounts();
                accounts.dedup();
                for account in accounts {
                    groups
                        .entry(account)
                        .or_default()
                        .push(RealPosting::Entry(other));
                }
            }
        }
    }
    groups
}

/// Realize `entries` with default booking, discarding booking errors.
///
/// Every name in `min_accounts` is created even when nothing touches it.
pub fn realize<'a>(entries: &'a [Directive], min_accounts: &[&str]) -> RealAccount<'a> {
    realize_with(entries, min_accounts, &BookingConfig::default()).root
}

/// Realize `entries`, booking each account's postings in order.
///
/// Accounts use the method of their `open` directive, or
/// `config.default_method`. Nodes keep only their final balance; use
/// [`iterate_with_balance`](crate::iterate_with_balance) for the running
/// one.
pub fn realize_with<'a>(
    entries: &'a [Directive],
    min_accounts: &[&str],
    config: &BookingConfig,
) -> Realization<'a> {
    let (methods, mut errors) = account_methods(entries, config.default_method);
    let mut root = RealAccount::new("");

    for (account, postings) in group_by_account(entries) {
        let method = methods
            .get(account)
            .copied()
            .unwrap_or(config.default_method);
        let node = root.get_or_create(account);
        for item in &postings {
            let RealPosting::Posting { entry, posting } = *item else {
                continue;
            };
            let Some(units) = &posting.units else {
                continue;
            };
            let request = BookingRequest {
                account,
                units,
                cost: posting.cost.as_ref(),
                date: entry.date(),
                method,
            };
            if let Some(error) = book(&mut node.balance, &request, config).error {
                errors.push(BookingFailure {
                    date: entry.date(),
                    location: entry.location(),
                    error,
                });
            }
        }
        node.postings = postings;
    }

    for account in min_accounts {
        root.get_or_create(account);
    }

    debug!(
        entries = entries.len(),
        errors = errors.len(),
        "realized accounts"
    );
    Realization { root, errors }
}

/// Balance of `node` and everything below it.
#[must_use]
pub fn compute_balance(node: &RealAccount<'_>) -> Inventory {
    let mut total = Inventory::new();
    for descendant in node.iter_children(false) {
        total.merge(&descendant.balance);
    }
    total
}

/// One line per account below `root`, indented by depth, with its balance.
#[must_use]
pub fn dump_balances(root: &RealAccount<'_>, leaves_only: bool) -> String {
    let base = beanroot_core::account::components(root.account()).count();
    let rows: Vec<(String, String)> = root
        .iter_children(leaves_only)
        .filter(|node| node.account() != root.account())
        .map(|node| {
            let label = if leaves_only {
                node.account().to_string()
            } else {
                let depth = beanroot_core::account::components(node.account()).count() - base - 1;
                format!("{:indent$}{}", "", node.name(), indent = depth * 2)
            };
            let balance = if node.balance.is_empty() {
                String::new()
            } else {
                node.balance
                    .positions()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            (label, balance)
        })
        .collect();

    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, balance) in rows {
        let line = format!("{label:<width$}  {balance}");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
