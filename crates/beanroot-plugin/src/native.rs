//! Native plugins users can declare with `plugin`.

use chrono::Local;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use beanroot_core::{
    sort_directives, Amount, Directive, NaiveDate, Open, Price, Transaction,
};

use crate::{Plugin, PluginError, PluginInput, PluginOutput};

/// Opens every account that is used without an `open` directive.
///
/// The generated `open` is dated on the account's first use.
pub struct AutoAccountsPlugin;

impl Plugin for AutoAccountsPlugin {
    fn name(&self) -> &'static str {
        "auto_accounts"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let mut opened: HashSet<&str> = HashSet::new();
        let mut first_use: BTreeMap<&str, NaiveDate> = BTreeMap::new();

        for directive in &input.directives {
            if let Directive::Open(open) = directive {
                opened.insert(&open.account);
            }
            for account in directive.accounts() {
                first_use.entry(account).or_insert_with(|| directive.date());
            }
        }

        let opens: Vec<Directive> = first_use
            .into_iter()
            .filter(|(account, _)| !opened.contains(account))
            .map(|(account, date)| Directive::Open(Open::new(date, account)))
            .collect();

        let mut directives = input.directives;
        directives.extend(opens);
        sort_directives(&mut directives);
        Ok(PluginOutput::unchanged(directives))
    }
}

/// Adds a `price` directive for each posting priced with `@`/`@@` or held
/// at a per-unit cost.
///
/// One price per (date, currency, price amount).
pub struct ImplicitPricesPlugin;

impl ImplicitPricesPlugin {
    fn prices(txn: &Transaction) -> Vec<(String, Amount)> {
        let mut prices = Vec::new();
        for posting in &txn.postings {
            let Some(units) = &posting.units else {
                continue;
            };
            if let Some(price) = posting.price.as_ref().and_then(|p| p.per_unit(units.number)) {
                prices.push((units.currency.clone(), price));
            } else if let Some(cost) = &posting.cost {
                if let (Some(number), Some(currency)) = (cost.number_per, &cost.currency) {
                    prices.push((units.currency.clone(), Amount::new(number, currency.clone())));
                }
            }
        }
        prices
    }
}

impl Plugin for ImplicitPricesPlugin {
    fn name(&self) -> &'static str {
        "implicit_prices"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let mut seen: BTreeSet<(NaiveDate, String, Amount)> = BTreeSet::new();
        for directive in &input.directives {
            if let Directive::Price(price) = directive {
                seen.insert((price.date, price.currency.clone(), price.amount.clone()));
            }
        }

        let mut directives = Vec::with_capacity(input.directives.len());
        for directive in input.directives {
            let generated: Vec<Directive> = match &directive {
                Directive::Transaction(txn) => Self::prices(txn)
                    .into_iter()
                    .filter(|(currency, amount)| {
                        seen.insert((txn.date, currency.clone(), amount.clone()))
                    })
                    .map(|(currency, amount)| {
                        Directive::Price(Price {
                            date: txn.date,
                            currency,
                            amount,
                            meta: txn.meta.clone(),
                        })
                    })
                    .collect(),
                _ => Vec::new(),
            };
            directives.push(directive);
            directives.extend(generated);
        }
        sort_directives(&mut directives);
        Ok(PluginOutput::unchanged(directives))
    }
}

/// Drops transactions dated after a cutoff.
///
/// The cutoff is the ISO date given as configuration, or today.
pub struct FilterFuturePlugin;

impl Plugin for FilterFuturePlugin {
    fn name(&self) -> &'static str {
        "filter_future"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let today = Local::now().date_naive();
        let (cutoff, errors) = match input.config.map(str::trim) {
            None | Some("") => (today, Vec::new()),
            Some(config) => match config.parse::<NaiveDate>() {
                Ok(date) => (date, Vec::new()),
                Err(_) => (
                    today,
                    vec![PluginError::new(
                        self.name(),
                        format!("invalid cutoff date {config:?}, using {today}"),
                    )],
                ),
            },
        };
        let directives = input
            .directives
            .into_iter()
            .filter(|d| !(matches!(d, Directive::Transaction(_)) && d.date() > cutoff))
            .collect();
        Ok(PluginOutput { directives, errors })
    }
}
