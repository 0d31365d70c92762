//! Stages that run before user plugins unless the ledger asks for raw
//! processing.
//!
//! In order: booking, interpolation, pad expansion, balance assertions.

use std::collections::BTreeMap;

use beanroot_booking::{
    book_transactions, interpolate, process_pads, BookingConfig, DEFAULT_COST_TOLERANCE,
};
use beanroot_core::{account, Amount, Balance, Directive, Inventory, Options};

use crate::{Plugin, PluginError, PluginInput, PluginOutput};

/// The default stages, in the order they run.
#[must_use]
pub fn default_stages() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(BookStage),
        Box::new(InterpolateStage),
        Box::new(PadStage),
        Box::new(BalanceStage),
    ]
}

/// Books every posting against its account's lots.
pub struct BookStage;

impl BookStage {
    fn config(options: &Options) -> BookingConfig {
        BookingConfig::default()
            .with_method(options.booking_method)
            .with_cost_tolerance(DEFAULT_COST_TOLERANCE)
    }
}

impl Plugin for BookStage {
    fn name(&self) -> &'static str {
        "book"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let booked = book_transactions(input.directives, &Self::config(input.options));
        Ok(PluginOutput {
            directives: booked.directives,
            errors: booked.errors.into_iter().map(PluginError::from).collect(),
        })
    }
}

/// Fills missing posting amounts and checks that transactions balance.
pub struct InterpolateStage;

impl Plugin for InterpolateStage {
    fn name(&self) -> &'static str {
        "interpolate"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let mut errors = Vec::new();
        let directives = input
            .directives
            .into_iter()
            .map(|directive| {
                let Directive::Transaction(txn) = &directive else {
                    return directive;
                };
                match interpolate(txn, input.options) {
                    Ok(filled) => Directive::Transaction(filled),
                    Err(err) => {
                        errors.push(PluginError::at(self.name(), &directive, err.to_string()));
                        directive
                    }
                }
            })
            .collect();
        Ok(PluginOutput { directives, errors })
    }
}

/// Inserts padding transactions.
pub struct PadStage;

impl Plugin for PadStage {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let result = process_pads(input.directives);
        let errors = result
            .errors
            .into_iter()
            .map(|err| PluginError::Message {
                plugin: self.name().to_string(),
                message: err.to_string(),
                date: Some(err.date),
                location: None,
            })
            .collect();
        Ok(PluginOutput {
            directives: result.directives,
            errors,
        })
    }
}

/// Checks `balance` assertions against the units held by the account and
/// its descendants.
pub struct BalanceStage;

impl BalanceStage {
    fn tolerance(balance: &Balance, options: &Options) -> rust_decimal::Decimal {
        if let Some(tolerance) = balance.tolerance {
            return tolerance;
        }
        if balance.amount.number.scale() > 0 {
            return balance.amount.inferred_tolerance();
        }
        options
            .default_tolerance(&balance.amount.currency)
            .unwrap_or_default()
    }
}

impl Plugin for BalanceStage {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        let mut units: BTreeMap<&str, Inventory> = BTreeMap::new();
        let mut errors = Vec::new();

        for directive in &input.directives {
            match directive {
                Directive::Transaction(txn) => {
                    for posting in &txn.postings {
                        if let Some(amount) = &posting.units {
                            units.entry(&posting.account).or_default().add(amount, None);
                        }
                    }
                }
                Directive::Balance(balance) => {
                    let currency = &balance.amount.currency;
                    let actual = units
                        .iter()
                        .filter(|(name, _)| account::is_under(name, &balance.account))
                        .fold(rust_decimal::Decimal::ZERO, |total, (_, inv)| {
                            total.saturating_add(inv.units(currency))
                        });
                    let difference = actual.saturating_sub(balance.amount.number);
                    if difference.abs() > Self::tolerance(balance, input.options) {
                        errors.push(PluginError::at(
                            self.name(),
                            directive,
                            format!(
                                "balance failed for {}: expected {}, got {} ({} too {})",
                                balance.account,
                                balance.amount,
                                Amount::new(actual, currency.clone()),
                                difference.abs(),
                                if difference.is_sign_positive() { "much" } else { "little" },
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(PluginOutput {
            directives: input.directives,
            errors,
        })
    }
}
