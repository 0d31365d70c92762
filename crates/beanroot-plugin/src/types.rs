//! The plugin interface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use beanroot_booking::BookingFailure;
use beanroot_core::{Directive, Location, NaiveDate, Options};

/// A transformation pass over the whole directive list.
///
/// A pass gets the directives by value and returns the new list. Problems
/// with the ledger go into [`PluginOutput::errors`]; returning `Err` means
/// the plugin itself broke and aborts the load.
pub trait Plugin: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Process directives and return the new directives and errors.
    fn process(&self, input: PluginInput<'_>) -> anyhow::Result<PluginOutput>;
}

/// Input to a plugin.
#[derive(Debug)]
pub struct PluginInput<'a> {
    /// Date-sorted directives.
    pub directives: Vec<Directive>,
    /// Ledger options. Read only.
    pub options: &'a Options,
    /// Configuration string from the `plugin` line.
    pub config: Option<&'a str>,
}

/// Output from a plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginOutput {
    /// Directives after the pass.
    pub directives: Vec<Directive>,
    /// Problems found in the ledger.
    pub errors: Vec<PluginError>,
}

impl PluginOutput {
    /// Output with no errors.
    #[must_use]
    pub const fn unchanged(directives: Vec<Directive>) -> Self {
        Self {
            directives,
            errors: Vec::new(),
        }
    }
}

/// A ledger problem reported by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PluginError {
    /// A posting that could not be booked.
    #[error(transparent)]
    Booking(#[from] BookingFailure),
    /// Anything else.
    #[error("{plugin}: {message}")]
    Message {
        /// Plugin that reported it.
        plugin: String,
        /// What went wrong.
        message: String,
        /// Date of the offending directive.
        date: Option<NaiveDate>,
        /// Where the offending directive was written.
        location: Option<Location>,
    },
}

impl PluginError {
    /// An error not tied to a directive.
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Message {
            plugin: plugin.into(),
            message: message.into(),
            date: None,
            location: None,
        }
    }

    /// An error about `directive`.
    pub fn at(plugin: impl Into<String>, directive: &Directive, message: impl Into<String>) -> Self {
        Self::Message {
            plugin: plugin.into(),
            message: message.into(),
            date: Some(directive.date()),
            location: directive.location(),
        }
    }

    /// Where the offending directive was written, if known.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        match self {
            Self::Booking(failure) => failure.location.as_ref(),
            Self::Message { location, .. } => location.as_ref(),
        }
    }
}
