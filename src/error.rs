//! Error types shared across the crate.
//!
//! Configuration problems surface while a handler is being built, delivery
//! problems stay inside a handler's `alert` and are only logged.

use std::fmt;
use thiserror::Error;

/// Errors raised by [`crate::Alerter`] handler bookkeeping.
#[derive(Debug, Error)]
pub enum AlerterError {
    #[error("{handler} handler is not registered with alerter {alerter:?}")]
    HandlerNotFound { alerter: String, handler: String },
}

/// A required configuration field that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Builder argument name, e.g. `host`.
    pub field: &'static str,
    /// Environment variable consulted when the argument is absent.
    pub env_var: String,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` (pass it to the builder or set {})",
            self.field, self.env_var
        )
    }
}

/// Errors raised while building a handler from its configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{handler} handler is missing required configuration: {}", join_fields(.missing))]
    MissingFields {
        handler: &'static str,
        missing: Vec<MissingField>,
    },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("failed to initialise the HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

impl ConfigError {
    /// Names of the missing fields, empty for other variants.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        match self {
            ConfigError::MissingFields { missing, .. } => {
                missing.iter().map(|m| m.field).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_fields(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while delivering a single message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("API rejected the message: {0}")]
    Rejected(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("transport error: {0}")]
    Transport(String),
}
