//! Delivery backends for alerts.
//!
//! Every backend implements [`Handler`]. The provided [`Handler::alert`]
//! wraps the backend's raw delivery and turns any failure into an error log
//! entry, so a broadcast always reaches every registered handler.

pub mod email;
pub mod logs;
pub mod pushover;
pub mod slack;

pub use email::{Emailer, EmailerBuilder, LettreTransport, MailTransport};
pub use logs::LogHandler;
pub use pushover::{Pushover, PushoverBuilder};
pub use slack::{Slacker, SlackerBuilder};

use crate::error::{ConfigError, DeliveryError};
use chrono::Local;
use reqwest::blocking::Client;
use std::sync::Arc;
use tracing::error;

/// A handler shared between an alerter and its callers.
pub type SharedHandler = Arc<dyn Handler>;

/// A pluggable delivery mechanism for alert messages.
pub trait Handler: Send + Sync {
    /// A short label for the backend, used in logs (e.g. "Slack").
    fn kind(&self) -> &str;

    /// Who receives this handler's messages.
    fn destination(&self) -> String;

    /// Delivers `message`, reporting any failure to the caller.
    fn send_message(&self, message: &str) -> Result<(), DeliveryError>;

    /// Delivers `message`, logging instead of returning any failure.
    fn alert(&self, message: &str) {
        if let Err(err) = self.send_message(message) {
            error!(
                handler = self.kind(),
                destination = %self.destination(),
                error = ?err,
                "{} notification to {} failed with {}",
                self.kind(),
                self.destination(),
                err
            );
        }
    }

    /// Sends a canned, timestamped message through the normal delivery path.
    fn send_test_message(&self) -> Result<(), DeliveryError> {
        self.send_message(&test_message("message"))
    }
}

/// Body of a connectivity check, e.g. "This test message was sent at ...".
pub(crate) fn test_message(noun: &str) -> String {
    format!("This test {noun} was sent at {}", Local::now())
}

/// The blocking HTTP client shared by the web API handlers.
pub(crate) fn http_client() -> Result<Client, ConfigError> {
    Client::builder().build().map_err(ConfigError::HttpClient)
}
