//! A handler that writes alerts to the application log.

use super::Handler;
use crate::error::DeliveryError;
use tracing::{debug, error, info, trace, warn, Level};

/// Writes every alert to `tracing` at a fixed level.
///
/// Alerters install one of these by default, bound to a logger named after
/// the alerter.
#[derive(Debug, Clone)]
pub struct LogHandler {
    logger: String,
    level: Level,
}

impl LogHandler {
    pub fn new(logger: impl Into<String>, level: Level) -> Self {
        Self {
            logger: logger.into(),
            level,
        }
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Handler for LogHandler {
    fn kind(&self) -> &str {
        "Log"
    }

    fn destination(&self) -> String {
        format!("logger {:?}", self.logger)
    }

    fn send_message(&self, message: &str) -> Result<(), DeliveryError> {
        let logger = self.logger.as_str();
        match self.level {
            Level::ERROR => error!(logger = %logger, "{message}"),
            Level::WARN => warn!(logger = %logger, "{message}"),
            Level::INFO => info!(logger = %logger, "{message}"),
            Level::DEBUG => debug!(logger = %logger, "{message}"),
            _ => trace!(logger = %logger, "{message}"),
        }
        Ok(())
    }
}
