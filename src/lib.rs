//! simulert - alerts for long-running simulations
//!
//! This library lets a computation notify interested parties (logs, email,
//! Slack or Pushover) when it completes or fails.
pub mod alerter;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod runner;

// Re-export core types for convenience
pub use alerter::{Alerter, Outcome, SimulationAlert};
pub use error::{AlerterError, ConfigError, DeliveryError};
pub use handlers::{Handler, SharedHandler};
pub use registry::{get_alerter, AlerterRegistry};
