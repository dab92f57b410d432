//! The [`Alerter`]: a named, ordered set of handlers that every alert is
//! broadcast to, plus the scoped [`SimulationAlert`] that reports how a unit
//! of work ended.

use crate::error::AlerterError;
use crate::handlers::{Handler, LogHandler, SharedHandler};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, Level};

/// Display name used when a simulation is not given one.
pub const DEFAULT_SIMULATION_NAME: &str = "simulation";

/// Broadcasts alerts to a list of handlers.
///
/// A new alerter holds a single default [`LogHandler`] bound to a logger
/// named after the alerter. Handlers run in the order they were added.
pub struct Alerter {
    name: String,
    default_handler: SharedHandler,
    handlers: Mutex<Vec<SharedHandler>>,
}

impl Alerter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let default_handler: SharedHandler = Arc::new(LogHandler::new(name.clone(), Level::INFO));
        Self {
            handlers: Mutex::new(vec![default_handler.clone()]),
            default_handler,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A snapshot of the registered handlers.
    pub fn handlers(&self) -> Vec<SharedHandler> {
        self.lock().clone()
    }

    /// The log handler installed at construction.
    pub fn default_handler(&self) -> &SharedHandler {
        &self.default_handler
    }

    /// Whether this exact handler instance is registered.
    pub fn contains_handler<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.lock().iter().any(|h| same_handler(h, handler))
    }

    /// Appends `handler`. The same handler may be added more than once.
    pub fn add_handler(&self, handler: SharedHandler) -> &Self {
        debug!(alerter = %self.name, handler = handler.kind(), "Adding handler");
        self.lock().push(handler);
        self
    }

    /// Removes the first registration of this exact handler instance.
    pub fn remove_handler<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> Result<&Self, AlerterError> {
        let mut handlers = self.lock();
        let position = handlers
            .iter()
            .position(|h| same_handler(h, handler))
            .ok_or_else(|| AlerterError::HandlerNotFound {
                alerter: self.name.clone(),
                handler: handler.kind().to_string(),
            })?;
        handlers.remove(position);
        Ok(self)
    }

    /// Removes the default log handler.
    pub fn remove_default_handler(&self) -> Result<&Self, AlerterError> {
        let default_handler = self.default_handler.clone();
        self.remove_handler(&default_handler)
    }

    /// Sends `message` to every handler in order.
    ///
    /// Handlers contain their own delivery failures, so every handler is
    /// attempted and nothing is reported back to the caller.
    pub fn alert(&self, message: &str) {
        // Snapshot so handlers may call back into the alerter.
        for handler in self.handlers() {
            handler.alert(message);
        }
    }

    /// A scope that alerts once when the wrapped work completes or fails.
    pub fn simulation_alert(&self) -> SimulationAlert<'_> {
        SimulationAlert {
            alerter: self,
            name: DEFAULT_SIMULATION_NAME.to_string(),
        }
    }

    fn prefix(&self) -> String {
        if self.name.is_empty() {
            String::new()
        } else {
            format!("{}: ", self.name)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SharedHandler>> {
        self.handlers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for Alerter {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for Alerter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.lock().iter().map(|h| h.kind().to_string()).collect();
        f.debug_struct("Alerter")
            .field("name", &self.name)
            .field("handlers", &kinds)
            .finish()
    }
}

fn same_handler<H: Handler + ?Sized>(registered: &SharedHandler, candidate: &Arc<H>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(registered) as *const (),
        Arc::as_ptr(candidate) as *const (),
    )
}

/// How a wrapped simulation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Carries the failure's descriptive representation.
    Failed(String),
}

/// Wraps a unit of work and broadcasts exactly one alert when it ends.
///
/// Created by [`Alerter::simulation_alert`].
#[must_use = "a simulation alert does nothing until `run` is called"]
pub struct SimulationAlert<'a> {
    alerter: &'a Alerter,
    name: String,
}

impl SimulationAlert<'_> {
    /// Sets the display name used in the alert (default "simulation").
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The message broadcast for `outcome`.
    pub fn message(&self, outcome: &Outcome) -> String {
        let prefix = self.alerter.prefix();
        match outcome {
            Outcome::Completed => format!("{prefix}{} has completed without error.", self.name),
            Outcome::Failed(repr) => {
                format!("{prefix}{} failed to complete because of {repr}.", self.name)
            }
        }
    }

    /// Runs `work`, alerts with its outcome and hands the result back.
    ///
    /// An `Err` is reported with its `Debug` representation and returned
    /// unchanged. A panic is reported as `panic("<message>")` and then
    /// resumed with the original payload.
    pub fn run<T, E, F>(self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: fmt::Debug,
    {
        debug!(simulation = %self.name, alerter = %self.alerter.name, "Simulation started");
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => {
                self.alerter.alert(&self.message(&Outcome::Completed));
                Ok(value)
            }
            Ok(Err(err)) => {
                self.alerter
                    .alert(&self.message(&Outcome::Failed(format!("{err:?}"))));
                Err(err)
            }
            Err(payload) => {
                let repr = format!("panic({:?})", panic_message(payload.as_ref()));
                self.alerter.alert(&self.message(&Outcome::Failed(repr)));
                panic::resume_unwind(payload)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "Box<dyn Any>"
    }
}
