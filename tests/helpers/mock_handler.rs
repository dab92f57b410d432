//! A handler that records what it receives instead of delivering it.

use simulert::{Alerter, DeliveryError, Handler};
use std::sync::{Arc, Mutex};

/// Captures messages and, optionally, pretends delivery failed.
///
/// Every handler sharing a `journal` appends `"<label>: <message>"` to it, so
/// tests can check the order handlers ran in.
#[derive(Debug)]
pub struct MockHandler {
    label: String,
    fail: bool,
    messages: Mutex<Vec<String>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockHandler {
    pub fn new() -> Arc<Self> {
        Self::with_journal("mock", Arc::default())
    }

    pub fn with_journal(label: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            fail: false,
            messages: Mutex::new(Vec::new()),
            journal,
        })
    }

    pub fn failing(label: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            fail: true,
            messages: Mutex::new(Vec::new()),
            journal,
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn called_with(&self, message: &str) -> bool {
        self.messages().iter().any(|m| m == message)
    }

    pub fn last_called_with(&self, message: &str) -> bool {
        self.messages().last().map(String::as_str) == Some(message)
    }
}

impl Handler for MockHandler {
    fn kind(&self) -> &str {
        "Mock"
    }

    fn destination(&self) -> String {
        self.label.clone()
    }

    fn send_message(&self, message: &str) -> Result<(), DeliveryError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}: {}", self.label, message));
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(DeliveryError::Transport("simulated outage".to_string()));
        }
        Ok(())
    }
}

/// An alerter named "mock" whose only handler is `handler`.
pub fn alerter_with_mock_handler(handler: &Arc<MockHandler>) -> Alerter {
    let alerter = Alerter::new("mock");
    alerter
        .remove_default_handler()
        .unwrap()
        .add_handler(handler.clone());
    alerter
}
