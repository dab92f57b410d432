//! A handler that pushes alerts to phones through the Pushover API.

use super::{http_client, Handler};
use crate::config::{self, Requirements};
use crate::error::{ConfigError, DeliveryError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// The Pushover message endpoint.
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

const ENV_PREFIX: &str = "SIMULERT_PUSHOVER_";

#[derive(Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PushoverSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,
}

impl fmt::Debug for PushoverSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushoverSettings")
            .field("username", &self.username)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Pushover`] handler.
///
/// Unset fields fall back to `SIMULERT_PUSHOVER_TOKEN`,
/// `SIMULERT_PUSHOVER_USERNAME` and `SIMULERT_PUSHOVER_API_URL`.
#[derive(Debug, Default, Clone)]
pub struct PushoverBuilder {
    settings: PushoverSettings,
}

impl PushoverBuilder {
    /// The application API token alerts are sent from.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.settings.token = Some(token.into());
        self
    }

    /// The user key alerts are delivered to.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.settings.api_url = Some(api_url.into());
        self
    }

    pub fn build(self) -> Result<Pushover, ConfigError> {
        let settings = config::resolve(ENV_PREFIX, &self.settings)?;

        let mut requirements = Requirements::new("Pushover", ENV_PREFIX);
        let token = requirements.require_str("token", settings.token);
        let username = requirements.require_str("username", settings.username);

        let (Some(token), Some(username)) = (token, username) else {
            return Err(requirements.into_error());
        };
        Ok(Pushover {
            token,
            username,
            api_url: settings
                .api_url
                .unwrap_or_else(|| PUSHOVER_API_URL.to_string()),
            client: http_client()?,
        })
    }
}

/// Pushes alerts to smart phones using the Pushover app.
pub struct Pushover {
    token: String,
    username: String,
    api_url: String,
    client: Client,
}

impl fmt::Debug for Pushover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pushover")
            .field("username", &self.username)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl Pushover {
    pub fn builder() -> PushoverBuilder {
        PushoverBuilder::default()
    }

    /// Builds a handler entirely from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn post_to_api(&self, message: &str) -> Result<(), DeliveryError> {
        let form = [
            ("token", self.token.as_str()),
            ("user", self.username.as_str()),
            ("message", message),
        ];
        let response = self.client.post(&self.api_url).form(&form).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(())
    }
}

impl Handler for Pushover {
    fn kind(&self) -> &str {
        "Pushover"
    }

    fn destination(&self) -> String {
        self.username.clone()
    }

    #[instrument(skip(self, message), fields(user = %self.username))]
    fn send_message(&self, message: &str) -> Result<(), DeliveryError> {
        self.post_to_api(message)?;
        debug!("Pushover message delivered.");
        Ok(())
    }
}
