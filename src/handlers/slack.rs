//! A client for sending alerts to a Slack user.

use super::{http_client, Handler};
use crate::config::{self, Requirements};
use crate::error::{ConfigError, DeliveryError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument};

/// Base URL of the Slack Web API.
pub const SLACK_API_URL: &str = "https://slack.com/api";

const ENV_PREFIX: &str = "SIMULERT_SLACK_";

#[derive(Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SlackSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,
}

impl fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackSettings")
            .field("username", &self.username)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Slacker`] handler.
///
/// Unset fields fall back to `SIMULERT_SLACK_TOKEN`,
/// `SIMULERT_SLACK_USERNAME` and `SIMULERT_SLACK_API_URL`.
#[derive(Debug, Default, Clone)]
pub struct SlackerBuilder {
    settings: SlackSettings,
}

impl SlackerBuilder {
    /// The bot token messages are posted with.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.settings.token = Some(token.into());
        self
    }

    /// The Slack user that receives the direct messages.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.settings.api_url = Some(api_url.into());
        self
    }

    pub fn build(self) -> Result<Slacker, ConfigError> {
        let settings = config::resolve(ENV_PREFIX, &self.settings)?;

        let mut requirements = Requirements::new("Slack", ENV_PREFIX);
        let token = requirements.require_str("token", settings.token);
        let username = requirements.require_str("username", settings.username);

        let (Some(token), Some(username)) = (token, username) else {
            return Err(requirements.into_error());
        };
        Ok(Slacker {
            token,
            username,
            api_url: settings
                .api_url
                .unwrap_or_else(|| SLACK_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client()?,
        })
    }
}

/// Sends alerts as Slack direct messages via `chat.postMessage`.
pub struct Slacker {
    token: String,
    username: String,
    api_url: String,
    client: Client,
}

impl fmt::Debug for Slacker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slacker")
            .field("username", &self.username)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl Slacker {
    pub fn builder() -> SlackerBuilder {
        SlackerBuilder::default()
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

    /// The channel messages are posted to, the user's direct messages.
    pub fn channel(&self) -> String {
        format!("@{}", self.username)
    }

    fn post_message(&self, payload: &Value) -> Result<(), DeliveryError> {
        let url = format!("{}/chat.postMessage", self.api_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }

        // Slack reports most failures with a 200 and `"ok": false`.
        let body: Value = response.json()?;
        if body["ok"].as_bool() != Some(true) {
            let reason = body["error"].as_str().unwrap_or("unknown error");
            return Err(DeliveryError::Rejected(reason.to_string()));
        }
        Ok(())
    }
}

impl Handler for Slacker {
    fn kind(&self) -> &str {
        "Slack"
    }

    fn destination(&self) -> String {
        self.username.clone()
    }

    #[instrument(skip(self, message), fields(channel = %self.channel()))]
    fn send_message(&self, message: &str) -> Result<(), DeliveryError> {
        let payload = json!({ "channel": self.channel(), "text": message });
        self.post_message(&payload)?;
        debug!("Slack message delivered.");
        Ok(())
    }
}
