//! Configuration management for simulert
//!
//! Handler settings are resolved field by field: explicit builder values win,
//! then `SIMULERT_<HANDLER>_<FIELD>` environment variables. Application
//! settings for the binary are layered defaults, an optional TOML file,
//! `SIMULERT_` environment variables and command-line flags.

use crate::error::{ConfigError, MissingField};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment, Provider,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Prefix shared by every environment variable the crate reads.
pub const ENV_PREFIX: &str = "SIMULERT_";

/// Resolves a handler's settings struct from explicit values and the
/// environment.
///
/// `S` must mark every field optional and skip `None` when serialized so
/// that unset explicit values do not shadow the environment. Blank strings
/// count as unset on both sides. Environment values are taken verbatim, so
/// a key like `123456` stays a string; numeric fields still parse from it.
pub(crate) fn resolve<S>(env_prefix: &str, explicit: &S) -> Result<S, ConfigError>
where
    S: Serialize + DeserializeOwned,
{
    let env: Dict = Env::prefixed(env_prefix)
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.as_str().to_string(), Value::from(value)))
        .collect();

    let explicit: Dict = Figment::from(Serialized::defaults(explicit)).extract()?;
    let explicit: Dict = explicit
        .into_iter()
        .filter(|(_, value)| !is_blank(value))
        .collect();

    let settings = Figment::new()
        .merge(Serialized::defaults(env))
        .merge(Serialized::defaults(explicit))
        .extract_lossy()?;
    Ok(settings)
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(_, s) if s.trim().is_empty())
}

/// Collects required fields that are still unset after resolution.
pub(crate) struct Requirements {
    handler: &'static str,
    env_prefix: &'static str,
    missing: Vec<MissingField>,
}

impl Requirements {
    pub(crate) fn new(handler: &'static str, env_prefix: &'static str) -> Self {
        Self {
            handler,
            env_prefix,
            missing: Vec::new(),
        }
    }

    /// Records `field` as missing when `value` is `None`.
    pub(crate) fn require<T>(&mut self, field: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.missing.push(MissingField {
                field,
                env_var: format!("{}{}", self.env_prefix, field.to_uppercase()),
            });
        }
        value
    }

    /// Like [`Requirements::require`], treating blank strings as unset.
    pub(crate) fn require_str(&mut self, field: &'static str, value: Option<String>) -> Option<String> {
        self.require(field, value.filter(|v| !v.trim().is_empty()))
    }

    /// The error naming every field recorded so far.
    pub(crate) fn into_error(self) -> ConfigError {
        ConfigError::MissingFields {
            handler: self.handler,
            missing: self.missing,
        }
    }
}

/// Two comma separated values, such as `"name, address"` or
/// `"username, password"`.
///
/// Deserializes from either a two element sequence or a comma separated
/// string; whitespace around each part is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair(pub String, pub String);

impl Pair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(first.into(), second.into())
    }
}

impl FromStr for Pair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((first, second)) => Ok(Pair::new(first.trim(), second.trim())),
            None => Err(format!("expected two comma separated values, got {s:?}")),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

/// Settings for the `simulert` binary.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// The logging level (or `tracing` filter directive) for the binary.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings by layering defaults, the optional TOML file,
    /// environment variables (e.g. `SIMULERT_LOG_LEVEL=debug`) and finally
    /// `overrides`, usually the parsed command line.
    pub fn load(config_path: Option<&Path>, overrides: impl Provider) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let settings = figment
            .merge(Env::prefixed(ENV_PREFIX).only(&["log_level"]))
            .merge(overrides)
            .extract()?;
        Ok(settings)
    }
}
