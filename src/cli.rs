//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the `simulert` binary
//! using the `clap` crate. Handler options given here take precedence over
//! the `SIMULERT_*` environment variables, and `--log-level` is merged into
//! the application [`Settings`](crate::config::Settings) as a figment
//! provider.

use crate::config::Pair;
use crate::error::ConfigError;
use crate::handlers::{Emailer, Pushover, SharedHandler, Slacker};
use clap::{Args, Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

/// Alert yourself when a long-running simulation completes or fails.
#[derive(Parser, Debug, Default)]
#[command(name = "simulert", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive (e.g. "debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Attach the email handler.
    #[arg(short, long)]
    pub email: bool,

    /// Attach the Slack handler.
    #[arg(short, long)]
    pub slack: bool,

    /// Attach the Pushover handler.
    #[arg(short, long)]
    pub pushover: bool,

    #[command(flatten)]
    pub email_args: EmailArgs,

    #[command(flatten)]
    pub slack_args: SlackArgs,

    #[command(flatten)]
    pub pushover_args: PushoverArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run SCRIPT and alert when it completes or fails.
    Run {
        /// Simulation name used in the alerts.
        #[arg(short, long)]
        name: Option<String>,

        /// The executable to run.
        script: PathBuf,

        /// Arguments passed through to SCRIPT.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Send a test message through each selected handler.
    Test,
}

#[derive(Args, Debug, Default, Clone)]
pub struct EmailArgs {
    /// The host address of the email server to send from.
    #[arg(long, value_name = "HOST")]
    pub email_host: Option<String>,

    /// The connection port of the email server to send from.
    #[arg(long, value_name = "PORT")]
    pub email_port: Option<u16>,

    /// Comma-separated username and password for the email server.
    #[arg(long, value_name = "USER,PASSWORD")]
    pub email_authentication: Option<Pair>,

    /// Comma-separated sender name and email address.
    #[arg(long, value_name = "NAME,ADDRESS")]
    pub email_sender: Option<Pair>,

    /// Comma-separated recipient name and email address.
    #[arg(long, value_name = "NAME,ADDRESS")]
    pub email_recipient: Option<Pair>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct SlackArgs {
    /// The token of the Slack bot messages are sent from.
    #[arg(long, value_name = "TOKEN")]
    pub slack_token: Option<String>,

    /// The Slack user messages are sent to.
    #[arg(long, value_name = "USER")]
    pub slack_username: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct PushoverArgs {
    /// The Pushover application token messages are sent from.
    #[arg(long, value_name = "TOKEN")]
    pub pushover_token: Option<String>,

    /// The Pushover user key messages are sent to.
    #[arg(long, value_name = "USER")]
    pub pushover_username: Option<String>,
}

impl Cli {
    /// Whether any handler flag was given.
    pub fn any_handler_selected(&self) -> bool {
        self.email || self.slack || self.pushover
    }

    /// Builds the selected handlers, in the order Slack, email, Pushover.
    pub fn build_handlers(&self) -> Result<Vec<SharedHandler>, ConfigError> {
        let mut handlers: Vec<SharedHandler> = Vec::new();

        if self.slack {
            let mut builder = Slacker::builder();
            if let Some(token) = &self.slack_args.slack_token {
                builder = builder.token(token);
            }
            if let Some(username) = &self.slack_args.slack_username {
                builder = builder.username(username);
            }
            handlers.push(Arc::new(builder.build()?));
        }

        if self.email {
            let args = &self.email_args;
            let mut builder = Emailer::builder();
            if let Some(host) = &args.email_host {
                builder = builder.host(host);
            }
            if let Some(port) = args.email_port {
                builder = builder.port(port);
            }
            if let Some(Pair(user, password)) = &args.email_authentication {
                builder = builder.authentication(user, password);
            }
            if let Some(Pair(name, address)) = &args.email_sender {
                builder = builder.sender(name, address);
            }
            if let Some(Pair(name, address)) = &args.email_recipient {
                builder = builder.recipient(name, address);
            }
            handlers.push(Arc::new(builder.build()?));
        }

        if self.pushover {
            let mut builder = Pushover::builder();
            if let Some(token) = &self.pushover_args.pushover_token {
                builder = builder.token(token);
            }
            if let Some(username) = &self.pushover_args.pushover_username {
                builder = builder.username(username);
            }
            handlers.push(Arc::new(builder.build()?));
        }

        Ok(handlers)
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
