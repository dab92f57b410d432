//! Launches the target script monitored by the `simulert run` command.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Why a monitored script did not finish successfully.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to launch {}: {source}", .script.display())]
    Launch {
        script: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `code` is `None` when the script was terminated by a signal.
    #[error("{} exited with status {code:?}", .script.display())]
    Failed { script: PathBuf, code: Option<i32> },
}

impl ScriptError {
    /// The exit code `simulert` should finish with.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScriptError::Failed {
                code: Some(code), ..
            } => *code,
            _ => 1,
        }
    }
}

/// An executable and its arguments, run to completion in the foreground.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script: PathBuf,
    args: Vec<OsString>,
}

impl ScriptRunner {
    /// Relative script paths are resolved against the working directory
    /// rather than looked up on `PATH`.
    pub fn new(script: impl AsRef<Path>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        let script = script.as_ref();
        let script = if script.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(script))
                .unwrap_or_else(|_| script.to_path_buf())
        } else {
            script.to_path_buf()
        };
        Self {
            script,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Runs the script, inheriting stdio, and waits for it to exit.
    pub fn run(&self) -> Result<(), ScriptError> {
        info!(script = %self.script.display(), "Launching script");
        let status = Command::new(&self.script)
            .args(&self.args)
            .status()
            .map_err(|source| ScriptError::Launch {
                script: self.script.clone(),
                source,
            })?;

        debug!(script = %self.script.display(), %status, "Script exited");
        if status.success() {
            Ok(())
        } else {
            Err(ScriptError::Failed {
                script: self.script.clone(),
                code: status.code(),
            })
        }
    }
}
