//! The main application logic, decoupled from the entry point.

use crate::{
    cli::{Cli, Command},
    registry::AlerterRegistry,
    runner::ScriptRunner,
};
use anyhow::Result;
use clap::CommandFactory;
use tracing::{error, info};

/// Printed when no handler flag is given.
pub const NO_HANDLER_MESSAGE: &str =
    "Try 'simulert --help' for help.\n\nError: Please specify at least one handler.";

/// Runs the command described by `cli` and returns the process exit code.
///
/// Handlers are attached to the registry's unnamed alerter, so alerts carry
/// no name prefix. Handler configuration errors are returned as `Err`.
pub fn run(cli: &Cli, registry: &AlerterRegistry) -> Result<i32> {
    if !cli.any_handler_selected() {
        // Long-standing behavior: a missing handler is reported but exits 0.
        println!("{NO_HANDLER_MESSAGE}");
        return Ok(0);
    }

    let handlers = cli.build_handlers()?;
    let alerter = registry.get_alerter("");
    for handler in &handlers {
        alerter.add_handler(handler.clone());
    }

    match &cli.command {
        Some(Command::Run { name, script, args }) => {
            let runner = ScriptRunner::new(script, args.iter().cloned());
            let mut scope = alerter.simulation_alert();
            if let Some(name) = name {
                scope = scope.named(name);
            }
            match scope.run(|| runner.run()) {
                Ok(()) => Ok(0),
                Err(e) => {
                    error!(error = %e, "Simulation did not complete");
                    Ok(e.exit_code())
                }
            }
        }
        Some(Command::Test) => {
            let mut failures = 0;
            for handler in &handlers {
                match handler.send_test_message() {
                    Ok(()) => info!(
                        handler = handler.kind(),
                        destination = %handler.destination(),
                        "Test message sent"
                    ),
                    Err(e) => {
                        failures += 1;
                        error!(
                            handler = handler.kind(),
                            destination = %handler.destination(),
                            error = %e,
                            "Test message failed"
                        );
                    }
                }
            }
            Ok(if failures == 0 { 0 } else { 1 })
        }
        None => {
            Cli::command().print_help()?;
            Ok(0)
        }
    }
}
