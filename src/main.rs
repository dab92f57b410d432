//! simulert - alert yourself when a simulation completes or fails.

use clap::Parser;
use simulert::{app, cli::Cli, config::Settings, registry};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Load settings by layering sources: defaults, file, environment, and CLI args.
    let settings = Settings::load(cli.config.as_deref(), &cli).unwrap_or_else(|err| {
        init_logging("info");
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    init_logging(&settings.log_level);

    match app::run(&cli, registry::global()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
