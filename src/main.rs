//! # Application Entry Point
//!
//! Parses the CLI, initializes logging, and drives the polishing pipeline.
//! All fatal errors surface here and terminate with a non-zero exit code.

use tracing::error;
use tracing_subscriber::EnvFilter;

use grayling::config::Config;
use grayling::pipelines::PolishPipeline;

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("grayling={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    use clap::Parser;

    let mut config = Config::parse();
    init_tracing(config.verbose);

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(1);
    }
    if let Err(e) = PolishPipeline::new(config).run() {
        error!("{e}");
        std::process::exit(1);
    }
}
