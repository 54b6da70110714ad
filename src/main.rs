//! voice-jukebox command-line entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use voice_jukebox::cli;

/// Used when `RUST_LOG` is unset. Library events use short targets.
const DEFAULT_LOG_FILTER: &str = "voice_jukebox=info,session=info,transport=info,player=info,source=info";

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging (stderr, so command output stays clean)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    cli::run_command(&args)
}
