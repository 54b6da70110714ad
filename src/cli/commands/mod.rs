//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `tools`: external tool checks
//! - `probe`: URL classification and metadata lookup
//! - `fetch`: resolve one track to a file
//! - `config`: effective configuration

mod config;
mod fetch;
mod probe;
mod tools;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use config::cmd_config;
pub use fetch::cmd_fetch;
pub use probe::cmd_probe;
pub use tools::cmd_check_tools;

/// Voice Jukebox CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true, env = "VOICE_JUKEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that yt-dlp and ffmpeg are runnable
    CheckTools,
    /// Show what a URL would enqueue
    Probe {
        /// Media URL
        url: String,
    },
    /// Resolve a URL's first track and write the audio stream to a file
    Fetch {
        /// Media URL
        url: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },
}

/// Load the configuration the command line points at.
fn load_config(cli: &Cli) -> anyhow::Result<crate::config::Config> {
    match &cli.config {
        Some(path) => Ok(crate::config::load_from(path)?),
        None => Ok(crate::config::load()),
    }
}

/// Run the parsed command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = load_config(cli)?;

    match &cli.command {
        Commands::CheckTools => cmd_check_tools(&rt, &config),
        Commands::Probe { url } => cmd_probe(&rt, &config, url),
        Commands::Fetch { url, output } => cmd_fetch(&rt, &config, url, output),
        Commands::Config { path } => cmd_config(&config, cli.config.as_deref(), *path),
    }
}

pub(crate) fn print_tool_install_instructions() {
    eprintln!("Install the media tools:");
    eprintln!("  yt-dlp:  pip install yt-dlp   (or your package manager)");
    eprintln!("  ffmpeg:  apt install ffmpeg / brew install ffmpeg / winget install ffmpeg");
    eprintln!("Or point [resolver] ytdlp_path / ffmpeg_path at them in the config file.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from(["voice-jukebox", "fetch", "https://youtu.be/x", "-o", "out.ogg"]).unwrap();
        match cli.command {
            Commands::Fetch { url, output } => {
                assert_eq!(url, "https://youtu.be/x");
                assert_eq!(output, PathBuf::from("out.ogg"));
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["voice-jukebox", "config", "--path", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Config { path: true }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["voice-jukebox"]).is_err());
    }
}
