//! Command-line interface for voice-jukebox.
//!
//! The orchestrator itself is a library; these commands exercise the media
//! resolution side from a terminal without a voice connection.

mod commands;

pub use commands::{Cli, Commands, run_command};
