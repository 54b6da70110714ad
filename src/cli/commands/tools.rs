//! External tool checks.

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::source::YtDlp;

use super::print_tool_install_instructions;

/// Check that yt-dlp and ffmpeg are runnable
pub fn cmd_check_tools(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    let tools = YtDlp::new(&config.resolver);
    println!("Checking media tools...\n");

    let (ytdlp, ffmpeg) = rt.block_on(async { tokio::join!(tools.ytdlp_version(), tools.ffmpeg_version()) });

    let mut missing = false;
    match ytdlp {
        Some(version) => println!("✓ yt-dlp: {}", version),
        None => {
            println!("✗ yt-dlp: NOT FOUND ({})", tools.ytdlp_path().display());
            missing = true;
        }
    }
    match ffmpeg {
        Some(version) => println!("✓ ffmpeg: {}", version),
        None => {
            println!("✗ ffmpeg: NOT FOUND ({})", tools.ffmpeg_path().display());
            missing = true;
        }
    }

    if missing {
        println!();
        print_tool_install_instructions();
        anyhow::bail!("required tools are missing");
    }
    Ok(())
}
