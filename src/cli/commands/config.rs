//! Configuration display.

use std::path::Path;

use crate::config::{self, Config};

/// Print the effective configuration, or just its location
pub fn cmd_config(config: &Config, explicit: Option<&Path>, path_only: bool) -> anyhow::Result<()> {
    let location = explicit.map(Path::to_path_buf).or_else(config::config_path);

    if path_only {
        match location {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("could not determine the config directory"),
        }
        return Ok(());
    }

    if let Some(path) = &location {
        let state = if path.exists() { "" } else { " (not present, showing defaults)" };
        println!("# {}{}", path.display(), state);
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
