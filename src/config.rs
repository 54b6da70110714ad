//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\voice-jukebox\config.toml
//! - macOS: ~/Library/Application Support/voice-jukebox/config.toml
//! - Linux: ~/.config/voice-jukebox/config.toml
//!
//! Every field has a default, so a partial file (or none at all) is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Voice transport supervision
    pub transport: TransportConfig,

    /// Playback engine settings
    pub playback: PlaybackConfig,

    /// Queue advancement settings
    pub queue: QueueConfig,

    /// Per-track settings
    pub track: TrackConfig,

    /// External resolver tools
    pub resolver: ResolverConfig,
}

/// Reconnection and readiness policy for the voice transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long to wait for `Connecting` after an ambiguous close
    pub channel_move_grace_secs: u64,

    /// Rejoin attempts before the connection is destroyed
    pub max_rejoin_attempts: u32,

    /// Linear backoff step; attempt `n` waits `(n + 1) * step`
    pub rejoin_backoff_step_secs: u64,

    /// Deadline for Signalling/Connecting to reach Ready
    pub ready_timeout_secs: u64,

    /// Close code shared by "moved channel" and "kicked"
    pub ambiguous_close_code: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_move_grace_secs: 5,
            max_rejoin_attempts: 5,
            rejoin_backoff_step_secs: 5,
            ready_timeout_secs: 20,
            ambiguous_close_code: 4014,
        }
    }
}

impl TransportConfig {
    pub fn channel_move_grace(&self) -> Duration {
        Duration::from_secs(self.channel_move_grace_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Delay before the rejoin that follows `attempts` earlier rejoins.
    pub fn rejoin_backoff(&self, attempts: u32) -> Duration {
        Duration::from_secs(self.rejoin_backoff_step_secs * (u64::from(attempts) + 1))
    }
}

/// Playback engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Destroy the connection after this long with nothing playing
    pub idle_teardown_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            idle_teardown_secs: 10 * 60,
        }
    }
}

impl PlaybackConfig {
    pub fn idle_teardown(&self) -> Duration {
        Duration::from_secs(self.idle_teardown_secs)
    }
}

/// Queue advancement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Stop advancing after this many unresolvable tracks in a row.
    /// `None` drains the whole queue; `Some(0)` behaves like `Some(1)`.
    pub max_consecutive_failures: Option<u32>,

    /// Default number of upcoming tracks in a queue snapshot
    pub snapshot_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: None,
            snapshot_limit: 5,
        }
    }
}

/// Per-track settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Resolution retries before a track is abandoned
    pub retry_budget: u32,

    /// Pause between resolution retries
    pub retry_delay_ms: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            retry_budget: crate::track::DEFAULT_RETRY_BUDGET,
            retry_delay_ms: 1000,
        }
    }
}

impl TrackConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// External resolver tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// yt-dlp executable (name on PATH or absolute path)
    pub ytdlp_path: PathBuf,

    /// ffmpeg executable (name on PATH or absolute path)
    pub ffmpeg_path: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("voice-jukebox"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to an explicit path
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[transport]"));
        assert!(toml.contains("[playback]"));
        assert!(toml.contains("[queue]"));
        assert!(toml.contains("[track]"));
        assert!(toml.contains("[resolver]"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[transport]
max_rejoin_attempts = 2

[queue]
max_consecutive_failures = 4
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.transport.max_rejoin_attempts, 2);
        assert_eq!(config.queue.max_consecutive_failures, Some(4));

        // Other fields use defaults
        assert_eq!(config.transport.ready_timeout_secs, 20);
        assert_eq!(config.transport.ambiguous_close_code, 4014);
        assert_eq!(config.playback.idle_teardown_secs, 600);
        assert_eq!(config.track.retry_budget, 3);
        assert_eq!(config.queue.snapshot_limit, 5);
    }

    #[test]
    fn test_rejoin_backoff_is_linear() {
        let transport = TransportConfig::default();
        let delays: Vec<u64> = (0..5).map(|n| transport.rejoin_backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 15, 20, 25]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.playback.idle_teardown_secs = 30;
        config.resolver.ytdlp_path = PathBuf::from("/opt/bin/yt-dlp");

        save_to(&config, &path).unwrap();
        let loaded = load_from(&path).unwrap();

        assert_eq!(loaded.playback.idle_teardown_secs, 30);
        assert_eq!(loaded.resolver.ytdlp_path, PathBuf::from("/opt/bin/yt-dlp"));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[transport\nbroken").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }
}
