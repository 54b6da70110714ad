//! Resolution through `yt-dlp` and `ffmpeg`.
//!
//! `yt-dlp` downloads whatever container the provider serves to stdout;
//! `ffmpeg` strips video and re-encodes to Opus in an Ogg container, which
//! the audio output can consume without probing:
//!
//! ```text
//! yt-dlp -o - -q <url>  ──stdout──►  ffmpeg -i pipe:0 -vn -acodec libopus -f ogg pipe:1  ──► AudioSource
//! ```
//!
//! Both tools must be on `PATH` or configured in `[resolver]`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::SourceError;
use crate::config::ResolverConfig;
use crate::track::{AudioSource, Playable, ResolveError, StreamFormat, TrackMetadata};

const FFMPEG_ARGS: &[&str] = &[
    "-loglevel",
    "8",
    "-hide_banner",
    "-i",
    "pipe:0",
    "-vn",
    "-acodec",
    "libopus",
    "-f",
    "ogg",
    "pipe:1",
];

/// Locations of the external tools.
#[derive(Debug, Clone)]
pub struct YtDlp {
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
}

impl YtDlp {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            ytdlp: config.ytdlp_path.clone(),
            ffmpeg: config.ffmpeg_path.clone(),
        }
    }

    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// `yt-dlp --version`, if it runs.
    pub async fn ytdlp_version(&self) -> Option<String> {
        tool_version(&self.ytdlp, "--version").await
    }

    /// First line of `ffmpeg -version`, if it runs.
    pub async fn ffmpeg_version(&self) -> Option<String> {
        tool_version(&self.ffmpeg, "-version").await
    }

    /// Look up display metadata (and playlist entries) without downloading.
    pub async fn metadata(&self, url: &str) -> Result<MediaInfo, SourceError> {
        let output = Command::new(&self.ytdlp)
            .args(["-J", "--flat-playlist", "--no-warnings", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SourceError::Tool {
                program: self.ytdlp.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Lookup {
                url: url.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        parse_media_info(&output.stdout)
    }
}

async fn tool_version(program: &Path, flag: &str) -> Option<String> {
    Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8_lossy(&o.stdout).lines().next().map(|l| l.trim().to_string()))
}

fn parse_media_info(json: &[u8]) -> Result<MediaInfo, SourceError> {
    Ok(serde_json::from_slice(json)?)
}

/// The subset of `yt-dlp -J` output we use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Canonical page URL (full extraction)
    pub webpage_url: Option<String>,
    /// Entry URL (flat playlist extraction)
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    /// Playlist entries; empty for single items
    #[serde(default)]
    pub entries: Vec<MediaInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl MediaInfo {
    /// Best-known thumbnail (yt-dlp lists thumbnails worst to best).
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail
            .as_deref()
            .or_else(|| self.thumbnails.last().map(|t| t.url.as_str()))
    }

    /// URL to hand back to yt-dlp for this entry.
    pub fn entry_url(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone().filter(|u| u.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })
    }

    /// Track metadata for a playlist entry; `None` if it has no usable URL.
    pub fn to_track_metadata(&self) -> Option<TrackMetadata> {
        let mut metadata = TrackMetadata::new(self.entry_url()?);
        metadata.title = self.title.clone();
        metadata.thumbnail_url = self.thumbnail_url().map(str::to_string);
        Some(metadata)
    }
}

/// A track resolved through the yt-dlp pipeline.
pub struct YtDlpSource {
    tools: YtDlp,
    metadata: TrackMetadata,
}

impl YtDlpSource {
    pub fn new(tools: YtDlp, metadata: TrackMetadata) -> Self {
        Self { tools, metadata }
    }

    fn spawn(program: &Path, command: &mut Command) -> Result<Child, ResolveError> {
        command.kill_on_drop(true).spawn().map_err(|source| ResolveError::Spawn {
            program: program.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl Playable for YtDlpSource {
    fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    async fn resolve(&self) -> Result<AudioSource, ResolveError> {
        let url = self.metadata.url.as_str();
        tracing::debug!(target: "source", url, "Starting yt-dlp pipeline");

        let mut ytdlp = Self::spawn(
            &self.tools.ytdlp,
            Command::new(&self.tools.ytdlp)
                .args(["-o", "-", "-q", url])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null()),
        )?;
        let mut ffmpeg = Self::spawn(
            &self.tools.ffmpeg,
            Command::new(&self.tools.ffmpeg)
                .args(FFMPEG_ARGS)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null()),
        )?;

        let (Some(mut download), Some(mut encoder_in), Some(encoded)) =
            (ytdlp.stdout.take(), ffmpeg.stdin.take(), ffmpeg.stdout.take())
        else {
            return Err(ResolveError::Unavailable("pipeline stdio not captured".to_string()));
        };

        // Closing ffmpeg's stdin when the download ends lets it flush and exit
        let pump = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut download, &mut encoder_in).await;
            drop(encoder_in);
            copied
        });

        let mut reader = BufReader::new(encoded);
        let produced = !reader.fill_buf().await?.is_empty();
        if !produced {
            pump.abort();
            let status = ffmpeg.wait().await?;
            let download_status = ytdlp.wait().await?;
            tracing::warn!(target: "source", url, %status, %download_status, "Pipeline produced no audio");
            if !download_status.success() {
                return Err(ResolveError::Process {
                    program: self.tools.ytdlp.display().to_string(),
                    status: download_status.to_string(),
                });
            }
            if !status.success() {
                return Err(ResolveError::Process {
                    program: self.tools.ffmpeg.display().to_string(),
                    status: status.to_string(),
                });
            }
            return Err(ResolveError::NoAudio);
        }

        Ok(AudioSource::new(
            PipelineStream {
                reader,
                _children: vec![ytdlp, ffmpeg],
                pump,
            },
            StreamFormat::OggOpus,
        ))
    }
}

/// Encoded audio plus the processes producing it; dropping it kills them.
struct PipelineStream {
    reader: BufReader<ChildStdout>,
    _children: Vec<Child>,
    pump: JoinHandle<std::io::Result<u64>>,
}

impl AsyncRead for PipelineStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl Drop for PipelineStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
