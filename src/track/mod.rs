//! Tracks: lazily-resolved units of playable media.
//!
//! A [`Track`] pairs a [`Playable`] source (which knows how to turn a media
//! reference into audio) with the caller's lifecycle callbacks and a small
//! retry budget. Nothing is fetched until the track reaches the head of the
//! queue; resolving earlier would open streams that may never be played.

mod callbacks;

pub use callbacks::{LifecycleHooks, TrackCallbacks};

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::AsyncRead;

/// Resolution retries a fresh track gets.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Display metadata for a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// The media reference; identity of the track
    pub url: String,
    /// Display title, if the provider knows one
    pub title: Option<String>,
    /// Thumbnail image reference
    pub thumbnail_url: Option<String>,
}

impl TrackMetadata {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            thumbnail_url: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    /// Title for display, falling back to the URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Container/codec of a resolved stream, as a hint for the audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    OggOpus,
    WebmOpus,
    /// Anything else; the output must probe or transcode
    Arbitrary,
}

/// A resolved, streamable audio resource.
pub struct AudioSource {
    stream: Pin<Box<dyn AsyncRead + Send>>,
    format: StreamFormat,
}

impl AudioSource {
    pub fn new(stream: impl AsyncRead + Send + 'static, format: StreamFormat) -> Self {
        Self {
            stream: Box::pin(stream),
            format,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn into_stream(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.stream
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Capability implemented by every media provider.
///
/// The orchestrator only ever talks to tracks through this trait.
#[async_trait]
pub trait Playable: Send + Sync {
    /// Display metadata, known before resolution.
    fn metadata(&self) -> &TrackMetadata;

    /// Produce a playable stream. May take arbitrarily long (network I/O).
    async fn resolve(&self) -> Result<AudioSource, ResolveError>;
}

/// Why a track could not be turned into audio.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Process { program: String, status: String },

    #[error("source produced no audio")]
    NoAudio,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("media unavailable: {0}")]
    Unavailable(String),

    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// What a track's `on_error` callback receives.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("could not load track: {0}")]
    Resolve(#[from] ResolveError),

    #[error("playback failed: {0}")]
    Playback(String),
}

/// A queued unit of media.
pub struct Track {
    source: Box<dyn Playable>,
    hooks: LifecycleHooks,
    retries_left: AtomicU32,
}

impl Track {
    pub fn new(source: impl Playable + 'static, callbacks: TrackCallbacks) -> Self {
        Self {
            source: Box::new(source),
            hooks: LifecycleHooks::new(callbacks),
            retries_left: AtomicU32::new(DEFAULT_RETRY_BUDGET),
        }
    }

    pub fn with_retry_budget(self, retries: u32) -> Self {
        self.retries_left.store(retries, Ordering::SeqCst);
        self
    }

    pub fn metadata(&self) -> &TrackMetadata {
        self.source.metadata()
    }

    pub fn url(&self) -> &str {
        &self.metadata().url
    }

    pub fn display_title(&self) -> &str {
        self.metadata().display_title()
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left.load(Ordering::SeqCst)
    }

    /// Spend one retry. Returns the retries remaining afterwards, or `None`
    /// when the budget was already empty.
    pub fn take_retry(&self) -> Option<u32> {
        self.retries_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    pub async fn resolve(&self) -> Result<AudioSource, ResolveError> {
        self.source.resolve().await
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("metadata", self.metadata())
            .field("retries_left", &self.retries_left())
            .finish_non_exhaustive()
    }
}
