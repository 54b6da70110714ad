//! Media sources: turning a user-supplied URL into queueable tracks.
//!
//! [`classify`] decides which provider handles a URL; [`TrackFactory`]
//! looks up display metadata and builds one [`Track`] per playable item
//! (a playlist expands to all of its entries). Actual audio is only fetched
//! when the session resolves a track at the head of its queue.
//!
//! | source | metadata | audio |
//! |---|---|---|
//! | YouTube video / playlist, SoundCloud, Niconico | `yt-dlp -J` | `yt-dlp` piped through `ffmpeg` |
//! | direct audio file | URL only | HTTP GET |

mod http;
mod ytdlp;

pub use http::HttpSource;
pub use ytdlp::{MediaInfo, Thumbnail, YtDlp, YtDlpSource};

use reqwest::Url;
use std::fmt;

use crate::config::Config;
use crate::track::{Track, TrackCallbacks, TrackMetadata};

/// Which provider handles a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    YouTubePlaylist,
    YouTube,
    SoundCloud,
    Niconico,
    /// An http(s) URL pointing straight at an audio file
    DirectAudio,
}

impl MediaSource {
    /// Provider name for display.
    pub fn label(&self) -> &'static str {
        match self {
            MediaSource::YouTubePlaylist => "YouTube Playlist",
            MediaSource::YouTube => "YouTube",
            MediaSource::SoundCloud => "SoundCloud",
            MediaSource::Niconico => "Niconico",
            MediaSource::DirectAudio => "Direct audio",
        }
    }

    /// Whether audio comes through the yt-dlp pipeline.
    pub fn uses_ytdlp(&self) -> bool {
        !matches!(self, MediaSource::DirectAudio)
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors from classifying a URL or looking up its metadata.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL: {0}")]
    Unsupported(String),

    #[error("failed to run {program}: {source}")]
    Tool {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata lookup failed for {url}: {message}")]
    Lookup { url: String, message: String },

    #[error("failed to parse metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("playlist has no playable entries: {0}")]
    EmptyPlaylist(String),
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

const NICONICO_HOSTS: &[&str] = &["www.nicovideo.jp", "nicovideo.jp", "nico.ms"];

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "oga", "opus", "m4a", "aac", "flac", "wav", "webm"];

/// Decide which provider handles `input`.
///
/// Playlists are checked before single videos: a watch URL carrying a
/// `list` parameter enqueues the whole list.
pub fn classify(input: &str) -> Result<(MediaSource, Url), SourceError> {
    let url = Url::parse(input.trim()).map_err(|e| SourceError::InvalidUrl(format!("{input}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::InvalidUrl(format!("{input}: not an http(s) URL")));
    }
    let host = url
        .host_str()
        .ok_or_else(|| SourceError::InvalidUrl(format!("{input}: missing host")))?
        .to_ascii_lowercase();

    let source = if YOUTUBE_HOSTS.contains(&host.as_str()) {
        let has_list = url.query_pairs().any(|(k, v)| k == "list" && !v.is_empty());
        if has_list || url.path().starts_with("/playlist") {
            MediaSource::YouTubePlaylist
        } else {
            MediaSource::YouTube
        }
    } else if host == "soundcloud.com" || host == "m.soundcloud.com" {
        MediaSource::SoundCloud
    } else if NICONICO_HOSTS.contains(&host.as_str()) {
        MediaSource::Niconico
    } else if has_audio_extension(&url) {
        MediaSource::DirectAudio
    } else {
        return Err(SourceError::Unsupported(input.to_string()));
    };

    Ok((source, url))
}

fn has_audio_extension(url: &Url) -> bool {
    url.path()
        .rsplit_once('.')
        .is_some_and(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Everything a caller needs to enqueue a URL and announce it.
#[derive(Debug)]
pub struct EnqueueRequest {
    pub source: MediaSource,
    /// The URL as the user gave it
    pub url: String,
    /// Representative title (the playlist's, or the single track's)
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tracks: Vec<Track>,
}

/// Builds tracks from URLs using the configured tools.
#[derive(Clone)]
pub struct TrackFactory {
    ytdlp: YtDlp,
    http: reqwest::Client,
    retry_budget: u32,
}

impl TrackFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            ytdlp: YtDlp::new(&config.resolver),
            http: reqwest::Client::new(),
            retry_budget: config.track.retry_budget,
        }
    }

    pub fn ytdlp(&self) -> &YtDlp {
        &self.ytdlp
    }

    /// Classify `input`, look up its metadata, and build its tracks.
    ///
    /// Every track gets its own fire-once wrapper around `callbacks`.
    pub async fn tracks_from_url(&self, input: &str, callbacks: TrackCallbacks) -> Result<EnqueueRequest, SourceError> {
        let (source, url) = classify(input)?;
        tracing::info!(target: "source", %url, %source, "Building tracks");

        let request = match source {
            MediaSource::DirectAudio => {
                let metadata = HttpSource::metadata_for(&url);
                let title = metadata.title.clone();
                let track = self.track(HttpSource::new(self.http.clone(), metadata), &callbacks);
                EnqueueRequest {
                    source,
                    url: input.to_string(),
                    title,
                    thumbnail_url: None,
                    tracks: vec![track],
                }
            }
            MediaSource::YouTubePlaylist => {
                let info = self.ytdlp.metadata(url.as_str()).await?;
                let tracks: Vec<Track> = info
                    .entries
                    .iter()
                    .filter_map(MediaInfo::to_track_metadata)
                    .map(|metadata| self.track(YtDlpSource::new(self.ytdlp.clone(), metadata), &callbacks))
                    .collect();
                if tracks.is_empty() {
                    return Err(SourceError::EmptyPlaylist(input.to_string()));
                }
                EnqueueRequest {
                    source,
                    url: input.to_string(),
                    title: info.title.clone(),
                    thumbnail_url: info.thumbnail_url().map(str::to_string),
                    tracks,
                }
            }
            MediaSource::YouTube | MediaSource::SoundCloud | MediaSource::Niconico => {
                let info = self.ytdlp.metadata(url.as_str()).await?;
                let mut metadata = TrackMetadata::new(url.as_str());
                metadata.title = info.title.clone();
                metadata.thumbnail_url = info.thumbnail_url().map(str::to_string);
                let (title, thumbnail_url) = (metadata.title.clone(), metadata.thumbnail_url.clone());
                EnqueueRequest {
                    source,
                    url: input.to_string(),
                    title,
                    thumbnail_url,
                    tracks: vec![self.track(YtDlpSource::new(self.ytdlp.clone(), metadata), &callbacks)],
                }
            }
        };

        tracing::debug!(target: "source", count = request.tracks.len(), "Tracks ready");
        Ok(request)
    }

    fn track(&self, source: impl crate::track::Playable + 'static, callbacks: &TrackCallbacks) -> Track {
        Track::new(source, callbacks.clone()).with_retry_budget(self.retry_budget)
    }
}
