//! Direct HTTP audio files.

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::AsyncWriteExt;

use crate::track::{AudioSource, Playable, ResolveError, StreamFormat, TrackMetadata};

/// Buffer between the HTTP body and the audio output.
const PIPE_CAPACITY: usize = 256 * 1024;

/// A track streamed straight from an http(s) URL.
pub struct HttpSource {
    client: reqwest::Client,
    metadata: TrackMetadata,
}

impl HttpSource {
    pub fn new(client: reqwest::Client, metadata: TrackMetadata) -> Self {
        Self { client, metadata }
    }

    /// Metadata derived from the URL alone: the file name is the title.
    pub fn metadata_for(url: &Url) -> TrackMetadata {
        let metadata = TrackMetadata::new(url.as_str());
        match url.path_segments().and_then(|mut s| s.next_back()).filter(|s| !s.is_empty()) {
            Some(file_name) => metadata.with_title(file_name),
            None => metadata,
        }
    }
}

/// Guess the container from the content type, falling back to the extension.
fn stream_format(content_type: Option<&str>, url: &str) -> StreamFormat {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()) {
        Some("audio/ogg" | "audio/opus") if path.ends_with(".opus") || path.ends_with(".ogg") => StreamFormat::OggOpus,
        Some("audio/webm") => StreamFormat::WebmOpus,
        _ if path.ends_with(".opus") => StreamFormat::OggOpus,
        _ if path.ends_with(".webm") => StreamFormat::WebmOpus,
        _ => StreamFormat::Arbitrary,
    }
}

#[async_trait]
impl Playable for HttpSource {
    fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    async fn resolve(&self) -> Result<AudioSource, ResolveError> {
        let url = self.metadata.url.as_str();
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::Unavailable(format!("{url} not found")));
        }
        if !status.is_success() {
            return Err(ResolveError::Http(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let format = stream_format(content_type.as_deref(), url);

        let Some(first) = response.chunk().await? else {
            return Err(ResolveError::NoAudio);
        };
        tracing::debug!(target: "source", url, ?format, "HTTP stream opened");

        let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let url = url.to_string();
        tokio::spawn(async move {
            if writer.write_all(&first).await.is_err() {
                return;
            }
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        // Reader dropped: playback was stopped
                        if writer.write_all(&chunk).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(target: "source", %url, error = %e, "HTTP stream interrupted");
                        break;
                    }
                }
            }
            let _ = writer.shutdown().await;
        });

        Ok(AudioSource::new(reader, format))
    }
}
