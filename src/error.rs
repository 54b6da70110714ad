//! Crate-wide error types.
//!
//! Each subsystem owns a specific error enum (built with `thiserror`);
//! [`Error`] aggregates them for callers that just want to propagate.
//! The binary uses `anyhow` on top of this.
//!
//! # Design
//!
//! - [`Error`]: top-level error enum
//! - Subsystem errors ([`ResolveError`], [`SessionError`], [`SourceError`], ...)
//!   for detailed handling
//! - Nothing in the orchestrator core returns an error for a failed track;
//!   those are delivered through the track's `on_error` callback instead.
//!
//! # Example
//!
//! ```ignore
//! use voice_jukebox::error::{Result, ResultExt};
//!
//! async fn play(registry: &SessionRegistry, group: GroupId, track: Track) -> Result<()> {
//!     let session = registry.get(group).ok_or(SessionError::NotActive)?;
//!     session.enqueue(track).with_context("while enqueueing")?;
//!     Ok(())
//! }
//! ```

pub use crate::config::ConfigError;
pub use crate::session::SessionError;
pub use crate::source::SourceError;
pub use crate::track::{ResolveError, TrackError};
pub use crate::transport::WaitError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session is gone or not usable
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A track could not be turned into audio
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// A media reference could not be classified or looked up
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A transport state wait failed
    #[error("Transport error: {0}")]
    Transport(#[from] WaitError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}
