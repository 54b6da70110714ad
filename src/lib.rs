//! Voice Jukebox - per-session audio playback orchestration.
//!
//! Sits between a real-time voice transport and a set of media resolvers:
//! callers enqueue [`track::Track`]s on a [`session::Session`], which
//! resolves them lazily, plays them in order, and keeps the connection
//! alive (or gives it up) as transport conditions change.

pub mod cli;
pub mod config;
pub mod error;
pub mod player;
pub mod session;
pub mod single_flight;
pub mod source;
pub mod track;
pub mod transport;

#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use session::{GroupId, QueueSnapshot, Session, SessionError, SessionHooks, SessionRegistry};
pub use track::{Playable, Track, TrackCallbacks, TrackMetadata};
