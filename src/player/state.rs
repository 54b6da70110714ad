//! Player state and event types.

use std::sync::Arc;

use crate::track::{AudioSource, Track};

/// Status of the audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Output state: status plus the track whose resource is loaded.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub status: PlayerStatus,
    /// `None` exactly when Idle
    pub track: Option<Arc<Track>>,
}

impl PlayerState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn playing(track: Arc<Track>) -> Self {
        Self {
            status: PlayerStatus::Playing,
            track: Some(track),
        }
    }

    pub fn paused(track: Arc<Track>) -> Self {
        Self {
            status: PlayerStatus::Paused,
            track: Some(track),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == PlayerStatus::Idle
    }
}

/// A resolved stream handed to the output, tagged with its track.
#[derive(Debug)]
pub struct AudioResource {
    pub source: AudioSource,
    pub track: Arc<Track>,
}

impl AudioResource {
    pub fn new(source: AudioSource, track: Arc<Track>) -> Self {
        Self { source, track }
    }
}

/// Events emitted by the audio output.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChanged { from: PlayerState, to: PlayerState },
    /// The stream failed while playing; an Idle transition usually follows
    Error { track: Arc<Track>, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::track;

    #[test]
    fn test_default_state_is_idle() {
        let state = PlayerState::default();
        assert!(state.is_idle());
        assert!(state.track.is_none());
    }

    #[test]
    fn test_playing_state_carries_track() {
        let t = track("a");
        let state = PlayerState::playing(Arc::clone(&t));
        assert_eq!(state.status, PlayerStatus::Playing);
        assert!(!state.is_idle());
        assert_eq!(state.track.unwrap().url(), t.url());
    }
}
