//! Audio output contract.
//!
//! The real output (Opus framing, jitter buffering, pushing packets to the
//! transport) lives outside this crate. It must behave as a small state
//! machine and announce every transition on its event stream.

use tokio::sync::broadcast;

use super::state::{AudioResource, PlayerEvent, PlayerState, PlayerStatus};

pub trait AudioOutput: Send + Sync {
    /// Current state.
    fn state(&self) -> PlayerState;

    fn status(&self) -> PlayerStatus {
        self.state().status
    }

    /// Start playing `resource`, replacing whatever was loaded.
    fn play(&self, resource: AudioResource);

    /// Returns false if there was nothing to pause.
    fn pause(&self) -> bool;

    /// Returns false if nothing was paused.
    fn unpause(&self) -> bool;

    /// Stop and go Idle. `force` drops buffered audio immediately.
    /// Returns false if already Idle.
    fn stop(&self, force: bool) -> bool;

    /// Stream of state transitions and playback errors.
    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;
}
