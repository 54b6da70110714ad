//! Playback engine adapter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Session (orchestrator)                       │
//! │        owns the PlayQueue, decides what plays next              │
//! └──────────────┬──────────────────────────────────▲───────────────┘
//!                │ play / pause / stop               │ EngineAction::Advance
//!                ▼                                   │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      PlaybackEngine                             │
//! │   lifecycle callbacks, idle-teardown timer, transition mapping  │
//! └──────────────┬──────────────────────────────────▲───────────────┘
//!                │ AudioOutput                       │ PlayerEvent
//!                ▼                                   │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 External audio output                           │
//! │               Idle / Playing / Paused                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod output;
mod queue;
mod state;

pub use output::AudioOutput;
pub use queue::PlayQueue;
pub use state::{AudioResource, PlayerEvent, PlayerState, PlayerStatus};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::track::{Track, TrackError};
use crate::transport::{VoiceTransport, destroy_if_alive};

/// What the session should do after an engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    None,
    /// A track just stopped; try to play the next one
    Advance,
}

/// Wraps the external audio output for one session.
pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    idle_teardown: Duration,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, idle_teardown: Duration) -> Self {
        Self {
            output,
            idle_teardown,
            idle_timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.output.state()
    }

    pub fn status(&self) -> PlayerStatus {
        self.output.status()
    }

    pub fn is_idle(&self) -> bool {
        self.status() == PlayerStatus::Idle
    }

    /// The track loaded in the output (playing or paused).
    pub fn current_track(&self) -> Option<Arc<Track>> {
        self.output.state().track
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.output.subscribe()
    }

    pub fn play(&self, resource: AudioResource) {
        tracing::info!(
            target: "player",
            title = resource.track.display_title(),
            format = ?resource.source.format(),
            "Starting playback"
        );
        self.output.play(resource);
    }

    pub fn pause(&self) -> bool {
        self.output.pause()
    }

    pub fn unpause(&self) -> bool {
        self.output.unpause()
    }

    /// Stop the output. The queue itself belongs to the session.
    pub fn stop(&self, force: bool) -> bool {
        self.output.stop(force)
    }

    /// Map one output event onto lifecycle callbacks and timers.
    pub fn handle_event(&self, event: PlayerEvent, transport: &Arc<dyn VoiceTransport>) -> EngineAction {
        match event {
            PlayerEvent::StateChanged { from, to } => {
                tracing::debug!(target: "player", from = ?from.status, to = ?to.status, "Audio player transitioned");

                if to.is_idle() && !from.is_idle() {
                    // A resource finished playing (or was stopped)
                    if let Some(track) = from.track {
                        track.hooks().finish();
                    }
                    self.arm_idle_timer(transport);
                    EngineAction::Advance
                } else {
                    if to.status == PlayerStatus::Playing {
                        self.cancel_idle_timer();
                        if let Some(track) = to.track {
                            track.hooks().start(track.display_title());
                        }
                    }
                    EngineAction::None
                }
            }
            PlayerEvent::Error { track, message } => {
                tracing::warn!(target: "player", title = track.display_title(), %message, "Playback error");
                track.hooks().error(&TrackError::Playback(message));
                EngineAction::None
            }
        }
    }

    /// (Re)start the countdown that destroys an idle connection.
    fn arm_idle_timer(&self, transport: &Arc<dyn VoiceTransport>) {
        let transport = Arc::clone(transport);
        let timeout = self.idle_teardown;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::info!(target: "player", ?timeout, "Idle for too long, leaving voice");
            destroy_if_alive(&*transport);
        });

        if let Some(previous) = self.idle_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    pub fn cancel_idle_timer(&self) {
        if let Some(timer) = self.idle_timer.lock().take() {
            timer.abort();
        }
    }

    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.cancel_idle_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CallbackLog, MockOutput, MockTransport, settle, track_with};
    use crate::track::StreamFormat;
    use crate::transport::ConnectionStatus;

    fn engine(output: &Arc<MockOutput>) -> PlaybackEngine {
        PlaybackEngine::new(output.clone(), Duration::from_secs(600))
    }

    fn resource(track: &Arc<Track>) -> AudioResource {
        AudioResource::new(
            crate::track::AudioSource::new(tokio::io::empty(), StreamFormat::OggOpus),
            Arc::clone(track),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_finish_callbacks() {
        let output = MockOutput::new();
        let transport: Arc<dyn VoiceTransport> = MockTransport::new(ConnectionStatus::Ready);
        let engine = engine(&output);
        let mut events = engine.subscribe();
        let log = CallbackLog::new();
        let a = track_with("a", &log);

        engine.play(resource(&a));
        let action = engine.handle_event(events.recv().await.unwrap(), &transport);
        assert_eq!(action, EngineAction::None);
        assert_eq!(log.entries(), vec!["start:A".to_string()]);

        output.finish();
        let action = engine.handle_event(events.recv().await.unwrap(), &transport);
        assert_eq!(action, EngineAction::Advance);
        assert_eq!(log.entries(), vec!["start:A".to_string(), "finish:A".to_string()]);
        assert!(engine.idle_timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_does_not_restart_track() {
        let output = MockOutput::new();
        let transport: Arc<dyn VoiceTransport> = MockTransport::new(ConnectionStatus::Ready);
        let engine = engine(&output);
        let mut events = engine.subscribe();
        let log = CallbackLog::new();
        let a = track_with("a", &log);

        engine.play(resource(&a));
        assert!(engine.pause());
        assert!(engine.unpause());
        for _ in 0..3 {
            let action = engine.handle_event(events.recv().await.unwrap(), &transport);
            assert_eq!(action, EngineAction::None);
        }
        assert_eq!(log.count("start"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_reports_without_advancing() {
        let output = MockOutput::new();
        let transport: Arc<dyn VoiceTransport> = MockTransport::new(ConnectionStatus::Ready);
        let engine = engine(&output);
        let mut events = engine.subscribe();
        let log = CallbackLog::new();
        let a = track_with("a", &log);

        engine.play(resource(&a));
        engine.handle_event(events.recv().await.unwrap(), &transport);

        output.fail("decoder exploded");
        let action = engine.handle_event(events.recv().await.unwrap(), &transport);
        assert_eq!(action, EngineAction::None);
        assert_eq!(log.count("error"), 1);
        assert!(log.entries().iter().any(|e| e.contains("decoder exploded")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_destroys_connection() {
        let output = MockOutput::new();
        let transport = MockTransport::new(ConnectionStatus::Ready);
        let dyn_transport: Arc<dyn VoiceTransport> = transport.clone();
        let engine = engine(&output);
        let mut events = engine.subscribe();
        let a = track_with("a", &CallbackLog::new());

        engine.play(resource(&a));
        engine.handle_event(events.recv().await.unwrap(), &dyn_transport);
        output.finish();
        engine.handle_event(events.recv().await.unwrap(), &dyn_transport);

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(transport.destroy_count(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(transport.status().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_cancels_idle_timer() {
        let output = MockOutput::new();
        let transport = MockTransport::new(ConnectionStatus::Ready);
        let dyn_transport: Arc<dyn VoiceTransport> = transport.clone();
        let engine = engine(&output);
        let mut events = engine.subscribe();
        let log = CallbackLog::new();

        engine.play(resource(&track_with("a", &log)));
        engine.handle_event(events.recv().await.unwrap(), &dyn_transport);
        output.finish();
        engine.handle_event(events.recv().await.unwrap(), &dyn_transport);
        assert!(engine.idle_timer_armed());

        tokio::time::sleep(Duration::from_secs(300)).await;
        engine.play(resource(&track_with("b", &log)));
        engine.handle_event(events.recv().await.unwrap(), &dyn_transport);
        assert!(!engine.idle_timer_armed());

        tokio::time::sleep(Duration::from_secs(900)).await;
        settle().await;
        assert_eq!(transport.destroy_count(), 0);
    }
}
