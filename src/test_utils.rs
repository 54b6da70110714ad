//! Test doubles for the orchestrator's external collaborators.
//!
//! - [`MockTransport`]: a voice connection whose transitions the test drives
//! - [`MockOutput`]: an audio output that "plays" until told to finish
//! - [`ScriptedSource`]: a `Playable` whose resolutions follow a script
//! - [`CallbackLog`]: records track lifecycle callbacks in order
//!
//! All of them are meant for `#[tokio::test(start_paused = true)]`, where
//! timers run in virtual time.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockTransport, settle};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let transport = MockTransport::new(ConnectionStatus::Ready);
//!     transport.set_status(ConnectionStatus::Signalling);
//!     settle().await;
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::player::{AudioOutput, AudioResource, PlayerEvent, PlayerState, PlayerStatus};
use crate::track::{AudioSource, Playable, ResolveError, StreamFormat, Track, TrackCallbacks, TrackMetadata};
use crate::transport::{ConnectionStatus, VoiceTransport};

/// Let every spawned task that is ready run to its next await point.
///
/// Advances virtual time by one millisecond, so it also fires timers that
/// are due "now".
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Scriptable voice connection.
pub struct MockTransport {
    status: watch::Sender<ConnectionStatus>,
    rejoins: watch::Sender<u32>,
    events: broadcast::Sender<ConnectionStatus>,
    destroys: AtomicU32,
}

impl MockTransport {
    pub fn new(initial: ConnectionStatus) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            status: watch::Sender::new(initial),
            rejoins: watch::Sender::new(0),
            events,
            destroys: AtomicU32::new(0),
        })
    }

    /// Transition and announce it. Reaching `Ready` resets the rejoin counter.
    pub fn set_status(&self, status: ConnectionStatus) {
        if status.is_ready() {
            self.rejoins.send_replace(0);
        }
        self.status.send_replace(status);
        let _ = self.events.send(status);
    }

    pub fn destroy_count(&self) -> u32 {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Resolve once at least `n` rejoins have been requested.
    pub async fn wait_for_rejoins(&self, n: u32) {
        let mut rx = self.rejoins.subscribe();
        let _ = rx.wait_for(|attempts| *attempts >= n).await;
    }

    pub async fn wait_for_destroy(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|status| status.is_destroyed()).await;
    }
}

impl VoiceTransport for MockTransport {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.events.subscribe()
    }

    fn rejoin_attempts(&self) -> u32 {
        *self.rejoins.borrow()
    }

    fn rejoin(&self) -> bool {
        self.rejoins.send_modify(|attempts| *attempts += 1);
        true
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Destroyed);
    }
}

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

/// Audio output that stays `Playing` until [`MockOutput::finish`].
pub struct MockOutput {
    state: Mutex<PlayerState>,
    events: broadcast::Sender<PlayerEvent>,
    played: Mutex<Vec<String>>,
    overlapping_plays: AtomicUsize,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(PlayerState::idle()),
            events,
            played: Mutex::new(Vec::new()),
            overlapping_plays: AtomicUsize::new(0),
        })
    }

    fn transition(&self, to: PlayerState) {
        let from = std::mem::replace(&mut *self.state.lock(), to.clone());
        let _ = self.events.send(PlayerEvent::StateChanged { from, to });
    }

    /// The current stream ends on its own.
    pub fn finish(&self) {
        if !self.state.lock().is_idle() {
            self.transition(PlayerState::idle());
        }
    }

    /// Report a mid-stream failure for the loaded track (no transition).
    pub fn fail(&self, message: &str) {
        let track = self.state.lock().track.clone();
        if let Some(track) = track {
            let _ = self.events.send(PlayerEvent::Error {
                track,
                message: message.to_string(),
            });
        }
    }

    /// URLs handed to `play`, in order.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().len()
    }

    /// `play` calls that arrived while something was still loaded.
    pub fn overlapping_plays(&self) -> usize {
        self.overlapping_plays.load(Ordering::SeqCst)
    }

    pub fn now_playing(&self) -> Option<String> {
        self.state.lock().track.as_ref().map(|t| t.url().to_string())
    }
}

impl AudioOutput for MockOutput {
    fn state(&self) -> PlayerState {
        self.state.lock().clone()
    }

    fn play(&self, resource: AudioResource) {
        if !self.state.lock().is_idle() {
            self.overlapping_plays.fetch_add(1, Ordering::SeqCst);
        }
        self.played.lock().push(resource.track.url().to_string());
        self.transition(PlayerState::playing(resource.track));
    }

    fn pause(&self) -> bool {
        let state = self.state.lock().clone();
        match (state.status, state.track) {
            (PlayerStatus::Playing, Some(track)) => {
                self.transition(PlayerState::paused(track));
                true
            }
            _ => false,
        }
    }

    fn unpause(&self) -> bool {
        let state = self.state.lock().clone();
        match (state.status, state.track) {
            (PlayerStatus::Paused, Some(track)) => {
                self.transition(PlayerState::playing(track));
                true
            }
            _ => false,
        }
    }

    fn stop(&self, _force: bool) -> bool {
        if self.state.lock().is_idle() {
            return false;
        }
        self.transition(PlayerState::idle());
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// `Playable` whose successive resolutions follow a script; once the script
/// runs out every resolution succeeds.
pub struct ScriptedSource {
    metadata: TrackMetadata,
    script: Mutex<VecDeque<Result<(), ResolveError>>>,
    delay: Duration,
    resolves: Arc<AtomicU32>,
}

impl ScriptedSource {
    pub fn new(name: &str, script: Vec<Result<(), ResolveError>>) -> Self {
        Self {
            metadata: TrackMetadata::new(format!("https://media.test/{name}"))
                .with_title(name.to_uppercase()),
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
            resolves: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn ok(name: &str) -> Self {
        Self::new(name, Vec::new())
    }

    /// Always fails with `NoAudio`.
    pub fn broken(name: &str) -> Self {
        Self::new(name, (0..16).map(|_| Err(ResolveError::NoAudio)).collect())
    }

    /// Each resolution takes `delay` of (virtual) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Counter of resolutions performed, shared with the source.
    pub fn resolve_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.resolves)
    }
}

#[async_trait]
impl Playable for ScriptedSource {
    fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    async fn resolve(&self) -> Result<AudioSource, ResolveError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => Ok(AudioSource::new(tokio::io::empty(), StreamFormat::OggOpus)),
        }
    }
}

/// A resolvable track named `name` with no callbacks.
pub fn track(name: &str) -> Arc<Track> {
    Arc::new(Track::new(ScriptedSource::ok(name), TrackCallbacks::new()))
}

/// A resolvable track whose callbacks are recorded in `log`.
pub fn track_with(name: &str, log: &CallbackLog) -> Arc<Track> {
    Arc::new(Track::new(ScriptedSource::ok(name), log.callbacks(&name.to_uppercase())))
}

/// Ordered record of lifecycle callbacks, as `kind:TITLE[:detail]` strings.
///
/// Tracks built by [`ScriptedSource`] are titled with their upper-cased
/// name, so the entries read like `start:A`, `finish:A`, `retry:B:2`.
/// The `start` entry records the title the engine actually passed.
#[derive(Clone, Default)]
pub struct CallbackLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks that append to this log, tagged with `title`.
    pub fn callbacks(&self, title: &str) -> TrackCallbacks {
        self.build(Arc::new(Mutex::new(title.to_string())))
    }

    fn build(&self, title: Arc<Mutex<String>>) -> TrackCallbacks {
        let (start_log, start_title) = (self.clone(), Arc::clone(&title));
        let (finish_log, finish_title) = (self.clone(), Arc::clone(&title));
        let (error_log, error_title) = (self.clone(), Arc::clone(&title));
        let (retry_log, retry_title) = (self.clone(), title);

        TrackCallbacks::new()
            .on_start(move |t| {
                *start_title.lock() = t.to_string();
                start_log.push(format!("start:{t}"));
            })
            .on_finish(move || finish_log.push(format!("finish:{}", finish_title.lock())))
            .on_error(move |e| error_log.push(format!("error:{}:{e}", error_title.lock())))
            .on_retry(move |n| retry_log.push(format!("retry:{}:{n}", retry_title.lock())))
    }

    fn push(&self, entry: String) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries of the given kind (`"start"`, `"error"`, ...).
    pub fn count(&self, kind: &str) -> usize {
        let prefix = format!("{kind}:");
        self.entries.lock().iter().filter(|e| e.starts_with(&prefix)).count()
    }
}
