//! Session orchestrator: one per active voice group.
//!
//! A [`Session`] owns the voice connection's supervisor, the playback
//! engine, and the play queue, and is the only thing callers mutate.
//!
//! # Advancement
//!
//! Every trigger (enqueue, skip while idle, the engine going idle) spawns
//! [`Session::process_queue`]. Only one instance runs at a time; a trigger
//! that finds it busy leaves a rerun mark instead of being dropped. The
//! running instance pops the head, resolves it (retrying within the
//! track's budget), and plays it if nothing raced in meanwhile:
//!
//! ```text
//!   enqueue ─┐
//!   skip ────┼──► process_queue ──► pop ──► resolve ──► engine idle? ──► play
//!   idle ────┘        ▲                        │ fail            │ no
//!                     └──── next track ◄───────┴─────────────────┘
//! ```
//!
//! A skip or stop bumps the session epoch. A resolution in flight when the
//! epoch moves is dropped on the spot, so a stalled resolver never holds the
//! queue hostage; one that completes under an older epoch is discarded.

mod registry;

pub use registry::{Connection, SessionRegistry};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use crate::config::Config;
use crate::player::{
    AudioOutput, AudioResource, EngineAction, PlayQueue, PlaybackEngine, PlayerEvent, PlayerStatus,
};
use crate::single_flight::SingleFlight;
use crate::track::{AudioSource, Track, TrackError, TrackMetadata};
use crate::transport::{ConnectionStatus, TransportSupervisor, VoiceTransport, destroy_if_alive, entered_state};

/// Identifies the group (guild, room, ...) a session plays in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors returned by session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no active session")]
    NotActive,

    #[error("voice connection is not ready")]
    NotReady,
}

type TeardownFn = Arc<dyn Fn(&Session) + Send + Sync>;
type ExhaustedFn = Arc<dyn Fn(GroupId, u32) + Send + Sync>;

/// Session-level notifications.
#[derive(Clone, Default)]
pub struct SessionHooks {
    on_teardown: Option<TeardownFn>,
    on_queue_exhausted: Option<ExhaustedFn>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when the session is torn down.
    pub fn on_teardown(mut self, f: impl Fn(&Session) + Send + Sync + 'static) -> Self {
        self.on_teardown = Some(Arc::new(f));
        self
    }

    /// Called when advancement gives up after too many consecutive failures.
    pub fn on_queue_exhausted(mut self, f: impl Fn(GroupId, u32) + Send + Sync + 'static) -> Self {
        self.on_queue_exhausted = Some(Arc::new(f));
        self
    }
}

/// Read-only view of a session's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackMetadata>,
    /// Up to `limit` upcoming tracks, in play order
    pub upcoming: Vec<TrackMetadata>,
    /// Total number of queued tracks
    pub remaining: usize,
    pub looping: bool,
    pub status: PlayerStatus,
}

/// Result of one pop-resolve-play step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Nothing to do: queue empty, engine busy, or session closed
    Idle,
    Played,
    /// Resolved or abandoned, but a skip/stop raced it
    Discarded,
    /// Retry budget exhausted
    Failed,
}

/// How a resolution sequence ended without a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveFailure {
    Exhausted,
    Abandoned,
}

pub struct Session {
    group: GroupId,
    transport: Arc<dyn VoiceTransport>,
    engine: PlaybackEngine,
    queue: Mutex<PlayQueue>,
    looping: AtomicBool,
    advance_lock: SingleFlight,
    /// Bumped by idle skips and teardown; watched by in-flight resolutions
    epoch: watch::Sender<u64>,
    closed: AtomicBool,
    config: Arc<Config>,
    hooks: SessionHooks,
}

impl Session {
    /// Create a session and start supervising its connection and engine.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        group: GroupId,
        transport: Arc<dyn VoiceTransport>,
        output: Arc<dyn AudioOutput>,
        config: Arc<Config>,
        hooks: SessionHooks,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            group,
            transport: Arc::clone(&transport),
            engine: PlaybackEngine::new(output, config.playback.idle_teardown()),
            queue: Mutex::new(PlayQueue::new()),
            looping: AtomicBool::new(false),
            advance_lock: SingleFlight::new(),
            epoch: watch::channel(0).0,
            closed: AtomicBool::new(false),
            config: Arc::clone(&config),
            hooks,
        });

        // Subscribe before spawning so no early transition is missed
        let connection_events = transport.subscribe();
        let player_events = session.engine.subscribe();

        let supervisor = TransportSupervisor::new(transport, config.transport.clone());
        let weak = Arc::downgrade(&session);
        tokio::spawn(supervisor.run(connection_events, move || {
            if let Some(session) = weak.upgrade() {
                session.teardown();
            }
        }));

        tokio::spawn(drive_engine(Arc::downgrade(&session), player_events));

        tracing::info!(target: "session", group = %group, "Session started");
        session
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    pub fn player_status(&self) -> PlayerStatus {
        self.engine.status()
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::SeqCst)
    }

    /// Not torn down, and the connection still exists.
    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.transport.status().is_destroyed()
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SessionError::NotActive)
        }
    }

    /// Append a track and trigger advancement.
    pub fn enqueue(self: &Arc<Self>, track: Track) -> Result<(), SessionError> {
        self.enqueue_all([track])
    }

    /// Append several tracks (a playlist) in order, then trigger advancement once.
    pub fn enqueue_all(self: &Arc<Self>, tracks: impl IntoIterator<Item = Track>) -> Result<(), SessionError> {
        self.ensure_active()?;
        let queued = {
            let mut queue = self.queue.lock();
            for track in tracks {
                tracing::debug!(target: "session", group = %self.group, title = track.display_title(), "Enqueued");
                queue.push_back(Arc::new(track));
            }
            queue.len()
        };
        tracing::debug!(target: "session", group = %self.group, queued, "Queue updated");
        self.spawn_advance();
        Ok(())
    }

    /// Move past the current track.
    ///
    /// While playing this stops the engine; the idle transition advances.
    /// While idle it abandons any in-flight resolution and advances directly.
    pub fn skip(self: &Arc<Self>) -> Result<(), SessionError> {
        self.ensure_active()?;
        if self.engine.is_idle() {
            tracing::debug!(target: "session", group = %self.group, "Skip while idle, advancing directly");
            self.bump_epoch();
            self.spawn_advance();
        } else {
            self.engine.stop(true);
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        Ok(self.engine.pause())
    }

    pub fn resume(&self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        Ok(self.engine.unpause())
    }

    /// Enable or disable loop mode.
    ///
    /// Enabling while a track plays appends that track to the tail, unless
    /// it is already the last queued item.
    pub fn set_loop(&self, enabled: bool) -> Result<(), SessionError> {
        self.ensure_active()?;
        let was = self.looping.swap(enabled, Ordering::SeqCst);
        if enabled
            && !was
            && let Some(current) = self.engine.current_track()
        {
            let mut queue = self.queue.lock();
            if queue.back().map(|t| t.url()) != Some(current.url()) {
                queue.push_back(current);
            }
        }
        tracing::info!(target: "session", group = %self.group, enabled, "Loop mode changed");
        Ok(())
    }

    /// Flip loop mode; returns the new setting.
    pub fn toggle_loop(&self) -> Result<bool, SessionError> {
        let enabled = !self.is_looping();
        self.set_loop(enabled)?;
        Ok(enabled)
    }

    /// Reorder the queued (not yet playing) tracks.
    ///
    /// With loop on, the playing track's copy at the tail is part of the
    /// queue and gets shuffled along with the rest.
    pub fn shuffle(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.queue.lock().shuffle();
        Ok(())
    }

    /// Now playing plus up to `limit` upcoming tracks.
    pub fn snapshot(&self, limit: usize) -> Result<QueueSnapshot, SessionError> {
        self.ensure_active()?;
        let state = self.engine.state();
        let queue = self.queue.lock();
        Ok(QueueSnapshot {
            now_playing: state.track.map(|t| t.metadata().clone()),
            upcoming: queue.upcoming(limit),
            remaining: queue.len(),
            looping: self.is_looping(),
            status: state.status,
        })
    }

    /// Snapshot with the configured default limit.
    pub fn default_snapshot(&self) -> Result<QueueSnapshot, SessionError> {
        self.snapshot(self.config.queue.snapshot_limit)
    }

    /// Wait for the connection to be Ready, within the configured deadline.
    pub async fn ensure_ready(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        entered_state(&*self.transport, self.config.transport.ready_timeout(), |s| s.is_ready())
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::debug!(target: "session", group = %self.group, error = %e, "Connection not ready");
                SessionError::NotReady
            })
    }

    /// Leave: clear the queue, halt playback, destroy the connection.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.shutdown();
        Ok(())
    }

    /// Like [`Session::stop`] but without the liveness check.
    pub(crate) fn shutdown(&self) {
        destroy_if_alive(&*self.transport);
        self.teardown();
    }

    /// Runs once: on `Destroyed`, or on an explicit stop.
    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(target: "session", group = %self.group, "Tearing down session");

        self.bump_epoch();
        self.queue.lock().clear();
        self.engine.stop(true);
        self.engine.cancel_idle_timer();

        if let Some(hook) = &self.hooks.on_teardown {
            hook(self);
        }
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn bump_epoch(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    fn spawn_advance(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.process_queue().await });
    }

    /// Advance until something plays or nothing is left to try.
    pub async fn process_queue(&self) {
        let Some(mut guard) = self.advance_lock.enter_or_defer() else {
            tracing::trace!(target: "session", group = %self.group, "Advancement in flight, deferred");
            return;
        };

        let mut failures = 0u32;
        loop {
            match self.advance_once().await {
                Step::Played => failures = 0,
                Step::Idle => {}
                Step::Discarded => continue,
                Step::Failed => {
                    failures += 1;
                    // A cap of 0 gives up on the first failure, like 1
                    if let Some(cap) = self.config.queue.max_consecutive_failures
                        && failures >= cap
                    {
                        let remaining = self.queue.lock().len();
                        tracing::warn!(
                            target: "session",
                            group = %self.group,
                            failures,
                            remaining,
                            "Too many consecutive failures, pausing advancement"
                        );
                        drop(guard);
                        if let Some(hook) = &self.hooks.on_queue_exhausted {
                            hook(self.group, failures);
                        }
                        return;
                    }
                    continue;
                }
            }

            if !guard.release() {
                return;
            }
            // A trigger arrived while we held the guard; go round again
            match self.advance_lock.try_enter() {
                Some(next) => guard = next,
                None => return,
            }
        }
    }

    async fn advance_once(&self) -> Step {
        if self.closed.load(Ordering::SeqCst) || !self.engine.is_idle() {
            return Step::Idle;
        }

        let epoch = self.current_epoch();
        let track = {
            let mut queue = self.queue.lock();
            let Some(track) = queue.pop_front() else {
                return Step::Idle;
            };
            if self.is_looping() {
                queue.push_back(Arc::clone(&track));
            }
            track
        };

        let resolved = tokio::select! {
            resolved = self.resolve_with_retries(&track, epoch) => resolved,
            () = epoch_moved(self.epoch.subscribe(), epoch) => {
                tracing::info!(target: "session", group = %self.group, title = track.display_title(), "Abandoning resolution overtaken by skip");
                Err(ResolveFailure::Abandoned)
            }
        };

        match resolved {
            Ok(source) => {
                if self.current_epoch() != epoch || self.closed.load(Ordering::SeqCst) {
                    tracing::info!(target: "session", group = %self.group, title = track.display_title(), "Discarding resolution overtaken by skip");
                    return Step::Discarded;
                }
                if !self.engine.is_idle() {
                    tracing::info!(target: "session", group = %self.group, title = track.display_title(), "Engine busy after resolution, discarding");
                    return Step::Discarded;
                }
                self.engine.play(AudioResource::new(source, track));
                Step::Played
            }
            Err(ResolveFailure::Abandoned) => Step::Discarded,
            Err(ResolveFailure::Exhausted) => {
                if self.is_looping() {
                    // Its budget is spent; keep it out of the rotation
                    self.queue.lock().remove(&track);
                }
                Step::Failed
            }
        }
    }

    /// Resolve `track`, spending its retry budget on failures.
    async fn resolve_with_retries(&self, track: &Track, epoch: u64) -> Result<AudioSource, ResolveFailure> {
        let superseded = || self.current_epoch() != epoch || self.closed.load(Ordering::SeqCst);

        loop {
            let error = match track.resolve().await {
                Ok(source) => return Ok(source),
                Err(e) => e,
            };

            tracing::warn!(target: "session", group = %self.group, title = track.display_title(), error = %error, "Failed to resolve track");
            track.hooks().error(&TrackError::Resolve(error));

            if superseded() {
                return Err(ResolveFailure::Abandoned);
            }
            let Some(attempts_left) = track.take_retry() else {
                tracing::warn!(target: "session", group = %self.group, title = track.display_title(), "Retry budget exhausted, skipping track");
                return Err(ResolveFailure::Exhausted);
            };

            track.hooks().retry(attempts_left);
            tracing::info!(target: "session", group = %self.group, attempts_left, "Retrying track");
            tokio::time::sleep(self.config.track.retry_delay()).await;

            if superseded() {
                return Err(ResolveFailure::Abandoned);
            }
        }
    }
}

/// Resolves once the epoch differs from `epoch`.
async fn epoch_moved(mut epochs: watch::Receiver<u64>, epoch: u64) {
    loop {
        let current = *epochs.borrow_and_update();
        if current != epoch {
            return;
        }
        if epochs.changed().await.is_err() {
            // Sender gone with the session; nothing will move it again
            std::future::pending::<()>().await;
        }
    }
}

/// Feed engine events into the session until it is gone.
async fn drive_engine(session: Weak<Session>, mut events: broadcast::Receiver<PlayerEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "session", skipped, "Missed player events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(session) = session.upgrade() else {
            break;
        };

        let action = session.engine.handle_event(event, &session.transport);

        if session.closed.load(Ordering::SeqCst) {
            session.engine.cancel_idle_timer();
            if session.engine.is_idle() {
                break;
            }
            continue;
        }
        if action == EngineAction::Advance {
            session.spawn_advance();
        }
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_utils::{MockOutput, MockTransport, ScriptedSource, settle};
    use crate::track::TrackCallbacks;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Without loop or shuffle, tracks play in the order they were enqueued,
        /// however the enqueues interleave with tracks finishing
        #[test]
        fn plays_in_enqueue_order(
            batches in prop::collection::vec(prop::collection::vec("[a-z]{1,6}", 1..5), 1..6),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();

            let (expected, played, overlapping) = rt.block_on(async {
                let transport = MockTransport::new(ConnectionStatus::Ready);
                let output = MockOutput::new();
                let session = Session::start(
                    GroupId(1),
                    transport,
                    output.clone(),
                    Arc::new(Config::default()),
                    SessionHooks::new(),
                );

                let mut expected = Vec::new();
                for batch in &batches {
                    for name in batch {
                        session
                            .enqueue(Track::new(ScriptedSource::ok(name), TrackCallbacks::new()))
                            .unwrap();
                        expected.push(format!("https://media.test/{name}"));
                    }
                    settle().await;
                    output.finish();
                    settle().await;
                }
                while output.play_count() < expected.len() && output.now_playing().is_some() {
                    output.finish();
                    settle().await;
                }
                (expected, output.played(), output.overlapping_plays())
            });

            prop_assert_eq!(played, expected);
            prop_assert_eq!(overlapping, 0);
        }
    }
}
