//! Track lifecycle callbacks with at-most-once delivery.
//!
//! Callers hand over a [`TrackCallbacks`] set when they build a track. The
//! same set may be shared by many tracks (a playlist enqueues one set for
//! every entry); each track wraps it in its own [`LifecycleHooks`], which
//! records per callback whether it has fired. Overlapping engine transitions
//! (pause/resume re-entering `Playing`, an error followed by the idle
//! transition, a looped track coming round again) therefore reach the caller
//! at most once per track.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::TrackError;

type StartFn = Arc<dyn Fn(&str) + Send + Sync>;
type FinishFn = Arc<dyn Fn() + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&TrackError) + Send + Sync>;
type RetryFn = Arc<dyn Fn(u32) + Send + Sync>;

/// Caller-supplied lifecycle callbacks.
///
/// Callbacks run on the orchestrator's task and must not block; spawn
/// anything slow (sending a chat message, say) instead of doing it inline.
#[derive(Clone, Default)]
pub struct TrackCallbacks {
    on_start: Option<StartFn>,
    on_finish: Option<FinishFn>,
    on_error: Option<ErrorFn>,
    on_retry: Option<RetryFn>,
}

impl TrackCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the display title when the track starts playing.
    pub fn on_start(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Called when the track stops playing (ended or skipped).
    pub fn on_finish(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    /// Called when the track fails to resolve or fails mid-stream.
    pub fn on_error(mut self, f: impl Fn(&TrackError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called with the remaining attempts when resolution is retried.
    pub fn on_retry(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TrackCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireState {
    NotFired,
    Fired,
}

/// One callback's delivery state.
#[derive(Debug)]
struct FireOnce(Mutex<FireState>);

impl FireOnce {
    fn new() -> Self {
        Self(Mutex::new(FireState::NotFired))
    }

    /// Flip to `Fired`; true only for the first caller.
    fn claim(&self) -> bool {
        let mut state = self.0.lock();
        match *state {
            FireState::NotFired => {
                *state = FireState::Fired;
                true
            }
            FireState::Fired => false,
        }
    }

    fn fired(&self) -> bool {
        *self.0.lock() == FireState::Fired
    }
}

/// Per-track wrapper that delivers each callback at most once.
#[derive(Debug)]
pub struct LifecycleHooks {
    callbacks: TrackCallbacks,
    start: FireOnce,
    finish: FireOnce,
    error: FireOnce,
    retry: FireOnce,
}

impl LifecycleHooks {
    pub fn new(callbacks: TrackCallbacks) -> Self {
        Self {
            callbacks,
            start: FireOnce::new(),
            finish: FireOnce::new(),
            error: FireOnce::new(),
            retry: FireOnce::new(),
        }
    }

    pub fn start(&self, title: &str) {
        if self.start.claim()
            && let Some(f) = &self.callbacks.on_start
        {
            f(title);
        }
    }

    pub fn finish(&self) {
        if self.finish.claim()
            && let Some(f) = &self.callbacks.on_finish
        {
            f();
        }
    }

    pub fn error(&self, error: &TrackError) {
        if self.error.claim()
            && let Some(f) = &self.callbacks.on_error
        {
            f(error);
        }
    }

    pub fn retry(&self, attempts_left: u32) {
        if self.retry.claim()
            && let Some(f) = &self.callbacks.on_retry
        {
            f(attempts_left);
        }
    }

    /// Whether `start` has been delivered (or swallowed) already.
    pub fn started(&self) -> bool {
        self.start.fired()
    }

    /// Whether `finish` has been delivered (or swallowed) already.
    pub fn finished(&self) -> bool {
        self.finish.fired()
    }
}
