//! Compare-and-set guard that lets one instance of an operation run at a time.
//!
//! Two entry modes:
//! - [`SingleFlight::try_enter`] drops the duplicate call (used for the
//!   transport's "wait until Ready" timer, where a second timer is useless).
//! - [`SingleFlight::enter_or_defer`] leaves a rerun mark when the guard is
//!   busy; the holder sees it on [`FlightGuard::release`] and goes round
//!   again (used for queue advancement, where dropping a call could strand a
//!   freshly enqueued track).

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
    rerun: AtomicBool,
}

impl SingleFlight {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        }
    }

    /// Take the guard if free; otherwise the call is dropped.
    pub fn try_enter(&self) -> Option<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    /// Take the guard if free; otherwise ask the current holder to rerun.
    pub fn enter_or_defer(&self) -> Option<FlightGuard<'_>> {
        // Mark first: the holder may release between our CAS and the mark.
        self.rerun.store(true, Ordering::SeqCst);
        let guard = self.try_enter()?;
        self.rerun.swap(false, Ordering::SeqCst);
        Some(guard)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Held while the guarded operation runs. Dropping it frees the guard.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl FlightGuard<'_> {
    /// Free the guard and report whether a deferred call arrived meanwhile.
    pub fn release(self) -> bool {
        let flight = self.flight;
        drop(self);
        flight.rerun.swap(false, Ordering::SeqCst)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_is_dropped() {
        let flight = SingleFlight::new();
        let guard = flight.try_enter().unwrap();
        assert!(flight.is_busy());
        assert!(flight.try_enter().is_none());

        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.try_enter().is_some());
    }

    #[test]
    fn test_deferred_entry_requests_rerun() {
        let flight = SingleFlight::new();
        let guard = flight.enter_or_defer().unwrap();
        assert!(flight.enter_or_defer().is_none());

        assert!(guard.release());
        assert!(!flight.is_busy());
    }

    #[test]
    fn test_release_without_contention() {
        let flight = SingleFlight::new();
        let guard = flight.enter_or_defer().unwrap();
        assert!(!guard.release());

        // The rerun mark is consumed by the release
        let guard = flight.enter_or_defer().unwrap();
        assert!(!guard.release());
    }

    #[test]
    fn test_dropped_entry_does_not_request_rerun() {
        let flight = SingleFlight::new();
        let guard = flight.enter_or_defer().unwrap();
        assert!(flight.try_enter().is_none());
        assert!(!guard.release());
    }
}
