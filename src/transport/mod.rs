//! Voice transport contract.
//!
//! The transport (gateway signalling, UDP media, encryption) is an external
//! collaborator. The orchestrator only needs its connection state machine:
//!
//! ```text
//!   Signalling ──► Connecting ──► Ready
//!        ▲              │           │
//!        └── rejoin ── Disconnected ◄┘
//!                       │
//!                       ▼
//!                   Destroyed   (terminal)
//! ```
//!
//! [`TransportSupervisor`] reacts to these transitions; [`entered_state`]
//! is the "wait until a state is reached within a timeout" primitive both
//! the supervisor and the session use.

mod supervisor;

pub use supervisor::TransportSupervisor;

use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Why the transport dropped to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The media gateway websocket closed with this code
    WebSocketClose { code: u16 },
    /// The gateway adapter could not deliver a payload
    AdapterUnavailable,
    /// The voice server endpoint went away
    EndpointRemoved,
    /// Disconnected on request
    Manual,
}

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected(DisconnectReason),
    Destroyed,
}

impl ConnectionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Signalling or Connecting: on the way to Ready.
    pub fn is_joining(&self) -> bool {
        matches!(self, Self::Signalling | Self::Connecting)
    }
}

/// The connection object owned by one session.
pub trait VoiceTransport: Send + Sync {
    /// Current state.
    fn status(&self) -> ConnectionStatus;

    /// Stream of state transitions (the new state of each).
    fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus>;

    /// Rejoins attempted since the connection was last Ready.
    fn rejoin_attempts(&self) -> u32;

    /// Ask the transport to rejoin. Returns false if it refused.
    fn rejoin(&self) -> bool;

    /// Tear the connection down; it transitions to `Destroyed`.
    fn destroy(&self);
}

/// Errors from [`entered_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for the voice connection")]
    Timeout(Duration),

    #[error("voice connection event stream closed")]
    Closed,
}

/// Wait until the transport reports a state matching `predicate`.
///
/// Checks the current state first, so an already-satisfied wait returns
/// immediately.
pub async fn entered_state<T, F>(
    transport: &T,
    timeout: Duration,
    predicate: F,
) -> Result<ConnectionStatus, WaitError>
where
    T: VoiceTransport + ?Sized,
    F: Fn(&ConnectionStatus) -> bool,
{
    // Subscribe before reading the state so no transition slips between.
    let mut events = transport.subscribe();
    let current = transport.status();
    if predicate(&current) {
        return Ok(current);
    }

    let wait = async {
        loop {
            match events.recv().await {
                Ok(status) if predicate(&status) => return Ok(status),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: "transport", skipped, "State wait lagged");
                    let status = transport.status();
                    if predicate(&status) {
                        return Ok(status);
                    }
                }
                Err(RecvError::Closed) => return Err(WaitError::Closed),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| WaitError::Timeout(timeout))?
}

/// Destroy the connection unless it already is. Returns true if destroyed now.
pub fn destroy_if_alive<T: VoiceTransport + ?Sized>(transport: &T) -> bool {
    if transport.status().is_destroyed() {
        false
    } else {
        transport.destroy();
        true
    }
}
