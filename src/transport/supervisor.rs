//! Keeps a session's voice connection usable, or gives it up.
//!
//! Reactions per transition:
//!
//! | transition | reaction |
//! |---|---|
//! | `Disconnected` with the ambiguous close code | wait briefly for `Connecting` (channel move); otherwise destroy (kicked) |
//! | `Disconnected`, rejoins left | sleep `(attempts + 1) * step`, then rejoin |
//! | `Disconnected`, rejoins exhausted | destroy |
//! | `Signalling` / `Connecting` | single-flight wait for `Ready`; destroy on timeout |
//! | `Destroyed` | hand control back to the session for teardown |
//!
//! Nothing here returns an error to callers: every failure ends in the
//! connection being destroyed, which the session observes.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{ConnectionStatus, DisconnectReason, VoiceTransport, destroy_if_alive, entered_state};
use crate::config::TransportConfig;
use crate::single_flight::SingleFlight;

pub struct TransportSupervisor {
    transport: Arc<dyn VoiceTransport>,
    config: TransportConfig,
    ready_lock: SingleFlight,
}

impl TransportSupervisor {
    pub fn new(transport: Arc<dyn VoiceTransport>, config: TransportConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            ready_lock: SingleFlight::new(),
        })
    }

    /// Consume transition events until the connection is destroyed, then
    /// call `on_destroyed` exactly once.
    ///
    /// `events` must be subscribed before the caller last looked at the
    /// transport, so that no transition is missed.
    pub async fn run<F>(self: Arc<Self>, mut events: broadcast::Receiver<ConnectionStatus>, on_destroyed: F)
    where
        F: FnOnce() + Send,
    {
        // The session may be created mid-handshake or mid-outage.
        match self.transport.status() {
            ConnectionStatus::Destroyed => {
                on_destroyed();
                return;
            }
            status => self.react(status),
        }

        loop {
            match events.recv().await {
                Ok(ConnectionStatus::Destroyed) => {
                    tracing::info!(target: "transport", "Voice connection destroyed");
                    break;
                }
                Ok(status) => self.react(status),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "transport", skipped, "Missed connection transitions");
                    match self.transport.status() {
                        ConnectionStatus::Destroyed => break,
                        status => self.react(status),
                    }
                }
                Err(RecvError::Closed) => {
                    tracing::warn!(target: "transport", "Connection event stream closed, treating as destroyed");
                    break;
                }
            }
        }

        on_destroyed();
    }

    fn react(self: &Arc<Self>, status: ConnectionStatus) {
        tracing::debug!(target: "transport", ?status, "Connection transitioned");
        match status {
            ConnectionStatus::Disconnected(reason) => {
                let supervisor = Arc::clone(self);
                tokio::spawn(async move { supervisor.handle_disconnect(reason).await });
            }
            ConnectionStatus::Signalling | ConnectionStatus::Connecting => {
                let supervisor = Arc::clone(self);
                tokio::spawn(async move { supervisor.await_ready().await });
            }
            ConnectionStatus::Ready | ConnectionStatus::Destroyed => {}
        }
    }

    /// Decide between waiting out a channel move, rejoining, and giving up.
    pub async fn handle_disconnect(&self, reason: DisconnectReason) {
        let transport = &*self.transport;

        if self.is_ambiguous_close(reason) {
            // Same close code for "moved to another channel" and "kicked".
            // A move re-enters Connecting on its own; a kick does not.
            let grace = self.config.channel_move_grace();
            match entered_state(transport, grace, |s| matches!(s, ConnectionStatus::Connecting)).await {
                Ok(_) => {
                    tracing::info!(target: "transport", "Reconnecting after channel move");
                }
                Err(_) => {
                    tracing::info!(target: "transport", ?grace, "No reconnect after close, assuming removal");
                    destroy_if_alive(transport);
                }
            }
            return;
        }

        let attempts = transport.rejoin_attempts();
        if attempts < self.config.max_rejoin_attempts {
            let delay = self.config.rejoin_backoff(attempts);
            tracing::info!(target: "transport", ?reason, attempts, ?delay, "Rejoining after disconnect");
            tokio::time::sleep(delay).await;

            if transport.status().is_destroyed() {
                tracing::debug!(target: "transport", "Connection destroyed during backoff");
                return;
            }
            if !transport.rejoin() {
                tracing::warn!(target: "transport", "Transport refused to rejoin");
            }
        } else {
            tracing::warn!(target: "transport", attempts, "Rejoin attempts exhausted, destroying connection");
            destroy_if_alive(transport);
        }
    }

    /// Bound how long the connection may sit in Signalling/Connecting.
    ///
    /// Overlapping calls collapse into the first one.
    pub async fn await_ready(&self) {
        let Some(_guard) = self.ready_lock.try_enter() else {
            tracing::trace!(target: "transport", "Ready wait already in flight");
            return;
        };

        let timeout = self.config.ready_timeout();
        match entered_state(&*self.transport, timeout, |s| s.is_ready()).await {
            Ok(_) => tracing::debug!(target: "transport", "Voice connection ready"),
            Err(e) => {
                tracing::warn!(target: "transport", error = %e, "Connection not ready in time, destroying");
                destroy_if_alive(&*self.transport);
            }
        }
    }

    fn is_ambiguous_close(&self, reason: DisconnectReason) -> bool {
        matches!(
            reason,
            DisconnectReason::WebSocketClose { code } if code == self.config.ambiguous_close_code
        )
    }
}
