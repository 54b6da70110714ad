//! Group → session registry.
//!
//! Owned by whatever serves the commands. The first request for a group
//! creates its session; the connection reaching `Destroyed` removes it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::{GroupId, Session, SessionError, SessionHooks};
use crate::config::Config;
use crate::player::AudioOutput;
use crate::transport::VoiceTransport;

/// The collaborators a fresh session needs.
pub struct Connection {
    pub transport: Arc<dyn VoiceTransport>,
    pub output: Arc<dyn AudioOutput>,
}

type SessionMap = Mutex<HashMap<GroupId, Arc<Session>>>;

pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    config: Arc<Config>,
    hooks: SessionHooks,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            hooks: SessionHooks::new(),
        }
    }

    /// Forwarded to every session this registry creates.
    pub fn on_queue_exhausted(mut self, f: impl Fn(GroupId, u32) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_queue_exhausted(f);
        self
    }

    /// The live session for `group`, creating one with `connect` if needed.
    ///
    /// A session whose connection is disconnected or gone is replaced.
    /// `connect` runs under the registry lock and must not call back into it.
    pub fn get_or_create<F>(&self, group: GroupId, connect: F) -> Arc<Session>
    where
        F: FnOnce() -> Connection,
    {
        let (session, stale) = {
            let mut sessions = self.sessions.lock();
            if let Some(existing) = sessions.get(&group)
                && is_usable(existing)
            {
                return Arc::clone(existing);
            }

            let stale = sessions.remove(&group);
            let Connection { transport, output } = connect();
            let session = Session::start(
                group,
                transport,
                output,
                Arc::clone(&self.config),
                self.session_hooks(),
            );
            sessions.insert(group, Arc::clone(&session));
            (session, stale)
        };

        if let Some(stale) = stale {
            tracing::info!(target: "session", group = %group, "Replacing stale session");
            stale.shutdown();
        }
        session
    }

    /// The session for `group`, if it is still active.
    pub fn get(&self, group: GroupId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&group).filter(|s| s.is_active()).cloned()
    }

    /// Stop and forget the session for `group`.
    pub fn leave(&self, group: GroupId) -> Result<(), SessionError> {
        let session = self.sessions.lock().remove(&group).ok_or(SessionError::NotActive)?;
        // Outside the lock: teardown calls back into the registry
        session.stop()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.sessions.lock().keys().copied().collect();
        groups.sort();
        groups
    }

    fn session_hooks(&self) -> SessionHooks {
        let sessions: Weak<SessionMap> = Arc::downgrade(&self.sessions);
        self.hooks.clone().on_teardown(move |session| {
            let Some(sessions) = sessions.upgrade() else {
                return;
            };
            let mut sessions = sessions.lock();
            // Only remove the entry if it is still this session
            if sessions
                .get(&session.group())
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), session))
            {
                sessions.remove(&session.group());
                tracing::debug!(target: "session", group = %session.group(), "Session removed from registry");
            }
        })
    }
}

fn is_usable(session: &Session) -> bool {
    session.is_active() && !session.connection_status().is_disconnected()
}
