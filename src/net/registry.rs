//! Session Registry
//!
//! Thread-safe maps over all live sessions: every session by its session id
//! from the moment it is accepted, and authenticated sessions by user id from
//! login until close. Used for targeted push and forced disconnects.
//!
//! A push racing a concurrent remove for the same user simply finds nothing
//! and is dropped; at-most-once delivery for such notifications is expected.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::Session;

/// Registry of live sessions.
pub struct SessionRegistry {
    /// Every open session, keyed by session id.
    sessions: DashMap<String, Arc<Session>>,
    /// Authenticated sessions, keyed by user id. Written exactly twice per
    /// session under normal operation: set on login, removed on close.
    users: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Track a freshly accepted session.
    pub(crate) fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Drop a session from both maps. Called once, from `Session::close`.
    pub(crate) fn unregister(&self, session: &Session) {
        self.sessions.remove(session.id());
        if let Some(user_id) = session.user_id() {
            // Only remove the binding if it still points at this session; a
            // newer login for the same user must not be evicted.
            self.users
                .remove_if(user_id, |_, bound| bound.id() == session.id());
        }
    }

    /// Bind a user id to its live session.
    pub fn set_session(&self, user_id: &str, session: Arc<Session>) {
        tracing::info!(user_id, session_id = %session.id(), "user session registered");
        self.users.insert(user_id.to_string(), session);
    }

    /// Look up the live session for a user, if any.
    pub fn get_session(&self, user_id: &str) -> Option<Arc<Session>> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    /// Drop the user binding without closing the session.
    pub fn remove_session(&self, user_id: &str) {
        self.users.remove(user_id);
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every live session. Used during server shutdown.
    pub fn close_all(&self) {
        // Collect first: close() removes entries from the maps we iterate.
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in sessions {
            session.close();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
