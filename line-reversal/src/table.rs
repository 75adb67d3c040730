//! Thread-safe session registry with idle expiration.
//!
//! Lock order is always table, then session.  The dispatcher releases the
//! table lock before touching a session; only the reaper holds both.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::time::{Duration, Instant};

use crate::config::Config;
use crate::packet::SessionId;
use crate::session::{lock, Session, SharedSession};
use crate::socket::Transmit;

struct Entry {
    session: SharedSession,
    last_activity: Instant,
}

/// Mapping from session id to live session.
#[derive(Clone, Default)]
pub struct SessionTable {
    inner: Arc<Mutex<HashMap<SessionId, Entry>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a session and mark it active.
    pub fn lookup(&self, id: SessionId) -> Option<SharedSession> {
        let mut inner = lock(&self.inner);
        let entry = inner.get_mut(&id)?;
        entry.last_activity = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Return the session for `id`, creating it if absent.
    ///
    /// The boolean is `true` when this call created the session; the caller
    /// is then responsible for starting its retransmitter.  An existing
    /// session keeps its original `transmit`.
    pub fn get_or_create(
        &self,
        id: SessionId,
        transmit: Arc<dyn Transmit>,
        config: &Config,
    ) -> (SharedSession, bool) {
        let mut inner = lock(&self.inner);
        let now = Instant::now();

        if let Some(entry) = inner.get_mut(&id) {
            entry.last_activity = now;
            return (Arc::clone(&entry.session), false);
        }

        let session = Arc::new(Mutex::new(Session::new(id, transmit, config)));
        inner.insert(
            id,
            Entry {
                session: Arc::clone(&session),
                last_activity: now,
            },
        );
        log::info!("[lrcp] session {id} opened");
        (session, true)
    }

    /// Unregister a session.  Later lookups return `None`.
    pub fn remove(&self, id: SessionId) -> Option<SharedSession> {
        lock(&self.inner).remove(&id).map(|e| e.session)
    }

    /// Unregister `id` only if it still maps to `session`.
    ///
    /// A session that was reaped and replaced by a fresh `connect` under the
    /// same id must not take its successor down with it.
    pub fn remove_if_same(&self, id: SessionId, session: &SharedSession) -> bool {
        let mut inner = lock(&self.inner);
        match inner.get(&id) {
            Some(entry) if Arc::ptr_eq(&entry.session, session) => {
                inner.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Close and remove every session idle for at least `expiry`.
    ///
    /// Returns the ids that were reaped.
    pub fn reap_expired(&self, now: Instant, expiry: Duration) -> Vec<SessionId> {
        let mut inner = lock(&self.inner);
        let mut reaped = Vec::new();

        inner.retain(|&id, entry| {
            if now.saturating_duration_since(entry.last_activity) < expiry {
                return true;
            }
            let mut session = lock(&entry.session);
            if !session.is_closed() {
                session.close();
            }
            reaped.push(id);
            false
        });

        if !reaped.is_empty() {
            log::info!("[reaper] expired {} idle session(s): {reaped:?}", reaped.len());
        }
        reaped
    }

    pub fn contains(&self, id: SessionId) -> bool {
        lock(&self.inner).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}
