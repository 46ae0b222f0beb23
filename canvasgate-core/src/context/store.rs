//! Session-scoped context storage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::model::Context;
use crate::error::StoreError;

/// Opaque identifier of a user session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key a context is stored under inside a session.
pub fn storage_key(app_id: &str) -> String {
    format!("canvasgate.{}", app_id)
}

/// Trait for context storage implementations.
///
/// A store maps `(session, application)` to the application's current
/// [`Context`]. Writes replace the previous context; concurrent writers
/// within one session race and the last one wins.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Load the context stored for an application in a session.
    async fn load(
        &self,
        session: &SessionId,
        app_id: &str,
    ) -> Result<Option<Context>, StoreError>;

    /// Store (or replace) the context for an application in a session.
    async fn save(
        &self,
        session: &SessionId,
        app_id: &str,
        context: Context,
    ) -> Result<(), StoreError>;

    /// Remove an application's context.
    ///
    /// Returns `true` if a context was removed, `false` if none was stored.
    async fn remove(&self, session: &SessionId, app_id: &str) -> Result<bool, StoreError>;

    /// Drop everything stored for a session.
    async fn clear_session(&self, session: &SessionId) -> Result<(), StoreError>;
}

/// Idle time after which [`MemoryContextStore`] forgets a session by default.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on sessions held by [`MemoryContextStore`].
pub const DEFAULT_MAX_SESSIONS: usize = 100_000;

struct SessionEntry {
    contexts: HashMap<String, Context>,
    touched: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            contexts: HashMap::new(),
            touched: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.touched) >= ttl
    }
}

/// In-memory context store.
///
/// Sessions idle for longer than the TTL are dropped, and once the store
/// holds `max_sessions` sessions the least recently touched one is evicted
/// to make room. Browsers that refuse third-party cookies start a new
/// session on every canvas load, so both bounds matter. Contexts are lost
/// when the process exits.
pub struct MemoryContextStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl std::fmt::Debug for MemoryContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContextStore")
            .field("sessions", &self.sessions.read().len())
            .field("ttl", &self.ttl)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget sessions not touched for `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Hold at most `max_sessions` sessions (at least one).
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Number of live sessions holding at least one context.
    pub fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .values()
            .filter(|entry| !entry.contexts.is_empty() && !entry.is_expired(self.ttl, now))
            .count()
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        purge(&mut sessions, self.ttl, Instant::now());
        before - sessions.len()
    }
}

fn purge(sessions: &mut HashMap<SessionId, SessionEntry>, ttl: Duration, now: Instant) {
    sessions.retain(|_, entry| !entry.is_expired(ttl, now));
}

fn evict_oldest(sessions: &mut HashMap<SessionId, SessionEntry>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, entry)| entry.touched)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        sessions.remove(&id);
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn load(
        &self,
        session: &SessionId,
        app_id: &str,
    ) -> Result<Option<Context>, StoreError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let Some(entry) = sessions.get_mut(session) else {
            return Ok(None);
        };
        if entry.is_expired(self.ttl, now) {
            sessions.remove(session);
            return Ok(None);
        }
        entry.touched = now;
        Ok(entry.contexts.get(&storage_key(app_id)).cloned())
    }

    async fn save(
        &self,
        session: &SessionId,
        app_id: &str,
        context: Context,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();

        if !sessions.contains_key(session) {
            purge(&mut sessions, self.ttl, now);
            while sessions.len() >= self.max_sessions {
                evict_oldest(&mut sessions);
            }
        }

        let entry = sessions
            .entry(session.clone())
            .or_insert_with(SessionEntry::new);
        if entry.is_expired(self.ttl, now) {
            entry.contexts.clear();
        }
        entry.touched = now;
        entry.contexts.insert(storage_key(app_id), context);
        Ok(())
    }

    async fn remove(&self, session: &SessionId, app_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write();
        Ok(sessions
            .get_mut(session)
            .and_then(|entry| entry.contexts.remove(&storage_key(app_id)))
            .is_some())
    }

    async fn clear_session(&self, session: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().remove(session);
        Ok(())
    }
}
