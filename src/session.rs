//! Session storage for the HTTP front-end.
//!
//! A session pairs one [`VectorIndex`] with one [`ChatHistory`] under an
//! opaque, caller-chosen id. Each session sits behind its own async mutex:
//! a query holds it for the whole retrieve, answer, append sequence, so two
//! requests for the same id run one after the other while different ids
//! proceed in parallel.
//!
//! Uploading to an existing id swaps the map entry for a fresh session. A
//! query that already holds the old session finishes against it; later
//! lookups see only the replacement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::QaError;
use crate::index::VectorIndex;
use crate::models::ChatHistory;

pub struct Session {
    pub id: String,
    pub index: VectorIndex,
    pub history: ChatHistory,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A session over `index` with an empty history.
    pub fn new(id: impl Into<String>, index: VectorIndex) -> Self {
        Self {
            id: id.into(),
            index,
            history: ChatHistory::new(),
            created_at: Utc::now(),
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Keyed storage of sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts `session`, replacing any existing session with the same id.
    /// Returns `true` when an existing session was replaced.
    async fn put(&self, session: Session) -> bool;

    async fn get(&self, id: &str) -> Result<SharedSession, QaError>;

    async fn remove(&self, id: &str) -> Result<(), QaError>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Volatile process-local store; everything is lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session: Session) -> bool {
        let id = session.id.clone();
        let mut sessions = self.sessions.write().await;
        sessions
            .insert(id, Arc::new(Mutex::new(session)))
            .is_some()
    }

    async fn get(&self, id: &str) -> Result<SharedSession, QaError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QaError::SessionNotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<(), QaError> {
        match self.sessions.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(QaError::SessionNotFound(id.to_string())),
        }
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
