//! Per-user conversation sessions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::artifact::SynthesisArtifact;
use crate::conversation::ConversationHistory;
use crate::language::Language;

/// One conversation with its language pair and latest spoken reply
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    /// Turns exchanged so far
    pub history: ConversationHistory,
    /// Language the user speaks
    pub input_language: Language,
    /// Language replies are spoken in
    pub output_language: Language,
    /// Audio of the most recent reply, if synthesis succeeded
    pub latest_artifact: Option<SynthesisArtifact>,
    created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(input_language: Language, output_language: Language) -> Self {
        Self {
            id: Uuid::new_v4(),
            history: ConversationHistory::new(),
            input_language,
            output_language,
            latest_artifact: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Shared handle to a session; the lock is held for a whole interaction
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory registry of live sessions
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its handle
    pub async fn create(&self, input_language: Language, output_language: Language) -> SessionHandle {
        let session = Session::new(input_language, output_language);
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(id, Arc::clone(&handle));
        tracing::debug!(session = %id, %input_language, %output_language, "session created");
        handle
    }

    /// Look up a session
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Discard a session, returning whether it existed
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(session = %id, "session discarded");
        }
        removed
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new();
        let handle = store.create(Language::Hi, Language::En).await;
        let id = handle.lock().await.id();

        let found = store.get(id).await.unwrap();
        assert_eq!(found.lock().await.input_language, Language::Hi);
        assert_eq!(store.len().await, 1);

        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert!(store.get(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.create(Language::En, Language::Fr).await;
        let b = store.create(Language::En, Language::De).await;

        a.lock()
            .await
            .history
            .append(crate::conversation::ConversationTurn::user("only in a"));

        assert_eq!(a.lock().await.history.len(), 1);
        assert!(b.lock().await.history.is_empty());
        assert_ne!(a.lock().await.id(), b.lock().await.id());
    }
}
