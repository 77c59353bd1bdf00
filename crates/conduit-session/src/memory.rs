//! In-memory session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::session::{
    ListFilter, NewSession, Pagination, Session, SessionId, SessionPage, SessionUpdate, Turn,
};
use crate::store::SessionStore;

/// Sessions held in a map behind an async `RwLock`. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let session = new.into_session();
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        debug!(session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Session> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| debug!(session_id = %id, "Session deleted"))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &ListFilter, pagination: Pagination) -> Result<SessionPage> {
        let sessions = self.sessions.read().await;
        Ok(SessionPage::build(
            sessions.values().cloned(),
            filter,
            pagination,
        ))
    }

    async fn write(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(SessionError::NotFound(session.id.to_string())),
        }
    }

    async fn update(&self, id: &SessionId, update: SessionUpdate) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        update.apply(session);
        Ok(session.clone())
    }

    async fn append(&self, id: &SessionId, turn: Turn) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.apply_turn(turn);
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::GeneratorMeta;
    use conduit_llm::Message;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemoryStore::new();
        let session = store
            .create(NewSession::new(GeneratorMeta::new("m")).with_name("chat"))
            .await
            .unwrap();

        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(fetched, session);

        store.delete(&session.id).await.unwrap();
        assert!(matches!(
            store.get(&session.id).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&session.id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_persists_messages() {
        let store = MemoryStore::new();
        let mut session = store
            .create(NewSession::new(GeneratorMeta::new("m")))
            .await
            .unwrap();

        session.append(Message::user("hello"));
        store.write(&session).await.unwrap();

        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(fetched.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_update() {
        let store = MemoryStore::new();
        let session = store
            .create(NewSession::new(GeneratorMeta::new("m")))
            .await
            .unwrap();

        store
            .update(&session.id, SessionUpdate::new().with_name("renamed"))
            .await
            .unwrap();
        let appended = store
            .append(&session.id, Turn::new(vec![Message::user("hello")], 0))
            .await
            .unwrap();

        assert_eq!(appended.name, "renamed");
        assert_eq!(appended.messages.len(), 1);
        assert!(matches!(
            store.append(&SessionId::new(), Turn::new(Vec::new(), 0)).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_unknown_session() {
        let store = MemoryStore::new();
        let orphan = Session::new(GeneratorMeta::new("m"));
        assert!(matches!(
            store.write(&orphan).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let store = MemoryStore::new();
        let a = store
            .create(NewSession::new(GeneratorMeta::new("m")).with_label("team", "a"))
            .await
            .unwrap();
        store
            .create(NewSession::new(GeneratorMeta::new("m")).with_label("team", "b"))
            .await
            .unwrap();

        let updated = store
            .update(&a.id, SessionUpdate::new().with_name("renamed"))
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");

        let page = store
            .list(
                &ListFilter::default().with_label("team", "a"),
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.sessions[0].name, "renamed");

        let all = store
            .list(&ListFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.sessions[0].id, a.id);
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create(NewSession::new(GeneratorMeta::new(format!("m{i}"))))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
