//! The session store contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::{
    ListFilter, NewSession, Pagination, Session, SessionId, SessionPage, SessionUpdate, Turn,
};

/// Storage for sessions.
///
/// Implementations must be safe to call from many concurrent requests and
/// serialize conflicting writes to the same session id; callers do no
/// locking of their own.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create and persist a new session.
    async fn create(&self, new: NewSession) -> Result<Session>;

    /// Fetch a session by id.
    async fn get(&self, id: &SessionId) -> Result<Session>;

    /// Remove a session.
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// List sessions matching `filter`, newest first.
    async fn list(&self, filter: &ListFilter, pagination: Pagination) -> Result<SessionPage>;

    /// Persist a session that was mutated in place.
    async fn write(&self, session: &Session) -> Result<()>;

    /// Apply a partial update and return the result.
    async fn update(&self, id: &SessionId, update: SessionUpdate) -> Result<Session>;

    /// Append a finished turn to the stored record, leaving every other
    /// field as the store currently has it.
    async fn append(&self, id: &SessionId, turn: Turn) -> Result<Session>;
}

/// A store that can be shared across threads.
pub type SharedSessionStore = Arc<dyn SessionStore>;
