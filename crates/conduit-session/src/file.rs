//! File-backed session store.
//!
//! Layout: `{dir}/{session_id}.json`, one pretty-printed record per session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::session::{
    ListFilter, NewSession, Pagination, Session, SessionId, SessionPage, SessionUpdate, Turn,
};
use crate::store::SessionStore;

/// Sessions stored as JSON files in a directory.
///
/// Mutations are serialized by a store-wide lock. Records are written to a
/// temporary file and renamed into place, so readers never see a partial
/// record.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a session's record.
    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read(&self, id: &SessionId) -> Result<Session> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let _guard = self.lock.lock().await;
        let session = new.into_session();
        self.save(&session).await?;
        debug!(session_id = %session.id, dir = %self.dir.display(), "Session created");
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Session> {
        self.read(id).await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => {
                debug!(session_id = %id, "Session deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, filter: &ListFilter, pagination: Pagination) -> Result<SessionPage> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Session>(&bytes).map_err(SessionError::from),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session record"),
            }
        }
        Ok(SessionPage::build(sessions, filter, pagination))
    }

    async fn write(&self, session: &Session) -> Result<()> {
        let _guard = self.lock.lock().await;
        if !tokio::fs::try_exists(self.path_for(&session.id)).await? {
            return Err(SessionError::NotFound(session.id.to_string()));
        }
        self.save(session).await
    }

    async fn update(&self, id: &SessionId, update: SessionUpdate) -> Result<Session> {
        let _guard = self.lock.lock().await;
        let mut session = self.read(id).await?;
        update.apply(&mut session);
        self.save(&session).await?;
        Ok(session)
    }

    async fn append(&self, id: &SessionId, turn: Turn) -> Result<Session> {
        let _guard = self.lock.lock().await;
        let mut session = self.read(id).await?;
        session.apply_turn(turn);
        self.save(&session).await?;
        Ok(session)
    }
}
