//! Session store selection from configuration.

use std::sync::Arc;

use tracing::info;

use conduit_config::{SessionSection, StoreKind};
use conduit_session::{FileStore, MemoryStore, SharedSessionStore};

use crate::error::Result;

/// Open the store described by a `[session]` section.
pub async fn open_store(section: &SessionSection) -> Result<SharedSessionStore> {
    match section.store {
        StoreKind::Memory => {
            info!(store = "memory", "Session store opened");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::File => {
            let path = section.file_path()?;
            let store = FileStore::open(&path).await?;
            info!(store = "file", path = %path.display(), "Session store opened");
            Ok(Arc::new(store))
        }
    }
}
