//! Sessions for Conduit.
//!
//! A [`Session`] is a conversation plus the generator settings it runs with.
//! The gateway reads and appends to sessions; a [`SessionStore`] owns them.
//!
//! # Stores
//!
//! - [`MemoryStore`]: process-local map, for tests and ephemeral gateways
//! - [`FileStore`]: one JSON record per session in a directory

pub mod error;
pub mod file;
pub mod memory;
pub mod meta;
pub mod session;
pub mod store;

pub use error::{Result, SessionError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use meta::GeneratorMeta;
pub use session::{
    ListFilter, NewSession, Pagination, Session, SessionId, SessionPage, SessionUpdate, Turn,
};
pub use store::{SessionStore, SharedSessionStore};
