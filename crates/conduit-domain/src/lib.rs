//! Generation orchestration for Conduit.
//!
//! The [`Gateway`] is the single entry point transport layers call. It owns:
//!
//! - a [`ProviderRegistry`] of backends, fixed at construction
//! - a [`ModelResolver`] that finds the backend serving a model name
//! - the option translator that encodes generic options per backend
//! - a session store and the toolkit offered to chats
//!
//! ```text
//! ask  ─► resolve ─► translate ─► Generator::without_session
//! chat ─► load session ─► resolve ─► translate ─► tool loop ─► persist
//! ```

pub mod chat;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod request;
pub mod store;

pub use chat::OUTPUT_TOOL;
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use registry::{ModelResolver, ProviderRegistry};
pub use request::{
    AskRequest, AskResponse, ChatRequest, ChatResponse, ChatTarget, EmbedRequest, EmbedResponse,
    ModelPage,
};
pub use store::open_store;
