//! Tools for Conduit's tool-calling loop.
//!
//! A [`Toolkit`] holds the tools a conversation may call. When the model asks
//! for several tools at once, [`Toolkit::run_all`] executes them concurrently
//! and returns their results in the order the model asked for them.

pub mod error;
pub mod tool;
pub mod toolkit;

pub use error::{Result, ToolError};
pub use tool::{Tool, ToolContext, ToolOutput};
pub use toolkit::{ToolInfo, Toolkit};

#[cfg(any(test, feature = "testing"))]
pub use tool::MockTool;
