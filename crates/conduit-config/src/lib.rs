//! Configuration for the Conduit gateway.
//!
//! Provides TOML-based configuration with:
//! - The default tool-loop budget and provider hint (`[gateway]`)
//! - Session store selection (`[session]`)
//! - Per-backend option dialects (`[dialect.<name>]`)
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
