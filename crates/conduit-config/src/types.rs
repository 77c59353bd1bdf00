//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [gateway]                # tool-loop budget, default provider
//! [session]                # session store selection
//! [dialect.<backend>]      # option encodings per backend
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use conduit_llm::{Dialect, Encoding, Feature, ThinkingStyle};

use crate::error::{ConfigError, Result};

/// Tool-loop budget used when neither config nor request sets one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub gateway: Option<GatewaySection>,
    pub session: Option<SessionSection>,
    /// Dialect overrides keyed by backend name.
    pub dialect: HashMap<String, DialectSection>,
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: GatewayConfig) {
        if let Some(over) = other.gateway {
            match self.gateway.as_mut() {
                Some(base) => base.merge(over),
                None => self.gateway = Some(over),
            }
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        for (name, section) in other.dialect {
            self.dialect.insert(name, section);
        }
    }

    /// Effective tool-loop budget.
    pub fn max_iterations(&self) -> u32 {
        self.gateway
            .as_ref()
            .and_then(|g| g.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    /// Provider hint applied to requests that name none.
    pub fn default_provider(&self) -> Option<&str> {
        self.gateway
            .as_ref()
            .and_then(|g| g.default_provider.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Session store settings, defaulting to in-memory.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Build every configured dialect.
    pub fn dialects(&self) -> Result<Vec<Dialect>> {
        let mut names: Vec<&String> = self.dialect.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.dialect[name].to_dialect(name))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Section
// ─────────────────────────────────────────────────────────────────────────────

/// `[gateway]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Default tool-loop budget.
    pub max_iterations: Option<u32>,
    /// Provider used when a request has no provider hint.
    pub default_provider: Option<String>,
}

impl GatewaySection {
    fn merge(&mut self, other: GatewaySection) {
        if other.max_iterations.is_some() {
            self.max_iterations = other.max_iterations;
        }
        if other.default_provider.is_some() {
            self.default_provider = other.default_provider;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Section
// ─────────────────────────────────────────────────────────────────────────────

/// Which session store to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

/// `[session]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub store: StoreKind,
    /// Directory for the file store.
    pub path: Option<PathBuf>,
}

impl SessionSection {
    /// Directory for the file store; required when `store = "file"`.
    pub fn file_path(&self) -> Result<PathBuf> {
        self.path.clone().ok_or_else(|| ConfigError::MissingField {
            field: "path".to_string(),
            context: "[session] with store = \"file\"".to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialect Section
// ─────────────────────────────────────────────────────────────────────────────

/// Thinking control as written in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingSetting {
    Budget,
    Toggle,
    Effort,
    Unsupported,
}

/// `[dialect.<backend>]` section.
///
/// Starts from the built-in dialect of the same name when there is one,
/// otherwise from a dialect that accepts every option in standard form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectSection {
    /// Options the backend rejects.
    pub unsupported: Vec<String>,
    /// Options sent as raw fields, option name to field key.
    pub native: HashMap<String, String>,
    pub thinking: Option<ThinkingSetting>,
    /// Field key for `thinking = "effort"`.
    pub thinking_key: Option<String>,
}

impl DialectSection {
    /// Build the dialect for `name`.
    pub fn to_dialect(&self, name: &str) -> Result<Dialect> {
        let mut dialect = Dialect::builtin()
            .into_iter()
            .find(|d| d.name() == name)
            .unwrap_or_else(|| Dialect::standard(name));

        for (option, key) in &self.native {
            dialect = dialect.with(feature(name, option)?, Encoding::Native(key.clone()));
        }
        for option in &self.unsupported {
            dialect = dialect.without(feature(name, option)?);
        }

        if let Some(thinking) = self.thinking {
            let style = match thinking {
                ThinkingSetting::Budget => ThinkingStyle::Budget,
                ThinkingSetting::Toggle => ThinkingStyle::Toggle,
                ThinkingSetting::Effort => ThinkingStyle::Effort(
                    self.thinking_key
                        .clone()
                        .unwrap_or_else(|| "reasoning_effort".to_string()),
                ),
                ThinkingSetting::Unsupported => ThinkingStyle::Unsupported,
            };
            dialect = dialect.with_thinking(style);
        }

        Ok(dialect)
    }
}

fn feature(dialect: &str, option: &str) -> Result<Feature> {
    Feature::from_name(option).ok_or_else(|| ConfigError::InvalidValue {
        field: format!("dialect.{}", dialect),
        message: format!("unknown option '{}'", option),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
