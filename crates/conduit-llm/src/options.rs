//! Provider-agnostic generation options and their translation.
//!
//! Most options have no universal encoding: one backend calls it
//! `temperature`, another nests it under `options.temperature`, a third does
//! not support it at all. Callers therefore build options with the generic
//! constructors in this module ([`temperature`], [`system_prompt`], ...), which
//! produce [`GenOption::Deferred`] markers. The [`Translator`] resolves every
//! marker against the target backend's [`Dialect`] and hands the backend a flat
//! [`GenerateOptions`] list of concrete [`Setting`]s.
//!
//! Translation runs in two passes:
//!
//! 1. Apply all options as given. Concrete settings land in the output,
//!    deferred markers are collected.
//! 2. Resolve each marker against the dialect, append the results to the
//!    original option list and apply the combined list again.
//!
//! A marker for a feature the backend does not support fails with
//! [`LlmError::NotImplemented`] naming the backend and the option.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::backend::{StreamCallback, StreamEvent};
use crate::error::{LlmError, Result};
use crate::types::ToolDefinition;

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete, backend-native option value.
#[derive(Clone)]
pub enum Setting {
    SystemPrompt(String),
    Temperature(f64),
    TopK(u32),
    TopP(f64),
    StopSequences(Vec<String>),
    MaxTokens(u32),
    ThinkingBudget(u32),
    Thinking(bool),
    ResponseSchema(Value),
    Tools(Vec<ToolDefinition>),
    Stream(StreamCallback),
    /// A raw field the backend copies into its request body.
    Native { key: String, value: Value },
}

impl std::fmt::Debug for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Setting::SystemPrompt(s) => f.debug_tuple("SystemPrompt").field(s).finish(),
            Setting::Temperature(t) => f.debug_tuple("Temperature").field(t).finish(),
            Setting::TopK(k) => f.debug_tuple("TopK").field(k).finish(),
            Setting::TopP(p) => f.debug_tuple("TopP").field(p).finish(),
            Setting::StopSequences(s) => f.debug_tuple("StopSequences").field(s).finish(),
            Setting::MaxTokens(n) => f.debug_tuple("MaxTokens").field(n).finish(),
            Setting::ThinkingBudget(n) => f.debug_tuple("ThinkingBudget").field(n).finish(),
            Setting::Thinking(b) => f.debug_tuple("Thinking").field(b).finish(),
            Setting::ResponseSchema(v) => f.debug_tuple("ResponseSchema").field(v).finish(),
            Setting::Tools(t) => f
                .debug_tuple("Tools")
                .field(&t.iter().map(|d| d.name.as_str()).collect::<Vec<_>>())
                .finish(),
            Setting::Stream(_) => f.write_str("Stream(<callback>)"),
            Setting::Native { key, value } => f
                .debug_struct("Native")
                .field("key", key)
                .field("value", value)
                .finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

type Resolver = Arc<dyn Fn(&Dialect) -> Result<Vec<GenOption>> + Send + Sync>;

/// An option whose encoding depends on the backend it is sent to.
#[derive(Clone)]
pub struct Deferred {
    option: String,
    resolve: Resolver,
}

impl Deferred {
    /// Name of the option this marker stands for.
    pub fn option(&self) -> &str {
        &self.option
    }

    /// Resolve against a dialect.
    pub fn resolve(&self, dialect: &Dialect) -> Result<Vec<GenOption>> {
        (self.resolve)(dialect)
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("option", &self.option)
            .finish_non_exhaustive()
    }
}

/// A generation option as supplied by a caller.
#[derive(Debug, Clone)]
pub enum GenOption {
    /// Already in backend-native form.
    Concrete(Setting),
    /// Needs the target dialect before it can be encoded.
    Deferred(Deferred),
}

impl GenOption {
    /// Create a deferred option from a resolver function.
    pub fn deferred<F>(option: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Dialect) -> Result<Vec<GenOption>> + Send + Sync + 'static,
    {
        GenOption::Deferred(Deferred {
            option: option.into(),
            resolve: Arc::new(resolve),
        })
    }
}

impl From<Setting> for GenOption {
    fn from(setting: Setting) -> Self {
        GenOption::Concrete(setting)
    }
}

fn lowered(feature: Feature, standard: Setting, value: Value) -> GenOption {
    GenOption::deferred(feature.name(), move |dialect| {
        let setting = dialect.lower(feature, standard.clone(), value.clone())?;
        Ok(vec![GenOption::Concrete(setting)])
    })
}

/// Set the system prompt.
pub fn system_prompt(prompt: impl Into<String>) -> GenOption {
    let prompt = prompt.into();
    let value = Value::String(prompt.clone());
    lowered(Feature::SystemPrompt, Setting::SystemPrompt(prompt), value)
}

/// Set the sampling temperature.
pub fn temperature(t: f64) -> GenOption {
    lowered(Feature::Temperature, Setting::Temperature(t), json!(t))
}

/// Restrict sampling to the top `k` tokens.
pub fn top_k(k: u32) -> GenOption {
    lowered(Feature::TopK, Setting::TopK(k), json!(k))
}

/// Nucleus sampling threshold.
pub fn top_p(p: f64) -> GenOption {
    lowered(Feature::TopP, Setting::TopP(p), json!(p))
}

/// Stop generating at any of these sequences.
pub fn stop_sequences(stops: Vec<String>) -> GenOption {
    let value = json!(stops);
    lowered(Feature::StopSequences, Setting::StopSequences(stops), value)
}

/// Cap the number of generated tokens.
pub fn max_tokens(n: u32) -> GenOption {
    lowered(Feature::MaxTokens, Setting::MaxTokens(n), json!(n))
}

/// Constrain the reply to a JSON schema.
pub fn response_schema(schema: Value) -> GenOption {
    let value = schema.clone();
    lowered(Feature::ResponseSchema, Setting::ResponseSchema(schema), value)
}

/// Offer tools to the model. An empty list is a no-op.
pub fn tools(definitions: Vec<ToolDefinition>) -> GenOption {
    if definitions.is_empty() {
        return GenOption::deferred(Feature::Tools.name(), |_| Ok(Vec::new()));
    }
    let value = json!(definitions);
    lowered(Feature::Tools, Setting::Tools(definitions), value)
}

/// Switch extended thinking on or off.
///
/// Disabling thinking on a backend without it is a no-op; enabling it fails.
pub fn thinking(enabled: bool) -> GenOption {
    GenOption::deferred("thinking", move |dialect| match &dialect.thinking {
        ThinkingStyle::Unsupported if enabled => {
            Err(LlmError::not_implemented(&dialect.name, "thinking"))
        }
        ThinkingStyle::Unsupported => Ok(Vec::new()),
        ThinkingStyle::Budget | ThinkingStyle::Toggle => {
            Ok(vec![Setting::Thinking(enabled).into()])
        }
        ThinkingStyle::Effort(_) if enabled => Ok(Vec::new()),
        ThinkingStyle::Effort(key) => Ok(vec![
            Setting::Native {
                key: key.clone(),
                value: json!("minimal"),
            }
            .into(),
        ]),
    })
}

/// Allow the model this many tokens of reasoning.
///
/// Backends that only toggle thinking get `Thinking(budget > 0)`; effort-level
/// backends get the nearest effort bucket.
pub fn thinking_budget(budget: u32) -> GenOption {
    GenOption::deferred("thinking_budget", move |dialect| match &dialect.thinking {
        ThinkingStyle::Unsupported if budget > 0 => {
            Err(LlmError::not_implemented(&dialect.name, "thinking_budget"))
        }
        ThinkingStyle::Unsupported => Ok(Vec::new()),
        ThinkingStyle::Budget => Ok(vec![Setting::ThinkingBudget(budget).into()]),
        ThinkingStyle::Toggle => Ok(vec![Setting::Thinking(budget > 0).into()]),
        ThinkingStyle::Effort(key) => Ok(vec![
            Setting::Native {
                key: key.clone(),
                value: json!(effort_for_budget(budget)),
            }
            .into(),
        ]),
    })
}

/// Deliver stream events to this callback.
pub fn stream(callback: StreamCallback) -> GenOption {
    Setting::Stream(callback).into()
}

/// Pass a raw field straight through to the backend.
pub fn native(key: impl Into<String>, value: Value) -> GenOption {
    Setting::Native {
        key: key.into(),
        value,
    }
    .into()
}

fn effort_for_budget(budget: u32) -> &'static str {
    match budget {
        0 => "minimal",
        1..=2048 => "low",
        2049..=8192 => "medium",
        _ => "high",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialects
// ─────────────────────────────────────────────────────────────────────────────

/// An option that backends encode differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    SystemPrompt,
    Temperature,
    TopK,
    TopP,
    StopSequences,
    MaxTokens,
    ResponseSchema,
    Tools,
}

impl Feature {
    /// Every feature.
    pub const ALL: [Feature; 8] = [
        Feature::SystemPrompt,
        Feature::Temperature,
        Feature::TopK,
        Feature::TopP,
        Feature::StopSequences,
        Feature::MaxTokens,
        Feature::ResponseSchema,
        Feature::Tools,
    ];

    /// Snake-case option name.
    pub fn name(self) -> &'static str {
        match self {
            Feature::SystemPrompt => "system_prompt",
            Feature::Temperature => "temperature",
            Feature::TopK => "top_k",
            Feature::TopP => "top_p",
            Feature::StopSequences => "stop_sequences",
            Feature::MaxTokens => "max_tokens",
            Feature::ResponseSchema => "response_schema",
            Feature::Tools => "tools",
        }
    }

    /// Parse a snake-case option name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// How a backend encodes one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// The typed [`Setting`] is understood as-is.
    Standard,
    /// Sent as a raw field under this key.
    Native(String),
    /// Not available on this backend.
    Unsupported,
}

/// How a backend controls extended thinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkingStyle {
    /// Token budget.
    Budget,
    /// On/off switch only.
    Toggle,
    /// Effort level (`minimal`/`low`/`medium`/`high`) under this key.
    Effort(String),
    Unsupported,
}

/// Option encodings for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    name: String,
    encodings: HashMap<Feature, Encoding>,
    thinking: ThinkingStyle,
}

impl Dialect {
    /// A dialect that understands every feature in standard form.
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encodings: HashMap::new(),
            thinking: ThinkingStyle::Budget,
        }
    }

    /// Override the encoding of one feature.
    pub fn with(mut self, feature: Feature, encoding: Encoding) -> Self {
        self.encodings.insert(feature, encoding);
        self
    }

    /// Mark a feature unsupported.
    pub fn without(self, feature: Feature) -> Self {
        self.with(feature, Encoding::Unsupported)
    }

    /// Set the thinking style.
    pub fn with_thinking(mut self, style: ThinkingStyle) -> Self {
        self.thinking = style;
        self
    }

    /// Backend name this dialect belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoding of a feature; standard unless overridden.
    pub fn encoding(&self, feature: Feature) -> &Encoding {
        self.encodings.get(&feature).unwrap_or(&Encoding::Standard)
    }

    pub fn thinking(&self) -> &ThinkingStyle {
        &self.thinking
    }

    /// Check whether a feature can be sent at all.
    pub fn supports(&self, feature: Feature) -> bool {
        !matches!(self.encoding(feature), Encoding::Unsupported)
    }

    /// Encode a feature for this backend.
    pub fn lower(&self, feature: Feature, standard: Setting, value: Value) -> Result<Setting> {
        match self.encoding(feature) {
            Encoding::Standard => Ok(standard),
            Encoding::Native(key) => Ok(Setting::Native {
                key: key.clone(),
                value,
            }),
            Encoding::Unsupported => Err(LlmError::not_implemented(&self.name, feature.name())),
        }
    }

    /// Anthropic messages API.
    pub fn anthropic() -> Self {
        Self::standard("anthropic").without(Feature::ResponseSchema)
    }

    /// OpenAI chat completions.
    pub fn openai() -> Self {
        Self::standard("openai")
            .without(Feature::TopK)
            .with(
                Feature::MaxTokens,
                Encoding::Native("max_completion_tokens".to_string()),
            )
            .with_thinking(ThinkingStyle::Effort("reasoning_effort".to_string()))
    }

    /// Google Gemini.
    pub fn gemini() -> Self {
        Self::standard("gemini")
    }

    /// Ollama, which nests sampling parameters under `options`.
    pub fn ollama() -> Self {
        Self::standard("ollama")
            .with(
                Feature::Temperature,
                Encoding::Native("options.temperature".to_string()),
            )
            .with(Feature::TopK, Encoding::Native("options.top_k".to_string()))
            .with(Feature::TopP, Encoding::Native("options.top_p".to_string()))
            .with(
                Feature::StopSequences,
                Encoding::Native("options.stop".to_string()),
            )
            .with(
                Feature::MaxTokens,
                Encoding::Native("options.num_predict".to_string()),
            )
            .with(
                Feature::ResponseSchema,
                Encoding::Native("format".to_string()),
            )
            .with_thinking(ThinkingStyle::Toggle)
    }

    /// Mistral chat completions.
    pub fn mistral() -> Self {
        Self::standard("mistral")
            .without(Feature::TopK)
            .with_thinking(ThinkingStyle::Unsupported)
    }

    /// All built-in dialects.
    pub fn builtin() -> Vec<Dialect> {
        vec![
            Self::anthropic(),
            Self::openai(),
            Self::gemini(),
            Self::ollama(),
            Self::mistral(),
        ]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved Options
// ─────────────────────────────────────────────────────────────────────────────

/// Flat list of concrete settings handed to a backend.
///
/// Accessors return the last value written for each setting.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    settings: Vec<Setting>,
}

impl GenerateOptions {
    /// Apply options, returning the concrete result and any pending markers.
    pub fn apply(options: &[GenOption]) -> (Self, Vec<Deferred>) {
        let mut settings = Vec::new();
        let mut pending = Vec::new();
        for option in options {
            match option {
                GenOption::Concrete(setting) => settings.push(setting.clone()),
                GenOption::Deferred(deferred) => pending.push(deferred.clone()),
            }
        }
        (Self { settings }, pending)
    }

    /// Build from concrete settings.
    pub fn from_settings(settings: Vec<Setting>) -> Self {
        Self { settings }
    }

    /// The settings in application order.
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Convert back into concrete options.
    pub fn into_options(self) -> Vec<GenOption> {
        self.settings.into_iter().map(GenOption::Concrete).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    fn last<'a, T>(&'a self, pick: impl Fn(&'a Setting) -> Option<T>) -> Option<T> {
        self.settings.iter().rev().find_map(pick)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.last(|s| match s {
            Setting::SystemPrompt(p) => Some(p.as_str()),
            _ => None,
        })
    }

    pub fn temperature(&self) -> Option<f64> {
        self.last(|s| match s {
            Setting::Temperature(t) => Some(*t),
            _ => None,
        })
    }

    pub fn top_k(&self) -> Option<u32> {
        self.last(|s| match s {
            Setting::TopK(k) => Some(*k),
            _ => None,
        })
    }

    pub fn top_p(&self) -> Option<f64> {
        self.last(|s| match s {
            Setting::TopP(p) => Some(*p),
            _ => None,
        })
    }

    pub fn stop_sequences(&self) -> Option<&[String]> {
        self.last(|s| match s {
            Setting::StopSequences(stops) => Some(stops.as_slice()),
            _ => None,
        })
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.last(|s| match s {
            Setting::MaxTokens(n) => Some(*n),
            _ => None,
        })
    }

    pub fn thinking(&self) -> Option<bool> {
        self.last(|s| match s {
            Setting::Thinking(b) => Some(*b),
            _ => None,
        })
    }

    pub fn thinking_budget(&self) -> Option<u32> {
        self.last(|s| match s {
            Setting::ThinkingBudget(n) => Some(*n),
            _ => None,
        })
    }

    pub fn response_schema(&self) -> Option<&Value> {
        self.last(|s| match s {
            Setting::ResponseSchema(v) => Some(v),
            _ => None,
        })
    }

    /// Tool definitions offered to the model; empty when none were set.
    pub fn tools(&self) -> &[ToolDefinition] {
        self.last(|s| match s {
            Setting::Tools(t) => Some(t.as_slice()),
            _ => None,
        })
        .unwrap_or(&[])
    }

    pub fn stream(&self) -> Option<&StreamCallback> {
        self.last(|s| match s {
            Setting::Stream(cb) => Some(cb),
            _ => None,
        })
    }

    /// Value of a raw backend field.
    pub fn native(&self, key: &str) -> Option<&Value> {
        self.last(|s| match s {
            Setting::Native { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    /// Send an event to the stream callback, if one is set.
    pub fn emit(&self, event: StreamEvent) {
        if let Some(callback) = self.stream() {
            callback(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Translator
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves deferred options against per-backend dialects.
///
/// Immutable once handed to the gateway; register dialects up front.
#[derive(Debug, Clone)]
pub struct Translator {
    dialects: HashMap<String, Dialect>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    /// A translator that knows the built-in dialects.
    pub fn new() -> Self {
        Self::empty().with_dialects(Dialect::builtin())
    }

    /// A translator that knows no dialects.
    pub fn empty() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Register a dialect, replacing any previous one with the same name.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.register(dialect);
        self
    }

    pub fn with_dialects(mut self, dialects: impl IntoIterator<Item = Dialect>) -> Self {
        for dialect in dialects {
            self.register(dialect);
        }
        self
    }

    /// Register a dialect in place.
    pub fn register(&mut self, dialect: Dialect) {
        self.dialects.insert(dialect.name.clone(), dialect);
    }

    /// Look up the dialect for a backend.
    pub fn dialect(&self, backend: &str) -> Option<&Dialect> {
        self.dialects.get(backend)
    }

    /// Translate options for the named backend.
    pub fn translate(&self, options: &[GenOption], backend: &str) -> Result<GenerateOptions> {
        let (resolved, pending) = GenerateOptions::apply(options);
        if pending.is_empty() {
            return Ok(resolved);
        }

        let Some(dialect) = self.dialect(backend) else {
            return Err(LlmError::not_implemented(backend, pending[0].option()));
        };

        let mut combined: Vec<GenOption> = options.to_vec();
        for deferred in &pending {
            for option in deferred.resolve(dialect)? {
                if let GenOption::Deferred(nested) = &option {
                    return Err(LlmError::Internal(format!(
                        "option '{}' resolved to another deferred option '{}'",
                        deferred.option(),
                        nested.option()
                    )));
                }
                combined.push(option);
            }
        }

        let (resolved, _) = GenerateOptions::apply(&combined);
        tracing::debug!(
            backend,
            deferred = pending.len(),
            settings = resolved.settings.len(),
            "Options translated"
        );
        Ok(resolved)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
