//! Session records and the request types that create, update and list them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conduit_llm::{Conversation, Message};

use crate::error::{Result, SessionError};
use crate::meta::GeneratorMeta;

// ─────────────────────────────────────────────────────────────────────────────
// Session Id
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SessionError::BadParameter(format!("invalid session id '{}': {}", s, e)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted conversation with its generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub meta: GeneratorMeta,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub messages: Conversation,
    /// Input tokens not attributable to any stored message.
    #[serde(default)]
    pub overhead: u32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(meta: GeneratorMeta) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            meta,
            name: String::new(),
            labels: BTreeMap::new(),
            messages: Conversation::new(),
            overhead: 0,
            created: now,
            modified: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Append a message.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Current conversation length, for a later [`Session::rollback`].
    pub fn snapshot(&self) -> usize {
        self.messages.len()
    }

    /// Discard every message appended since `snapshot`.
    pub fn rollback(&mut self, snapshot: usize) {
        self.messages.truncate(snapshot);
    }

    /// Record the overhead implied by a backend's reported input tokens.
    ///
    /// The last message is the reply to that input, so it is excluded.
    /// Overhead is only updated when the input exceeds the remaining
    /// message tokens; returns the new value when it was.
    pub fn record_overhead(&mut self, input_tokens: u32) -> Option<u32> {
        let last = self.messages.last().map(|m| m.tokens).unwrap_or(0);
        let base = self.messages.tokens().saturating_sub(last);
        if input_tokens > base {
            self.overhead = input_tokens - base;
            Some(self.overhead)
        } else {
            None
        }
    }

    /// Mark the session modified now.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    /// Append a finished turn and refresh overhead and the modified time.
    pub fn apply_turn(&mut self, turn: Turn) -> Option<u32> {
        for message in turn.messages {
            self.append(message);
        }
        self.touch();
        self.record_overhead(turn.input_tokens)
    }
}

/// The messages one chat produced, applied to the stored session in a
/// single step so concurrent metadata updates are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub messages: Vec<Message>,
    /// Input tokens the backend reported for the turn's final call.
    pub input_tokens: u32,
}

impl Turn {
    pub fn new(messages: Vec<Message>, input_tokens: u32) -> Self {
        Self {
            messages,
            input_tokens,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for creating a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub meta: GeneratorMeta,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NewSession {
    pub fn new(meta: GeneratorMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Build the session record.
    pub fn into_session(self) -> Session {
        Session::new(self.meta)
            .with_name(self.name)
            .with_labels(self.labels)
    }
}

/// A partial update to a session.
///
/// Set fields replace stored ones. A label with an empty value removes
/// that label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default)]
    pub meta: GeneratorMeta,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, meta: GeneratorMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Apply to a session in place and mark it modified.
    pub fn apply(&self, session: &mut Session) {
        session.meta = session.meta.overlay(&self.meta);
        if !self.name.is_empty() {
            session.name = self.name.clone();
        }
        for (key, value) in &self.labels {
            if value.is_empty() {
                session.labels.remove(key);
            } else {
                session.labels.insert(key.clone(), value.clone());
            }
        }
        session.touch();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────────────────────────

/// Which sessions to list. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Every label here must be present with the same value.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ListFilter {
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Check if a session passes this filter.
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(ref provider) = self.provider
            && session.meta.provider != *provider
        {
            return false;
        }
        if let Some(ref model) = self.model
            && session.meta.model != *model
        {
            return false;
        }
        self.labels
            .iter()
            .all(|(k, v)| session.labels.get(k) == Some(v))
    }
}

/// Offset/limit pagination. A `limit` of `None` returns everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Slice a page out of `items`.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// One page of sessions plus the number that matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: usize,
}

impl SessionPage {
    /// Filter, order newest first and paginate.
    pub fn build(
        sessions: impl IntoIterator<Item = Session>,
        filter: &ListFilter,
        pagination: Pagination,
    ) -> Self {
        let mut matched: Vec<Session> = sessions
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        matched.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));
        let total = matched.len();
        Self {
            sessions: pagination.page(matched),
            total,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conduit_llm::{ContentBlock, ToolCall, ToolResult};
    use serde_json::json;

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(matches!(
            SessionId::parse("not-a-uuid"),
            Err(SessionError::BadParameter(_))
        ));
    }

    #[test]
    fn test_snapshot_and_rollback() {
        let mut session = Session::new(GeneratorMeta::new("m"));
        session.append(Message::user("one"));
        let snapshot = session.snapshot();

        session.append(Message::user("two"));
        session.append(Message::assistant("three"));
        session.rollback(snapshot);

        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages.messages()[0].text(), "one");
    }

    #[test]
    fn test_overhead_only_when_input_exceeds_messages() {
        let mut session = Session::new(GeneratorMeta::new("m"));
        session.append(Message::user("hi").with_tokens(10));
        session.append(Message::assistant("hello").with_tokens(5));

        assert_eq!(session.record_overhead(25), Some(15));
        assert_eq!(session.overhead, 15);

        assert_eq!(session.record_overhead(8), None);
        assert_eq!(session.overhead, 15);
    }

    #[test]
    fn test_apply_turn_keeps_metadata() {
        let mut session = Session::new(GeneratorMeta::new("m")).with_name("kept");
        session.append(Message::user("earlier").with_tokens(4));
        let before = session.modified;

        let overhead = session.apply_turn(Turn::new(
            vec![
                Message::user("hi").with_tokens(2),
                Message::assistant("hello").with_tokens(3),
            ],
            10,
        ));

        assert_eq!(overhead, Some(4));
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.name, "kept");
        assert!(session.modified >= before);
    }

    #[test]
    fn test_update_labels_and_name() {
        let mut session = NewSession::new(GeneratorMeta::new("m").with_provider("p"))
            .with_name("first")
            .with_label("team", "infra")
            .with_label("env", "dev")
            .into_session();
        let before = session.modified;

        SessionUpdate::new()
            .with_label("env", "")
            .with_label("owner", "sam")
            .apply(&mut session);

        assert_eq!(session.name, "first");
        assert_eq!(session.labels.get("team").map(String::as_str), Some("infra"));
        assert!(!session.labels.contains_key("env"));
        assert_eq!(session.labels.get("owner").map(String::as_str), Some("sam"));
        assert_eq!(session.meta.provider, "p");
        assert!(session.modified >= before);
    }

    #[test]
    fn test_list_filter() {
        let session = NewSession::new(GeneratorMeta::new("m1").with_provider("p1"))
            .with_label("team", "infra")
            .into_session();

        assert!(ListFilter::default().matches(&session));
        assert!(ListFilter::default().with_label("team", "infra").matches(&session));
        assert!(!ListFilter::default().with_label("team", "web").matches(&session));
        assert!(ListFilter::default().with_provider("p1").with_model("m1").matches(&session));
        assert!(!ListFilter::default().with_model("m2").matches(&session));
    }

    #[test]
    fn test_page_orders_newest_first() {
        let base = Utc::now();
        let sessions: Vec<Session> = (0..5)
            .map(|i| {
                let mut s = Session::new(GeneratorMeta::new("m")).with_name(format!("s{i}"));
                s.modified = base + Duration::seconds(i);
                s
            })
            .collect();

        let page = SessionPage::build(sessions, &ListFilter::default(), Pagination::new(1, 2));
        assert_eq!(page.total, 5);
        let names: Vec<&str> = page.sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s3", "s2"]);
    }

    #[test]
    fn test_session_json_round_trip() {
        let mut session = NewSession::new(
            GeneratorMeta::new("m")
                .with_provider("p")
                .with_system_prompt("sys")
                .with_response_format(json!({"type": "object"}))
                .with_thinking(false)
                .with_thinking_budget(512),
        )
        .with_name("named")
        .with_label("k", "v")
        .into_session();
        session.append(Message::user("q").with_tokens(1));
        session.append(Message::tool_calls(vec![ToolCall::new("c", "t", json!({"a": 1}))]));
        session.append(Message::tool_results(vec![ToolResult::error("c", "t", "x")]));
        session.append(Message::new(
            conduit_llm::Role::Assistant,
            vec![ContentBlock::text("done")],
        ));
        session.overhead = 42;

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }
}
