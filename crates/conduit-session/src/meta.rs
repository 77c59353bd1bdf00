//! Generator configuration attached to sessions and requests.

use serde::{Deserialize, Serialize};

/// Provider, model and generation settings for a session or a single call.
///
/// Empty strings, zero budgets and `None` mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorMeta {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// JSON Schema the final answer must follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    /// Tri-state: unset, explicitly on, explicitly off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
    #[serde(default)]
    pub thinking_budget: u32,
}

impl GeneratorMeta {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_response_format(mut self, schema: serde_json::Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.thinking = Some(enabled);
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = budget;
        self
    }

    /// Combine session settings with per-request overrides.
    ///
    /// Set request fields win, except the system prompt: a request prompt
    /// is appended after the session prompt.
    pub fn merge(&self, request: &GeneratorMeta) -> GeneratorMeta {
        let mut merged = self.overlay(request);
        merged.system_prompt = match (self.system_prompt.is_empty(), request.system_prompt.is_empty()) {
            (_, true) => self.system_prompt.clone(),
            (true, false) => request.system_prompt.clone(),
            (false, false) => format!("{}\n\n{}", self.system_prompt, request.system_prompt),
        };
        merged
    }

    /// Replace every field that is set in `update`.
    pub fn overlay(&self, update: &GeneratorMeta) -> GeneratorMeta {
        fn pick(base: &str, over: &str) -> String {
            let chosen = if over.is_empty() { base } else { over };
            chosen.to_string()
        }

        GeneratorMeta {
            provider: pick(&self.provider, &update.provider),
            model: pick(&self.model, &update.model),
            system_prompt: pick(&self.system_prompt, &update.system_prompt),
            response_format: update
                .response_format
                .clone()
                .or_else(|| self.response_format.clone()),
            thinking: update.thinking.or(self.thinking),
            thinking_budget: if update.thinking_budget > 0 {
                update.thinking_budget
            } else {
                self.thinking_budget
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overrides_set_fields() {
        let session = GeneratorMeta::new("small")
            .with_provider("openai")
            .with_thinking_budget(1024);
        let request = GeneratorMeta::new("large").with_thinking(true);

        let merged = session.merge(&request);
        assert_eq!(merged.provider, "openai");
        assert_eq!(merged.model, "large");
        assert_eq!(merged.thinking, Some(true));
        assert_eq!(merged.thinking_budget, 1024);
    }

    #[test]
    fn test_merge_concatenates_system_prompt() {
        let session = GeneratorMeta::default().with_system_prompt("Be terse.");
        let request = GeneratorMeta::default().with_system_prompt("Answer in French.");

        let merged = session.merge(&request);
        assert_eq!(merged.system_prompt, "Be terse.\n\nAnswer in French.");

        let only_request = GeneratorMeta::default().merge(&request);
        assert_eq!(only_request.system_prompt, "Answer in French.");

        let only_session = session.merge(&GeneratorMeta::default());
        assert_eq!(only_session.system_prompt, "Be terse.");
    }

    #[test]
    fn test_overlay_replaces_system_prompt() {
        let base = GeneratorMeta::default().with_system_prompt("old");
        let updated = base.overlay(&GeneratorMeta::default().with_system_prompt("new"));
        assert_eq!(updated.system_prompt, "new");
    }

    #[test]
    fn test_thinking_can_be_switched_off() {
        let session = GeneratorMeta::default().with_thinking(true);
        let merged = session.merge(&GeneratorMeta::default().with_thinking(false));
        assert_eq!(merged.thinking, Some(false));
    }

    #[test]
    fn test_response_format_override() {
        let session = GeneratorMeta::default().with_response_format(json!({"type": "object"}));
        let merged = session.merge(&GeneratorMeta::default());
        assert_eq!(merged.response_format, Some(json!({"type": "object"})));

        let replaced = session.merge(
            &GeneratorMeta::default().with_response_format(json!({"type": "array"})),
        );
        assert_eq!(replaced.response_format, Some(json!({"type": "array"})));
    }
}
