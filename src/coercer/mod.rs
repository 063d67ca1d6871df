//! JSON Coercer (spec.md §4.3): turns LLM free-text into a structured,
//! schema-checked record, self-correcting over up to `maxAttempts`
//! retries.
//!
//! Grounded directly on the teacher's `ai/grok/utils.rs::extract_json_object`
//! (strip markdown fences / find the outermost `{...}`), generalized into
//! a schema-driven retry loop that accumulates `{attempt, rawText, error}`
//! history and re-prompts — mirroring how
//! `ai/grok/orchestrator.rs::parse_plan_response` parses-then-fails-with-context,
//! but looped per spec.md's retry policy instead of failing immediately.

use std::time::Duration;

use serde_json::Value;

use crate::error::{CoerceAttempt, CoerceError, CoerceFailed};
use crate::provider::ChatProvider;

/// A schema required by a pipeline sub-step: the set of fields that must
/// be present (and, where practical, the primitive JSON type they must
/// have) for a coerced record to be accepted. Per spec.md §4.3, schemas
/// are component-specific (basic, categorization, metadata, organization,
/// template-selection, folder-selection, single-call).
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    pub required_string_fields: &'static [&'static str],
    pub required_array_fields: &'static [&'static str],
}

impl Schema {
    /// Validate presence and primitive type of each required field
    /// in-place on a parsed JSON object.
    fn validate(&self, value: &Value) -> Result<(), String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "top-level JSON value is not an object".to_string())?;

        for field in self.required_string_fields {
            match obj.get(*field) {
                Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(format!(
                        "field {} must be a string, got {}",
                        field,
                        type_name(other)
                    ))
                }
                None => return Err(format!("missing required field: {}", field)),
            }
        }

        for field in self.required_array_fields {
            match obj.get(*field) {
                Some(Value::Array(_)) => {}
                Some(other) => {
                    return Err(format!(
                        "field {} must be an array, got {}",
                        field,
                        type_name(other)
                    ))
                }
                None => return Err(format!("missing required field: {}", field)),
            }
        }

        Ok(())
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extra constraint a schema can't express structurally: e.g.
/// "`selectedTemplateId` must be one of these known ids" (spec.md §4.4
/// step 5) or "`selectedFolderPath` must be in the enforced folder list"
/// (step 6). Applied after structural validation succeeds.
pub type SemanticCheck<'a> = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync + 'a>;

/// Strip leading/trailing non-JSON text (markdown fences, prose); find
/// the outermost `{ ... }` span. Grounded on
/// `ai/grok/utils.rs::extract_json_object`.
pub fn extract_json_object(text: &str) -> Result<String, String> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Ok(text[json_start..json_start + end].trim().to_string());
        }
    }

    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        let content_start = text[block_start..]
            .find('\n')
            .map(|i| block_start + i + 1)
            .unwrap_or(block_start);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim().to_string());
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return Ok(text[start..=end].to_string());
            }
        }
    }

    Err("no JSON object found in response".to_string())
}

/// Default retry budget and pause (spec.md §4.3).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Drives the provider with a self-correcting retry loop: on failure,
/// the original prompt is re-emitted with the accumulated attempt
/// history appended under a "previous attempts failed" section, per
/// spec.md §4.3 step 3.
pub struct JsonCoercer<'a> {
    pub max_attempts: u32,
    pub retry_pause: Duration,
    pub semantic_check: Option<SemanticCheck<'a>>,
}

impl<'a> Default for JsonCoercer<'a> {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_pause: DEFAULT_RETRY_PAUSE,
            semantic_check: None,
        }
    }
}

impl<'a> JsonCoercer<'a> {
    pub fn with_semantic_check(mut self, check: SemanticCheck<'a>) -> Self {
        self.semantic_check = Some(check);
        self
    }

    /// Run the coercion loop: call the provider with `prompt`, attempt to
    /// parse+validate its response against `schema`; on failure, re-call
    /// with accumulated history until `max_attempts` is exhausted.
    ///
    /// A `ProviderError` (transport, auth, server, prompt-too-large) is
    /// never retried by the coercer (spec.md §7): it is the only caller
    /// of `provider.chat()` on this path, so it propagates the error kind
    /// straight through rather than folding it into the content-shape
    /// `CoerceFailed` history.
    pub async fn coerce(
        &self,
        provider: &dyn ChatProvider,
        prompt: &str,
        schema: &Schema,
    ) -> Result<Value, CoerceError> {
        let mut attempts: Vec<CoerceAttempt> = Vec::new();
        let mut current_prompt = prompt.to_string();

        for attempt_num in 1..=self.max_attempts {
            let raw_text = provider.chat(&current_prompt).await?;

            match self.try_parse(&raw_text, schema) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempts.push(CoerceAttempt {
                        attempt: attempt_num,
                        raw_text: raw_text.clone(),
                        error: error.clone(),
                    });

                    if attempt_num < self.max_attempts {
                        current_prompt = Self::build_retry_prompt(prompt, &attempts);
                        tokio::time::sleep(self.retry_pause).await;
                    }
                }
            }
        }

        Err(CoerceError::Failed(CoerceFailed { attempts }))
    }

    fn try_parse(&self, raw_text: &str, schema: &Schema) -> Result<Value, String> {
        let json_text = extract_json_object(raw_text)?;
        let value: Value = serde_json::from_str(&json_text).map_err(|e| e.to_string())?;
        schema.validate(&value)?;
        if let Some(check) = &self.semantic_check {
            check(&value)?;
        }
        Ok(value)
    }

    fn build_retry_prompt(original_prompt: &str, attempts: &[CoerceAttempt]) -> String {
        let mut history = String::from("\n\n--- previous attempts failed ---\n");
        for attempt in attempts {
            history.push_str(&format!(
                "attempt {}: error: {}\nraw response: {}\n\n",
                attempt.attempt, attempt.error, attempt.raw_text
            ));
        }
        history.push_str(
            "Fix the specific issues listed above and respond again with ONLY a valid JSON object matching the required schema.",
        );
        format!("{}{}", original_prompt, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::ProviderError;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("no more scripted responses");
            }
            Ok(responses.remove(0))
        }

        fn variant_name(&self) -> &'static str {
            "test"
        }
    }

    fn basic_schema() -> Schema {
        Schema {
            name: "basic",
            required_string_fields: &["title", "summary"],
            required_array_fields: &[],
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_clean_response() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![r#"{"title":"A","summary":"B"}"#.to_string()]),
            calls: AtomicUsize::new(0),
        };
        let coercer = JsonCoercer::default();
        let value = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap();
        assert_eq!(value["title"], "A");
    }

    #[tokio::test]
    async fn strips_markdown_fence() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec!["```json\n{\"title\":\"A\",\"summary\":\"B\"}\n```".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let coercer = JsonCoercer::default();
        let value = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap();
        assert_eq!(value["summary"], "B");
    }

    #[tokio::test]
    async fn retries_then_succeeds_with_accumulated_history() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![
                "not json at all".to_string(),
                r#"{"title":"A"}"#.to_string(), // missing summary
                r#"{"title":"A","summary":"B"}"#.to_string(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let mut coercer = JsonCoercer::default();
        coercer.retry_pause = Duration::from_millis(1);
        let value = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap();
        assert_eq!(value["title"], "A");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let responses: Vec<String> = (0..3).map(|_| "garbage".to_string()).collect();
        let provider = ScriptedProvider {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        };
        let coercer = JsonCoercer {
            max_attempts: 3,
            retry_pause: Duration::from_millis(1),
            semantic_check: None,
        };
        let err = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap_err();
        match err {
            CoerceError::Failed(failed) => assert_eq!(failed.attempts.len(), 3),
            CoerceError::Provider(_) => panic!("expected a content-shape failure, not a provider error"),
        }
    }

    #[tokio::test]
    async fn semantic_check_rejects_disallowed_value() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![r#"{"title":"A","summary":"B"}"#.to_string()]),
            calls: AtomicUsize::new(0),
        };
        let coercer = JsonCoercer {
            max_attempts: 1,
            retry_pause: Duration::from_millis(1),
            semantic_check: Some(Box::new(|_v| Err("not allowed".to_string()))),
        };
        let err = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap_err();
        match err {
            CoerceError::Failed(failed) => assert_eq!(failed.attempts.len(), 1),
            CoerceError::Provider(_) => panic!("expected a content-shape failure, not a provider error"),
        }
    }

    /// Spec.md §4.2/§7: a transport/auth/server error from the provider
    /// must surface as its own `ProviderError` kind, never folded into a
    /// `CoerceFailed` attempt history.
    #[tokio::test]
    async fn provider_error_propagates_distinctly_without_retry() {
        struct FailingProvider {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl ChatProvider for FailingProvider {
            async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Auth {
                    variant: "test".to_string(),
                    reason: "bad key".to_string(),
                })
            }
            fn variant_name(&self) -> &'static str {
                "test"
            }
        }

        let provider = FailingProvider { calls: AtomicUsize::new(0) };
        let coercer = JsonCoercer::default();
        let err = coercer.coerce(&provider, "prompt", &basic_schema()).await.unwrap_err();
        assert!(matches!(err, CoerceError::Provider(ProviderError::Auth { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1, "must not retry a provider error");
    }
}
