//! Chat Provider capability (spec.md §4.2): a single abstract
//! `chat(prompt) -> text` operation with an optional `vision` capability,
//! implemented once for all five wire-compatible variants.
//!
//! Grounded on the teacher's `ai/grok/orchestrator.rs::send_text_request`
//! (`reqwest::Client`, bearer auth, OpenAI-chat-completions-shaped JSON
//! body) and `ai/client.rs::AnthropicClient`'s request/response plumbing,
//! generalized across `ProviderVariant` instead of being Grok-specific.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, ProviderVariant};
use crate::error::ProviderError;

/// The single capability the Organization Pipeline depends on. The
/// pipeline never branches on variant — differences (API key, base URL,
/// model name) are resolved once at provider construction (spec.md
/// §4.2).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send `prompt` and return the raw model response text. Responses
    /// are treated as opaque text; the provider does NOT parse JSON.
    async fn chat(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Optional: caption/describe an image. Variants that don't support
    /// vision return `VisionUnsupported`.
    async fn vision(&self, _image_bytes: &[u8], _mime: &str, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::VisionUnsupported {
            variant: self.variant_name().to_string(),
        })
    }

    fn variant_name(&self) -> &'static str;
}

/// Variants known to advertise image-capable chat completions. `ollama`
/// and `lmstudio` depend on whichever local model is loaded; the core
/// does not attempt to introspect that, so they are treated as
/// vision-unsupported by default.
fn supports_vision(variant: ProviderVariant) -> bool {
    matches!(variant, ProviderVariant::OpenAi | ProviderVariant::Grok)
}

/// Concrete `ChatProvider` for the OpenAI-chat-completions-API wire shape
/// shared by all five variants (spec.md §4.2).
pub struct HttpChatProvider {
    client: reqwest::Client,
    variant: ProviderVariant,
    base_url: String,
    model: String,
    api_key: Option<String>,
    char_cap: usize,
}

impl HttpChatProvider {
    pub fn new(config: &Config) -> Self {
        let variant = config.provider;
        Self {
            client: reqwest::Client::new(),
            variant,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| variant.default_base_url().to_string()),
            model: config.model.clone(),
            api_key: config.api_key_for(variant),
            char_cap: variant.prompt_char_cap(),
        }
    }

    fn check_size(&self, prompt: &str) -> Result<(), ProviderError> {
        if prompt.chars().count() > self.char_cap {
            return Err(ProviderError::PromptTooLarge {
                variant: self.variant.as_str().to_string(),
                chars: prompt.chars().count(),
                limit: self.char_cap,
            });
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn chat(&self, prompt: &str) -> Result<String, ProviderError> {
        self.check_size(prompt)?;

        let api_key = self.api_key.clone().unwrap_or_default();
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|source| ProviderError::Network {
            variant: self.variant.as_str().to_string(),
            source,
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                variant: self.variant.as_str().to_string(),
                reason: body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Server {
                variant: self.variant.as_str().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|source| ProviderError::Network {
            variant: self.variant.as_str().to_string(),
            source,
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Server {
                variant: self.variant.as_str().to_string(),
                status: status.as_u16(),
                body: "no choices in response".to_string(),
            })
    }

    async fn vision(&self, image_bytes: &[u8], mime: &str, prompt: &str) -> Result<String, ProviderError> {
        if !supports_vision(self.variant) {
            return Err(ProviderError::VisionUnsupported {
                variant: self.variant.as_str().to_string(),
            });
        }
        self.check_size(prompt)?;

        let encoded = STANDARD.encode(image_bytes);
        let data_url = format!("data:{};base64,{}", mime, encoded);
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ]
            }],
            "temperature": 0.2,
        });

        let api_key = self.api_key.clone().unwrap_or_default();
        let mut request = self.client.post(self.endpoint()).json(&body);
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|source| ProviderError::Network {
            variant: self.variant.as_str().to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Server {
                variant: self.variant.as_str().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|source| ProviderError::Network {
            variant: self.variant.as_str().to_string(),
            source,
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Server {
                variant: self.variant.as_str().to_string(),
                status: status.as_u16(),
                body: "no choices in response".to_string(),
            })
    }

    fn variant_name(&self) -> &'static str {
        self.variant.as_str()
    }
}
