//! OpenRouter comment generator.
//!
//! Sends one chat-completions request per comment. Images are attached only
//! when a vision model is configured; any failure yields the fallback text.

use crate::commenter::{CommentGenerator, CommentRequest, MediaInput};
use crate::config::{Settings, COMMENT_MAX_TOKENS, COMMENT_TEMPERATURE};
use crate::llm::http_utils::{completion_text, completions_url, create_http_client, send_json_request};
use crate::llm::prompt::{build_user_prompt, clean_comment, DEFAULT_PERSONA, FALLBACK_COMMENT};
use crate::llm::LlmError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Comment generator backed by an OpenAI-compatible chat-completions API
pub struct OpenRouterCommenter {
    http_client: HttpClient,
    url: String,
    api_key: Option<String>,
    model: String,
    vision_model: Option<String>,
    persona: String,
}

impl OpenRouterCommenter {
    /// Create a generator for the given endpoint and models.
    #[must_use]
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: String,
        vision_model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client: create_http_client(timeout),
            url: completions_url(api_url),
            api_key: api_key.filter(|key| !key.is_empty()),
            model,
            vision_model: vision_model.filter(|model| !model.is_empty()),
            persona: DEFAULT_PERSONA.to_string(),
        }
    }

    /// Build from application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = Duration::from_secs(crate::config::get_llm_http_timeout_secs());
        let commenter = Self::new(
            &settings.openrouter_api_url,
            settings.openrouter_api_key.clone(),
            settings.model_name.clone(),
            settings.vision_model_name.clone(),
            timeout,
        );
        match settings.system_message.as_deref() {
            Some(persona) if !persona.trim().is_empty() => commenter.with_persona(persona),
            _ => commenter,
        }
    }

    /// Replace the system prompt.
    #[must_use]
    pub fn with_persona(mut self, persona: &str) -> Self {
        self.persona = persona.to_string();
        self
    }

    /// Whether an API key is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Request a completion, without fallback.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` when the key is missing, the request fails, or the
    /// reply holds no usable text.
    pub async fn complete(&self, request: &CommentRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingConfig("OPENROUTER_API_KEY".to_string()))?;

        let body = self.request_body(request);
        debug!(model = %body["model"], "Requesting comment");

        let response = send_json_request(&self.http_client, &self.url, api_key, &body).await?;
        let comment = clean_comment(&completion_text(&response)?);
        if comment.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(comment)
    }

    fn request_body(&self, request: &CommentRequest) -> Value {
        let prompt = build_user_prompt(request);
        let images: Vec<Value> = request
            .media
            .iter()
            .filter_map(|media| match media {
                MediaInput::Image {
                    bytes, mime_type, ..
                } => Some(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{mime_type};base64,{}", BASE64.encode(bytes))}
                })),
                MediaInput::Description(_) => None,
            })
            .collect();

        let (model, user_content) = match &self.vision_model {
            Some(vision_model) if !images.is_empty() => {
                let mut parts = vec![json!({"type": "text", "text": prompt})];
                parts.extend(images);
                (vision_model.as_str(), Value::Array(parts))
            }
            _ => (self.model.as_str(), Value::String(prompt)),
        };

        json!({
            "model": model,
            "messages": [
                {"role": "system", "content": self.persona},
                {"role": "user", "content": user_content}
            ],
            "max_tokens": COMMENT_MAX_TOKENS,
            "temperature": COMMENT_TEMPERATURE
        })
    }
}

#[async_trait]
impl CommentGenerator for OpenRouterCommenter {
    async fn generate(&self, request: CommentRequest) -> String {
        match self.complete(&request).await {
            Ok(comment) => comment,
            Err(e) => {
                warn!("Comment generation failed, using fallback: {e}");
                FALLBACK_COMMENT.to_string()
            }
        }
    }

    fn accepts_images(&self) -> bool {
        self.vision_model.is_some()
    }
}
