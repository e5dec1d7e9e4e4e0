use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use rolerag_core::config::GenerationSettings;
use rolerag_core::traits::Generator;
use rolerag_core::types::{Generation, GenerationRequest};
use rolerag_core::{Error, Result};

use crate::prompt::{build_messages, parse_generation};

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Groq by
/// default).
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    /// Reads the API key from the environment variable named by
    /// `settings.api_key_env`. A missing key is an initialization failure.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::init("generation service", format!("environment variable {} is not set", settings.api_key_env))
            })?;
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(settings: &GenerationSettings, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::init("generation service", e))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn transport_error(e: &reqwest::Error) -> Error {
    Error::Generation {
        message: e.to_string(),
        retryable: e.is_timeout() || e.is_connect() || e.is_request(),
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    Error::Generation {
        message: format!("chat completion returned {status}: {body}"),
        retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": build_messages(&request.question, &request.context),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        debug!(model = %self.model, passages = request.context.len(), "requesting completion");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            warn!(%status, "chat completion failed");
            return Err(status_error(status, &text));
        }

        let payload: ChatResponse = res.json().await.map_err(|e| Error::Generation {
            message: format!("unreadable chat completion: {e}"),
            retryable: false,
        })?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Generation { message: "chat completion had no content".into(), retryable: true })?;
        Ok(parse_generation(&content))
    }
}
