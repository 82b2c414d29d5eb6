use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vendedor_core::config::LlmConfig;
use vendedor_core::domain::conversation::Role;

use crate::llm::{GenerationError, GenerationRequest, TextGenerator};

/// Chat-completions client for OpenAI and API-compatible servers (Ollama, vLLM).
pub struct OpenAiGenerator {
    client: Client,
    api_key: Option<SecretString>,
    completions_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let base_url = config.effective_base_url().ok_or(GenerationError::Disabled)?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| GenerationError::Network(error.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout(),
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage { role: "system", content: &request.system_prompt });
        messages.extend(request.history.iter().map(|turn| ChatMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &turn.text,
        }));
        messages.push(ChatMessage { role: "user", content: &request.user_text });

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn status_error(status: StatusCode, body: String) -> GenerationError {
    match status.as_u16() {
        401 | 403 => GenerationError::Authentication,
        429 => GenerationError::RateLimited,
        500..=599 => GenerationError::Unavailable(format!("server error {status}: {body}")),
        _ => GenerationError::InvalidResponse(format!("unexpected status {status}: {body}")),
    }
}

fn first_choice(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|error| GenerationError::InvalidResponse(error.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_owned()))
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut call = self.client.post(&self.completions_url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key.expose_secret());
        }

        let response = call.send().await.map_err(|error| {
            if error.is_timeout() {
                GenerationError::Timeout { timeout_secs: self.timeout.as_secs() }
            } else {
                GenerationError::Network(error.to_string())
            }
        })?;

        let status = response.status();
        let body =
            response.text().await.map_err(|error| GenerationError::Network(error.to_string()))?;
        debug!(
            event_name = "llm.completion.received",
            status = status.as_u16(),
            bytes = body.len(),
            model = %self.model,
            "chat completion response received"
        );
        if !status.is_success() {
            return Err(status_error(status, body));
        }
        first_choice(&body)
    }
}
