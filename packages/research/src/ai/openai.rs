//! OpenAI chat-completions implementation of `ToolModel`.
//!
//! # Example
//!
//! ```rust,ignore
//! use research::ai::OpenAiToolModel;
//!
//! let model = OpenAiToolModel::new("sk-...").with_model("gpt-4o");
//! let pipeline = ResearchPipeline::new(store, searcher, fetcher, Arc::new(model));
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ResearchError, Result};
use crate::security::SecretString;
use crate::traits::model::{ChatMessage, ModelRequest, ModelTurn, ToolCall, ToolModel};

/// Tool-calling model backed by the OpenAI chat-completions API.
#[derive(Clone)]
pub struct OpenAiToolModel {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiToolModel {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
        }
    }

    /// Create from environment variables `OPENAI_API_KEY` and (optionally)
    /// `OPENAI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ResearchError::Config("OPENAI_API_KEY not set".into()))?;
        let mut model = Self::new(api_key);
        if let Ok(name) = std::env::var("OPENAI_MODEL") {
            if !name.trim().is_empty() {
                model = model.with_model(name.trim());
            }
        }
        Ok(model)
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the sampling temperature (default: 0).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system,
        })];
        messages.extend(request.messages.iter().map(message_to_openai));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| t.to_openai_format())
                .collect::<Vec<_>>()
                .into();
            body["tool_choice"] = "auto".into();
        }
        body
    }
}

fn message_to_openai(message: &ChatMessage) -> serde_json::Value {
    match message {
        ChatMessage::User { content } => serde_json::json!({
            "role": "user",
            "content": content,
        }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut value = serde_json::json!({
                "role": "assistant",
                "content": content,
            });
            if !tool_calls.is_empty() {
                value["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments }
                        })
                    })
                    .collect::<Vec<_>>()
                    .into();
            }
            value
        }
        ChatMessage::Tool { call_id, content } => serde_json::json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<ResponseMessage> for ModelTurn {
    fn from(message: ResponseMessage) -> Self {
        ModelTurn {
            content: message.content,
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
                .collect(),
        }
    }
}

#[async_trait]
impl ToolModel for OpenAiToolModel {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "OpenAI chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| ResearchError::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResearchError::Model(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::Model(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| ModelTurn::from(c.message))
            .ok_or_else(|| ResearchError::Model("No response from OpenAI".into()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
