//! The tool-calling contract a language model must honor.
//!
//! The pipeline never talks to a provider directly. It hands a
//! `ModelRequest` (system prompt, history, tool definitions) to a
//! `ToolModel` and gets back one `ModelTurn`: optional assistant text plus
//! zero or more tool calls. Everything about transports, retries and
//! token accounting lives behind this trait.

use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON schema for the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Build a definition whose schema is generated from the argument type.
    pub fn for_args<T: JsonSchema>(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: args_schema::<T>(),
        }
    }

    /// Convert to the OpenAI `tools` array format.
    pub fn to_openai_format(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// Generate an inlined argument schema with closed objects.
fn args_schema<T: JsonSchema>() -> serde_json::Value {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
        map.remove("definitions");
    }
    close_objects(&mut value);
    value
}

/// Add `additionalProperties: false` to every object schema.
fn close_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
            }
            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                close_objects(item);
            }
        }
        _ => {}
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider id used to pair the call with its result
    pub id: String,
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Create a tool call from a JSON value of arguments.
    pub fn with_json(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::new(id, name, arguments.to_string())
    }

    /// Parse arguments into a typed struct.
    pub fn parse_args<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        let raw = if self.arguments.trim().is_empty() {
            "{}"
        } else {
            self.arguments.as_str()
        };
        serde_json::from_str(raw)
    }
}

/// One message of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl ChatMessage {
    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// A tool result message.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// Echo a model turn back into history.
    pub fn from_turn(turn: &ModelTurn) -> Self {
        Self::Assistant {
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.clone(),
        }
    }
}

/// Everything the model sees for one turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Text of the first user message (handy for routing in mocks).
    pub fn first_user_message(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match m {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Number of tool results already in the history.
    pub fn tool_result_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, ChatMessage::Tool { .. }))
            .count()
    }
}

/// The model's answer for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    /// A plain text answer without tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A turn consisting of tool calls.
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// A language model that supports tool calling.
#[async_trait]
pub trait ToolModel: Send + Sync {
    /// Produce the next turn for the given request.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn>;

    /// Name for logging.
    fn name(&self) -> &str {
        "model"
    }
}

#[async_trait]
impl<T: ToolModel + ?Sized> ToolModel for Arc<T> {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Span {
        start: usize,
        end: usize,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct EchoArgs {
        message: String,
        spans: Vec<Span>,
    }

    #[test]
    fn test_definition_schema_is_inlined_and_closed() {
        let def = ToolDefinition::for_args::<EchoArgs>("echo", "Echo back");
        let schema = serde_json::to_string(&def.parameters).unwrap();

        assert!(!schema.contains("$ref"));
        assert!(!schema.contains("$schema"));
        assert_eq!(def.parameters["additionalProperties"], false);
        assert_eq!(
            def.parameters["properties"]["spans"]["items"]["additionalProperties"],
            false
        );
    }

    #[test]
    fn test_openai_format() {
        let def = ToolDefinition::for_args::<EchoArgs>("echo", "Echo back");
        let value = def.to_openai_format();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "echo");
    }

    #[test]
    fn test_parse_args_accepts_empty_arguments() {
        #[derive(Deserialize, Default)]
        struct NoArgs {}
        let call = ToolCall::new("1", "noop", "");
        assert!(call.parse_args::<NoArgs>().is_ok());
    }
}
