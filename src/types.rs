//! Core data types used throughout courtside.
//!
//! This module defines the conversation messages, tool schemas, tool
//! invocation/result structures and the request/response formats that flow
//! between the orchestrator, the LLM providers and the tool registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// --- Message Roles ---

/// The role of a message in the LLM transcript.
///
/// - `System`: instructions to the model
/// - `User`: the human's input (or a prompt we inject on their behalf)
/// - `Model`: the model's reply
/// - `Tool`: the result of a tool execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Model,
    Tool,
}

// --- Conversation history ---

/// A message of the caller-visible conversation history.
///
/// The role is kept as free text because callers may send "assistant",
/// "model", "user" or anything else; see [`ConversationMessage::speaker`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            content: content.into(),
        }
    }

    /// Normalize the free-text role: "model"/"assistant" speak for the
    /// model, every other role is treated as the user.
    pub fn speaker(&self) -> Role {
        match self.role.trim().to_lowercase().as_str() {
            "model" | "assistant" => Role::Model,
            _ => Role::User,
        }
    }
}

// --- Tool Schema ---

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

/// One parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// Describes a tool's interface to the LLM.
///
/// `source_id` is the label reported back to the caller in `sources`
/// whenever the tool contributed to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub source_id: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source_id: source_id.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn required(mut self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional(mut self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
        });
        self
    }

    /// Render the parameters as a JSON Schema object.
    ///
    /// Returns `None` for parameterless tools: some providers reject an
    /// object schema with no properties.
    pub fn parameters_json_schema(&self) -> Option<Value> {
        if self.parameters.is_empty() {
            return None;
        }
        let mut properties = Map::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({ "type": p.param_type, "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        Some(json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }
}

// --- Tool invocation / result ---

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Identifier used to match the result back to the request
    pub id: String,
    /// Name of the tool to invoke (e.g. "get_h2h_events")
    pub name: String,
    /// Untyped arguments; each tool decodes them into its own record
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }

    /// Build an invocation from a JSON value, treating anything that is not an
    /// object as "no arguments".
    pub fn from_value(id: Option<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut call = Self::new(name, arguments);
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        call
    }
}

/// The outcome of one tool invocation, fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionResult {
    pub call_id: String,
    pub tool_name: String,
    /// Arbitrary structured data, or `{"error": message}`
    pub payload: Value,
}

impl ToolExecutionResult {
    pub fn new(call: &ToolInvocation, payload: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            payload,
        }
    }
}

/// Build the `{"error": message}` payload used everywhere a failure is
/// reported to the model.
pub fn error_payload(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Extract the message of an `{"error": ...}` payload.
pub fn error_message(payload: &Value) -> Option<&str> {
    payload.get("error").and_then(Value::as_str)
}

// --- Transcript messages ---

/// A single message of the LLM transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// If the model wants to call tools, this will be non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    /// For tool messages, the result being reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolExecutionResult>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: vec![],
            tool_result: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: vec![],
            tool_result: None,
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            tool_calls: vec![],
            tool_result: None,
        }
    }

    /// A model message that includes tool calls.
    pub fn model_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            tool_calls,
            tool_result: None,
        }
    }

    /// A tool result message.
    pub fn tool_result(result: ToolExecutionResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.payload.to_string(),
            tool_calls: vec![],
            tool_result: Some(result),
        }
    }

    /// Seed a transcript message from caller history.
    pub fn from_history(msg: &ConversationMessage) -> Self {
        match msg.speaker() {
            Role::Model => Self::model(msg.content.clone()),
            _ => Self::user(msg.content.clone()),
        }
    }
}

// --- Chat Request / Response ---

/// A request to send to the LLM.
///
/// Providers convert this into their own wire format.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmTurn {
    /// A plain-text answer (possibly empty)
    FinalText(String),
    /// One or more tool invocations, in the order the model emitted them,
    /// with any text the model wrote alongside them
    ToolCallsRequested {
        preamble: String,
        calls: Vec<ToolInvocation>,
    },
}

impl LlmTurn {
    /// Classify a provider response: any tool call wins over text.
    pub fn from_parts(text: String, tool_calls: Vec<ToolInvocation>) -> Self {
        if tool_calls.is_empty() {
            LlmTurn::FinalText(text)
        } else {
            LlmTurn::ToolCallsRequested {
                preamble: text,
                calls: tool_calls,
            }
        }
    }
}

/// One event of a streamed model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of text content
    TextDelta(String),
    /// Completed tool calls (emitted once the provider has assembled them)
    ToolCalls(Vec<ToolInvocation>),
}

/// The answer returned to the caller of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}
