//! OpenAI-compatible LLM provider implementation (DeepSeek and friends).

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::sse::data_events;
use super::{LlmProvider, TurnStream};
use crate::types::{ChatRequest, LlmTurn, Role, StreamEvent, ToolInvocation};

const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";

pub struct OpenAiCompatibleProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct ApiTool {
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiToolCallFunction,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ApiToolCallFunction {
    name: String,
    arguments: String,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize, Debug)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
struct StreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool calls arrive in fragments keyed by index; the arguments string is
/// only valid JSON once complete.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn apply(calls: &mut Vec<ToolCallAccumulator>, delta: &StreamToolCallDelta) {
        while calls.len() <= delta.index {
            calls.push(ToolCallAccumulator::default());
        }
        let acc = &mut calls[delta.index];
        if let Some(ref id) = delta.id {
            acc.id = id.clone();
        }
        if let Some(ref func) = delta.function {
            if let Some(ref name) = func.name {
                acc.name.push_str(name);
            }
            if let Some(ref args) = func.arguments {
                acc.arguments.push_str(args);
            }
        }
    }

    fn finish(self) -> ToolInvocation {
        invocation(self.id, self.name, &self.arguments)
    }
}

/// Parse the JSON-encoded arguments string. Malformed or empty arguments
/// yield an empty object; the tool then reports what is missing.
fn invocation(id: String, name: String, arguments: &str) -> ToolInvocation {
    let args = if arguments.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(arguments).unwrap_or_else(|e| {
            warn!(tool = %name, "malformed tool arguments: {}", e);
            Value::Object(Map::new())
        })
    };
    ToolInvocation::from_value(Some(id), name, args)
}

// --- Implementation ---

impl OpenAiCompatibleProvider {
    pub fn new(client: reqwest::Client, api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn build_api_request(&self, request: &ChatRequest, stream: bool) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| match msg.role {
                Role::System => ApiMessage {
                    role: "system",
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::User => ApiMessage {
                    role: "user",
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::Model => {
                    let tool_calls = if msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            msg.tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".to_string(),
                                    function: ApiToolCallFunction {
                                        name: tc.name.clone(),
                                        arguments: Value::Object(tc.arguments.clone()).to_string(),
                                    },
                                })
                                .collect(),
                        )
                    };
                    ApiMessage {
                        role: "assistant",
                        content: if msg.content.is_empty() {
                            None
                        } else {
                            Some(msg.content.clone())
                        },
                        tool_calls,
                        tool_call_id: None,
                    }
                }
                Role::Tool => ApiMessage {
                    role: "tool",
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: msg.tool_result.as_ref().map(|r| r.call_id.clone()),
                },
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function",
                function: ApiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters_json_schema().unwrap_or_else(|| {
                        serde_json::json!({"type": "object", "properties": {}})
                    }),
                },
            })
            .collect();

        ApiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            stream,
        }
    }

    fn parse_response(api_response: ApiResponse) -> Result<LlmTurn> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .context("Empty response from API: no choices returned")?;

        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| invocation(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        Ok(LlmTurn::from_parts(content, tool_calls))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmTurn> {
        let api_request = self.build_api_request(request, false);
        let url = self.url();
        debug!(model = %request.model, messages = request.messages.len(), "chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, error_body);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .context("Failed to parse API response")?;

        Self::parse_response(api_response)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TurnStream> {
        let api_request = self.build_api_request(request, true);
        let url = self.url();
        debug!(model = %request.model, messages = request.messages.len(), "streaming chat completion request");

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request);
        let mut data = data_events(builder)?;

        let events = try_stream! {
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                if chunk.trim() == "[DONE]" {
                    break;
                }
                let parsed: StreamResponseChunk = match serde_json::from_str(&chunk) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!("skipping unparseable stream chunk: {}", e);
                        continue;
                    }
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };
                if let Some(ref tcs) = choice.delta.tool_calls {
                    for delta in tcs {
                        ToolCallAccumulator::apply(&mut tool_calls, delta);
                    }
                }
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        yield StreamEvent::TextDelta(text);
                    }
                }
            }
            if !tool_calls.is_empty() {
                let calls: Vec<ToolInvocation> =
                    tool_calls.into_iter().map(ToolCallAccumulator::finish).collect();
                yield StreamEvent::ToolCalls(calls);
            }
        };
        Ok(events.boxed())
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}
