//! Google Gemini provider.
//!
//! Uses `generateContent` for whole turns and
//! `streamGenerateContent?alt=sse` for streamed ones. Tools are declared as
//! function declarations; the model answers with `functionCall` parts and we
//! report results back as `functionResponse` parts.
//!
//! Gemini assigns no ids to function calls, so invocation ids are generated
//! locally.

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::sse::data_events;
use super::{LlmProvider, TurnStream};
use crate::types::{ChatRequest, LlmTurn, Message, Role, StreamEvent, ToolInvocation, ToolSchema};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String, api_base: Option<String>) -> Self {
        Self {
            client,
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    fn url(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!("{}/models/{}:{}", self.api_base.trim_end_matches('/'), model, method)
    }

    fn post(&self, url: &str, body: &GeminiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
    }
}

// --- API Request Types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

// --- API Response Types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

// --- Conversion ---

/// Gemini wants a JSON object as the function response.
fn response_object(payload: &Value) -> Value {
    match payload {
        Value::Object(_) => payload.clone(),
        other => json!({ "result": other }),
    }
}

/// Convert the transcript to Gemini contents.
///
/// - the system message becomes `system_instruction`
/// - model turns use the "model" role and carry their function calls
/// - consecutive tool results are merged into one "user" content of
///   `functionResponse` parts
fn convert_messages(messages: &[Message]) -> (Vec<GeminiContent>, Option<GeminiContent>) {
    let mut contents: Vec<GeminiContent> = Vec::new();
    let mut system_instruction = None;
    let mut last_was_tool = false;

    for msg in messages {
        match msg.role {
            Role::System => {
                system_instruction = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::Text {
                        text: msg.content.clone(),
                    }],
                });
            }
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::Text {
                    text: msg.content.clone(),
                }],
            }),
            Role::Model => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(GeminiPart::Text {
                        text: msg.content.clone(),
                    });
                }
                parts.extend(msg.tool_calls.iter().map(|call| GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall {
                        name: call.name.clone(),
                        args: Value::Object(call.arguments.clone()),
                    },
                }));
                if parts.is_empty() {
                    parts.push(GeminiPart::Text {
                        text: String::new(),
                    });
                }
                contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts,
                });
            }
            Role::Tool => {
                let (name, payload) = match &msg.tool_result {
                    Some(result) => (result.tool_name.clone(), result.payload.clone()),
                    None => (String::new(), Value::String(msg.content.clone())),
                };
                let part = GeminiPart::FunctionResponse {
                    function_response: GeminiFunctionResponse {
                        name,
                        response: response_object(&payload),
                    },
                };
                match contents.last_mut() {
                    Some(previous) if last_was_tool => previous.parts.push(part),
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts: vec![part],
                    }),
                }
            }
        }
        last_was_tool = msg.role == Role::Tool;
    }

    (contents, system_instruction)
}

fn convert_tools(tools: &[ToolSchema]) -> Option<Vec<GeminiTool>> {
    if tools.is_empty() {
        return None;
    }
    let function_declarations = tools
        .iter()
        .map(|tool| GeminiFunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters_json_schema(),
        })
        .collect();
    Some(vec![GeminiTool {
        function_declarations,
    }])
}

fn build_request(request: &ChatRequest) -> GeminiRequest {
    let (contents, system_instruction) = convert_messages(&request.messages);
    GeminiRequest {
        contents,
        system_instruction,
        tools: convert_tools(&request.tools),
        generation_config: GeminiGenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        },
    }
}

/// Text and function calls of the first candidate.
fn split_parts(response: GeminiResponse) -> (String, Vec<ToolInvocation>) {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return (String::new(), Vec::new());
    };
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            debug!(finish_reason = reason, "gemini candidate finished early");
        }
    }

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            GeminiPart::Text { text: t } => text.push_str(&t),
            GeminiPart::FunctionCall { function_call } => calls.push(ToolInvocation::from_value(
                None,
                function_call.name,
                function_call.args,
            )),
            GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
        }
    }
    (text, calls)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmTurn> {
        let body = build_request(request);
        let url = self.url(&request.model, false);
        debug!(model = %request.model, messages = request.messages.len(), "gemini request");

        let response = self
            .post(&url, &body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(%status, "gemini API error: {}", error_body);
            anyhow::bail!("Gemini API error ({}): {}", status, error_body);
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        let (text, calls) = split_parts(gemini_response);
        Ok(LlmTurn::from_parts(text, calls))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TurnStream> {
        let body = build_request(request);
        let url = self.url(&request.model, true);
        debug!(model = %request.model, messages = request.messages.len(), "gemini streaming request");

        let mut data = data_events(self.post(&url, &body))?;
        let events = try_stream! {
            let mut calls: Vec<ToolInvocation> = Vec::new();
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                let response: GeminiResponse = match serde_json::from_str(&chunk) {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("skipping unparseable Gemini chunk: {}", e);
                        continue;
                    }
                };
                let (text, chunk_calls) = split_parts(response);
                calls.extend(chunk_calls);
                if !text.is_empty() {
                    yield StreamEvent::TextDelta(text);
                }
            }
            if !calls.is_empty() {
                yield StreamEvent::ToolCalls(calls);
            }
        };
        Ok(events.boxed())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
