//! LLM Client module.
//!
//! This module defines the `LlmProvider` trait that abstracts over the chat
//! APIs we talk to (Gemini, OpenAI-compatible endpoints such as DeepSeek),
//! and the `ChatSession` that keeps the running transcript of one request.
//!
//! Key concepts:
//! - **LlmTurn**: every reply is classified as either final text or a batch
//!   of tool calls, so callers never inspect raw provider payloads
//! - **Streaming**: `stream` yields `StreamEvent`s. Providers without a
//!   native stream get a default that replays `complete` as events
//! - **ChatSession**: stateful chat on top of a stateless provider. It owns
//!   the transcript and appends prompts, model turns and tool results

pub mod gemini;
#[cfg(test)]
pub mod mock;
pub mod openai_compatible;
mod sse;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::types::{
    ChatRequest, ConversationMessage, LlmTurn, Message, StreamEvent, ToolExecutionResult,
    ToolInvocation, ToolSchema,
};

/// Events of one streamed turn.
pub type TurnStream = BoxStream<'static, Result<StreamEvent>>;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the transcript and wait for the whole reply.
    async fn complete(&self, request: &ChatRequest) -> Result<LlmTurn>;

    /// Send the transcript and receive the reply incrementally.
    ///
    /// The default issues a single combined call and replays it.
    async fn stream(&self, request: &ChatRequest) -> Result<TurnStream> {
        let turn = self.complete(request).await?;
        Ok(stream::iter(replay(turn).into_iter().map(Ok)).boxed())
    }

    /// Return the provider's display name (for logging).
    fn name(&self) -> &str;
}

/// The events a streaming provider would have produced for `turn`.
pub fn replay(turn: LlmTurn) -> Vec<StreamEvent> {
    match turn {
        LlmTurn::FinalText(text) if text.is_empty() => vec![],
        LlmTurn::FinalText(text) => vec![StreamEvent::TextDelta(text)],
        LlmTurn::ToolCallsRequested { preamble, calls } => {
            let mut events = Vec::with_capacity(2);
            if !preamble.is_empty() {
                events.push(StreamEvent::TextDelta(preamble));
            }
            events.push(StreamEvent::ToolCalls(calls));
            events
        }
    }
}

/// Build the provider named in config.
pub fn create_provider(config: &LlmConfig, api_key: String) -> Result<Arc<dyn LlmProvider>> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(gemini::GeminiProvider::new(
            client,
            api_key,
            config.api_base.clone(),
        ))),
        "openai_compatible" | "openai" | "deepseek" => Ok(Arc::new(
            openai_compatible::OpenAiCompatibleProvider::new(client, api_key, config.api_base.clone()),
        )),
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Use 'gemini' or 'openai_compatible'.",
            other
        ),
    }
}

/// Generation settings shared by every request of a session.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// What the orchestrator sends on a turn.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    ToolResults(Vec<ToolExecutionResult>),
}

/// A chat with the model, seeded with instructions, tools and history.
pub struct ChatSession {
    provider: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
    tools: Vec<ToolSchema>,
    transcript: Vec<Message>,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        settings: GenerationSettings,
        system_prompt: &str,
        tools: Vec<ToolSchema>,
        history: &[ConversationMessage],
    ) -> Self {
        let mut transcript = Vec::with_capacity(history.len() + 1);
        transcript.push(Message::system(system_prompt));
        transcript.extend(history.iter().map(Message::from_history));
        Self {
            provider,
            settings,
            tools,
            transcript,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn push_prompt(&mut self, prompt: Prompt) {
        match prompt {
            Prompt::Text(text) => self.transcript.push(Message::user(text)),
            Prompt::ToolResults(results) => self
                .transcript
                .extend(results.into_iter().map(Message::tool_result)),
        }
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: self.transcript.clone(),
            tools: self.tools.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Send a prompt and wait for the model's whole turn.
    pub async fn send(&mut self, prompt: Prompt) -> Result<LlmTurn> {
        self.push_prompt(prompt);
        let turn = self.provider.complete(&self.request()).await?;
        match &turn {
            LlmTurn::FinalText(text) => self.record_reply(text.clone(), vec![]),
            LlmTurn::ToolCallsRequested { preamble, calls } => {
                self.record_reply(preamble.clone(), calls.clone())
            }
        }
        Ok(turn)
    }

    /// Send a prompt and stream the model's turn. The caller reports what it
    /// received through [`ChatSession::record_reply`] once the stream ends.
    pub async fn send_streaming(&mut self, prompt: Prompt) -> Result<TurnStream> {
        self.push_prompt(prompt);
        self.provider.stream(&self.request()).await
    }

    /// Append the model's turn to the transcript.
    pub fn record_reply(&mut self, text: String, tool_calls: Vec<ToolInvocation>) {
        if tool_calls.is_empty() {
            self.transcript.push(Message::model(text));
        } else {
            self.transcript
                .push(Message::model_with_tool_calls(text, tool_calls));
        }
    }
}
