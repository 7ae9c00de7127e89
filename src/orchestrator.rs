//! Tool-calling orchestrator - the core of the chat backend.
//!
//! The orchestrator drives one chat request between the user, the LLM and
//! the tennis tools:
//!
//! ```text
//! Query + History
//!     |
//!     v
//! +--------+     +------------+     +-------+
//! |  LLM   |<--->|Orchestrator|<--->| Tools |
//! +--------+     +------------+     +-------+
//!     |                |
//!     v                v
//! Answer text     Tool results / web search fallback
//! ```
//!
//! The loop ends when the model answers in plain text or the turn budget is
//! spent. Failures never reach the caller: they become fixed apology texts.

use anyhow::{Context, Result};
use async_stream::{stream, try_stream};
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::web_search::{WebSearch, WebSearchOutcome};
use crate::llm::{ChatSession, GenerationSettings, LlmProvider, Prompt};
use crate::tools::{ToolError, ToolRegistry, WEB_SEARCH_SOURCE, WEB_SEARCH_TOOL};
use crate::types::{
    error_message, error_payload, ChatReply, ConversationMessage, LlmTurn, StreamEvent,
    ToolExecutionResult, ToolInvocation,
};

/// Default number of model calls per request.
pub const MAX_TURNS: usize = 5;

pub const NO_RESPONSE: &str = "I could not generate a response.";

pub const TURN_BUDGET_EXHAUSTED: &str =
    "I'm having trouble using my tools to find an answer. Please try rephrasing your question.";

pub const CRITICAL_FAILURE: &str =
    "I'm sorry, a critical error occurred and I can't process your request right now.";

/// Shared, read-only handle that serves any number of concurrent requests.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    web: Arc<dyn WebSearch>,
    settings: GenerationSettings,
    system_prompt: String,
    max_turns: usize,
}

/// Bookkeeping for one request.
#[derive(Debug, Default)]
struct RequestState {
    sources: Vec<String>,
    tools_used: bool,
    forced_search: bool,
}

impl RequestState {
    fn record_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// The model asked the user something before looking anything up.
    fn wants_clarification(&self, text: &str) -> bool {
        !self.tools_used && !self.forced_search && text.contains('?')
    }

    fn reply(&self, text: String) -> ChatReply {
        ChatReply {
            response: text,
            sources: (!self.sources.is_empty()).then(|| self.sources.clone()),
        }
    }
}

fn answer_text(text: String) -> String {
    if text.trim().is_empty() {
        NO_RESPONSE.to_string()
    } else {
        text
    }
}

/// What one tool call contributed to the next prompt.
struct CallOutcome {
    result: ToolExecutionResult,
    sources: Vec<String>,
}

impl CallOutcome {
    fn failed(call: &ToolInvocation, message: &str) -> Self {
        Self {
            result: ToolExecutionResult::new(
                call,
                error_payload(format!("Execution failed for tool '{}': {}", call.name, message)),
            ),
            sources: vec![],
        }
    }
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        web: Arc<dyn WebSearch>,
        settings: GenerationSettings,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            web,
            settings,
            system_prompt: system_prompt.into(),
            max_turns: MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    fn open_session(&self, history: &[ConversationMessage]) -> ChatSession {
        ChatSession::new(
            Arc::clone(&self.provider),
            self.settings.clone(),
            &self.system_prompt,
            self.registry.schemas(),
            history,
        )
    }

    /// Answer `query` in one piece, with the sources of the tools that
    /// contributed.
    pub async fn respond(&self, query: &str, history: &[ConversationMessage]) -> ChatReply {
        match self.run(query, history).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = ?e, "chat request failed");
                ChatReply {
                    response: CRITICAL_FAILURE.to_string(),
                    sources: None,
                }
            }
        }
    }

    async fn run(&self, query: &str, history: &[ConversationMessage]) -> Result<ChatReply> {
        let mut session = self.open_session(history);
        let mut state = RequestState::default();
        let mut prompt = Prompt::Text(query.to_string());

        for turn in 1..=self.max_turns {
            info!(turn, provider = session.provider_name(), "sending prompt");
            let reply = session
                .send(prompt)
                .await
                .with_context(|| format!("LLM call failed on turn {}", turn))?;

            prompt = match reply {
                LlmTurn::FinalText(text) if !state.wants_clarification(&text) => {
                    info!(turn, "model answered");
                    return Ok(state.reply(answer_text(text)));
                }
                LlmTurn::FinalText(_) => self.forced_search(query, &mut state).await,
                LlmTurn::ToolCallsRequested { calls, .. } => {
                    self.execute_calls(query, calls, &mut state).await
                }
            };
        }

        warn!(max_turns = self.max_turns, "turn budget exhausted");
        Ok(state.reply(TURN_BUDGET_EXHAUSTED.to_string()))
    }

    /// Answer `query` as a stream of text fragments.
    ///
    /// The opening turn is sent non-streaming so a clarifying question can be
    /// caught. Later turns stream; a turn's fragments are forwarded once it
    /// ends without tool calls, so text written next to a tool call never
    /// reaches the caller. A failure ends the stream with the apology as its
    /// last fragment.
    pub fn respond_stream(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> BoxStream<'static, String> {
        let mut turns = self
            .clone()
            .stream_turns(query.to_string(), history.to_vec());
        stream! {
            while let Some(item) = turns.next().await {
                match item {
                    Ok(fragment) => {
                        yield fragment;
                    }
                    Err(e) => {
                        error!(error = ?e, "streaming chat request failed");
                        yield CRITICAL_FAILURE.to_string();
                        break;
                    }
                }
            }
        }
        .boxed()
    }

    fn stream_turns(
        self,
        query: String,
        history: Vec<ConversationMessage>,
    ) -> BoxStream<'static, Result<String>> {
        let this = self;
        try_stream! {
            let mut session = this.open_session(&history);
            let mut state = RequestState::default();

            info!(turn = 1, provider = session.provider_name(), "sending prompt");
            let opening = session
                .send(Prompt::Text(query.clone()))
                .await
                .context("LLM call failed on turn 1")?;
            let mut pending = match opening {
                LlmTurn::FinalText(text) if !state.wants_clarification(&text) => {
                    yield answer_text(text);
                    None
                }
                LlmTurn::FinalText(_) => Some(this.forced_search(&query, &mut state).await),
                LlmTurn::ToolCallsRequested { calls, .. } => {
                    Some(this.execute_calls(&query, calls, &mut state).await)
                }
            };

            let mut turn = 1;
            while let Some(prompt) = pending.take() {
                if turn >= this.max_turns {
                    warn!(max_turns = this.max_turns, "turn budget exhausted");
                    yield TURN_BUDGET_EXHAUSTED.to_string();
                    break;
                }
                turn += 1;

                info!(turn, provider = session.provider_name(), "streaming prompt");
                let mut events = session
                    .send_streaming(prompt)
                    .await
                    .with_context(|| format!("LLM call failed on turn {}", turn))?;
                let mut deltas = Vec::new();
                let mut calls = Vec::new();
                while let Some(event) = events.next().await {
                    match event? {
                        StreamEvent::TextDelta(delta) => deltas.push(delta),
                        StreamEvent::ToolCalls(batch) => calls.extend(batch),
                    }
                }
                let text = deltas.concat();
                session.record_reply(text.clone(), calls.clone());

                if !calls.is_empty() {
                    debug!(turn, preamble = %text, "holding back text of a tool-call turn");
                    pending = Some(this.execute_calls(&query, calls, &mut state).await);
                } else if text.trim().is_empty() {
                    yield NO_RESPONSE.to_string();
                } else {
                    for delta in deltas {
                        yield delta;
                    }
                }
            }
        }
        .boxed()
    }

    /// Search the web for the original query and hand the context to the
    /// model inline.
    async fn forced_search(&self, query: &str, state: &mut RequestState) -> Prompt {
        warn!("model asked for clarification before using a tool, forcing a web search");
        state.forced_search = true;
        state.tools_used = true;

        let web = Arc::clone(&self.web);
        let owned = query.to_string();
        let outcome = tokio::spawn(async move { web.search(&owned).await })
            .await
            .unwrap_or_else(|e| WebSearchOutcome::Failed(e.to_string()));
        state.record_source(WEB_SEARCH_SOURCE);

        let context = outcome.into_payload();
        debug!(context = %context, "forced web search returned");
        Prompt::Text(format!(
            "I ran a web search for \"{}\" and found:\n{}\n\nAnswer the original question \
             with this information instead of asking for clarification.",
            query, context
        ))
    }

    /// Run every requested call as its own task and collect the results in
    /// request order.
    async fn execute_calls(
        &self,
        query: &str,
        calls: Vec<ToolInvocation>,
        state: &mut RequestState,
    ) -> Prompt {
        state.tools_used = true;

        let tasks: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let registry = Arc::clone(&self.registry);
                let web = Arc::clone(&self.web);
                let query = query.to_string();
                let task_call = call.clone();
                let handle = tokio::spawn(async move {
                    run_call(&registry, web.as_ref(), &query, &task_call).await
                });
                (call, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (call, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(tool = %call.name, error = %e, "tool task did not complete");
                    CallOutcome::failed(&call, &e.to_string())
                }
            };
            for source in outcome.sources {
                state.record_source(source);
            }
            results.push(outcome.result);
        }
        Prompt::ToolResults(results)
    }
}

/// Execute one call. Unknown tools and failures become error payloads; an
/// error payload from a data tool is paired with a web search on the query.
async fn run_call(
    registry: &ToolRegistry,
    web: &dyn WebSearch,
    query: &str,
    call: &ToolInvocation,
) -> CallOutcome {
    info!(tool = %call.name, args = %serde_json::Value::Object(call.arguments.clone()), "executing tool");

    let Some(schema) = registry.schema(&call.name) else {
        warn!(tool = %call.name, "model requested an unknown tool");
        let message = ToolError::UnknownTool(call.name.clone()).to_string();
        return CallOutcome {
            result: ToolExecutionResult::new(call, error_payload(message)),
            sources: vec![],
        };
    };
    let source = schema.source_id.clone();

    let payload = match registry.invoke(&call.name, call.arguments.clone()).await {
        Ok(payload) => payload,
        Err(e) => {
            error!(tool = %call.name, error = %e, "tool execution failed");
            return CallOutcome::failed(call, &e.to_string());
        }
    };

    let mut sources = vec![source];
    let tool_error = error_message(&payload).map(str::to_string);
    let payload = match tool_error {
        Some(message) if call.name != WEB_SEARCH_TOOL => {
            warn!(tool = %call.name, error = %message, "tool returned an error, falling back to web search");
            let context = web.search(query).await.into_payload();
            sources.push(WEB_SEARCH_SOURCE.to_string());
            json!({
                "original_tool_error": message,
                "web_search_context": context,
            })
        }
        _ => payload,
    };
    debug!(tool = %call.name, payload = %payload, "tool returned");

    CallOutcome {
        result: ToolExecutionResult::new(call, payload),
        sources,
    }
}
