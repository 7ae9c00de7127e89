//! Scripted provider for tests.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LlmProvider, TurnStream};
use crate::types::{ChatRequest, LlmTurn, StreamEvent};

/// Replies with a fixed sequence of turns and records every request.
///
/// Scripted errors are given as strings. Once the script runs out the
/// provider keeps answering with the fallback turn (empty text by default).
/// Streaming splits text into word-sized deltas.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<LlmTurn, String>>>,
    fallback: LlmTurn,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<std::result::Result<LlmTurn, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: LlmTurn::FinalText(String::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `turn` forever after the script.
    pub fn then_always(mut self, turn: LlmTurn) -> Self {
        self.fallback = turn;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_turn(&self, request: &ChatRequest) -> Result<LlmTurn> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmTurn> {
        self.next_turn(request)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TurnStream> {
        let events: Vec<StreamEvent> = match self.next_turn(request)? {
            LlmTurn::FinalText(text) => text
                .split_inclusive(' ')
                .map(|word| StreamEvent::TextDelta(word.to_string()))
                .collect(),
            LlmTurn::ToolCallsRequested { preamble, calls } => preamble
                .split_inclusive(' ')
                .map(|word| StreamEvent::TextDelta(word.to_string()))
                .chain(std::iter::once(StreamEvent::ToolCalls(calls)))
                .collect(),
        };
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
