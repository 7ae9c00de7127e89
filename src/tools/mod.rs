//! Tool System module.
//!
//! This module defines the `Tool` trait and the `ToolRegistry` that together
//! form the tool execution framework.
//!
//! Key concepts:
//! - **Tool trait**: every tool exposes an immutable [`ToolSchema`] (name,
//!   description, parameters, citation label) and an async `execute`
//! - **Typed arguments**: the model sends an untyped JSON object; each tool
//!   decodes it into its own `Deserialize` record via [`decode_args`]
//! - **Payloads**: tools return JSON. Upstream failures are reported as an
//!   `{"error": ...}` payload rather than an `Err`, so the model can read them
//! - **ToolRegistry**: built once at startup, shared behind an `Arc`, and
//!   dispatches invocations by name

pub mod match_details;
pub mod players;
pub mod schedule;
pub mod web_search;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::clients::sports::SportsData;
use crate::clients::web_search::WebSearch;
use crate::clients::ApiError;
use crate::types::{error_payload, ToolSchema};

/// Name of the general-knowledge search tool; the orchestrator uses it for
/// fallbacks.
pub const WEB_SEARCH_TOOL: &str = "perform_web_search";

/// Citation label of the web search, also used for forced searches.
pub const WEB_SEARCH_SOURCE: &str = "web_search: perform_web_search";

pub const INVALID_DATE: &str =
    "Invalid date format. Please use 'today', 'tomorrow', 'yesterday', or YYYY-MM-DD.";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found.")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{message}")]
    Failed { tool: String, message: String },
}

/// Upstream clients shared by all tools.
#[derive(Clone)]
pub struct ToolServices {
    pub sports: Arc<dyn SportsData>,
    pub web: Arc<dyn WebSearch>,
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's interface as shown to the model.
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Run the tool with the raw argument object sent by the model.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Decode the model's argument object into a tool's parameter record.
pub fn decode_args<T: DeserializeOwned>(tool: &str, arguments: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Turn an upstream result into a payload the model can read.
pub fn payload_or_error(result: Result<Value, ApiError>) -> Value {
    result.unwrap_or_else(|e| error_payload(e.user_message()))
}

/// Accept ids sent as integers, integral floats or numeric strings.
pub fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        RawId::Float(f) => Err(serde::de::Error::custom(format!("not an integer id: {}", f))),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not an integer id: {:?}", s))),
    }
}

/// Resolve `today`/`tomorrow`/`yesterday` (any case) or `YYYY-MM-DD`
/// relative to `today`.
pub fn parse_date_relative(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    match value.trim().to_lowercase().as_str() {
        "today" => Some(today),
        "tomorrow" => Some(today + Duration::days(1)),
        "yesterday" => Some(today - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").ok(),
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_date_relative(value, Local::now().date_naive())
}

/// Routes tool invocations to the registered implementation.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// The tool catalogue, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema().clone()).collect()
    }

    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.find(name).map(|t| t.schema())
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a ToolRegistry with the full tennis catalogue registered.
pub fn create_default_registry(services: ToolServices) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(match_details::FindMatchTool::new(services.clone())));
    registry.register(Box::new(schedule::GeneralScheduleTool::new(services.clone())));
    registry.register(Box::new(schedule::LiveEventsTool::new(services.clone())));
    registry.register(Box::new(schedule::OddsByDateTool::new(services.clone())));
    registry.register(Box::new(schedule::EventStatisticsTool::new(services.clone())));
    registry.register(Box::new(players::RecentMatchesTool::new(services.clone())));
    registry.register(Box::new(players::HeadToHeadTool::new(services.clone())));
    registry.register(Box::new(players::RankingsTool::new(services.clone())));
    registry.register(Box::new(web_search::WebSearchTool::new(services.clone())));
    registry.register(Box::new(players::DebugSearchTool::new(services)));
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::clients::web_search::fake::FakeWebSearch;

    pub fn services(sports: FakeSportsData) -> ToolServices {
        ToolServices {
            sports: Arc::new(sports),
            web: Arc::new(FakeWebSearch::with_context("- fallback context")),
        }
    }

    pub fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
