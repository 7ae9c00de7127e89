//! General-knowledge web search tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::{decode_args, Tool, ToolError, ToolServices, WEB_SEARCH_SOURCE, WEB_SEARCH_TOOL};
use crate::types::{ParamType, ToolSchema};

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

pub struct WebSearchTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl WebSearchTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                WEB_SEARCH_TOOL,
                "A fallback tool for general or ambiguous questions, news, player history, or when \
                 the specialized tools fail or do not apply.",
                WEB_SEARCH_SOURCE,
            )
            .required(
                "query",
                ParamType::String,
                "The user's original question to search on the web.",
            ),
            services,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: SearchArgs = decode_args(self.name(), arguments)?;
        info!(query = %args.query, "perform_web_search");
        Ok(self.services.web.search(&args.query).await.into_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::clients::web_search::fake::FakeWebSearch;
    use crate::clients::web_search::WebSearchOutcome;
    use crate::tools::testing::args;
    use serde_json::json;
    use std::sync::Arc;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_search_payloads() {
        rt().block_on(async {
            let web = Arc::new(FakeWebSearch::new(WebSearchOutcome::NoResults));
            let tool = WebSearchTool::new(ToolServices {
                sports: Arc::new(FakeSportsData::new()),
                web: web.clone(),
            });
            let result = tool
                .execute(args(json!({"query": "who won wimbledon 1980"})))
                .await
                .unwrap();
            assert!(result["summary"].as_str().unwrap().contains("couldn't find"));
            assert_eq!(web.queries(), vec!["who won wimbledon 1980"]);
        });
    }

    #[test]
    fn test_missing_query_is_invalid() {
        rt().block_on(async {
            let tool = WebSearchTool::new(crate::tools::testing::services(FakeSportsData::new()));
            assert!(matches!(
                tool.execute(Map::new()).await,
                Err(ToolError::InvalidArguments { .. })
            ));
        });
    }
}
