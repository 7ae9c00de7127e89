//! Schedule, live score, odds and statistics tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::{decode_args, flexible_id, parse_date, payload_or_error, Tool, ToolError, ToolServices, INVALID_DATE};
use crate::simplify::simplify_event_list;
use crate::types::{error_payload, ParamType, ToolSchema};

const DATE_DESCRIPTION: &str =
    "The date to fetch. Can be 'today', 'tomorrow', 'yesterday', or a date like '2024-12-25'.";

#[derive(Debug, Deserialize)]
struct DateArgs {
    date: String,
}

/// All matches scheduled on a date.
pub struct GeneralScheduleTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl GeneralScheduleTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_general_schedule",
                "Fetches a general list of all scheduled tennis matches for a specific date.",
                "tennis_api: get_general_schedule",
            )
            .required("date", ParamType::String, DATE_DESCRIPTION),
            services,
        }
    }
}

#[async_trait]
impl Tool for GeneralScheduleTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: DateArgs = decode_args(self.name(), arguments)?;
        info!(date = %args.date, "get_general_schedule");
        let Some(date) = parse_date(&args.date) else {
            return Ok(error_payload(INVALID_DATE));
        };
        let raw = payload_or_error(self.services.sports.events_on(date).await);
        Ok(simplify_event_list(&raw))
    }
}

/// Matches in progress right now.
pub struct LiveEventsTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl LiveEventsTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_live_events",
                "Fetches all tennis matches that are currently live, with real-time scores and event IDs.",
                "tennis_api: get_live_events",
            ),
            services,
        }
    }
}

#[async_trait]
impl Tool for LiveEventsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<Value, ToolError> {
        info!("get_live_events");
        let raw = payload_or_error(self.services.sports.live_events().await);
        Ok(simplify_event_list(&raw))
    }
}

/// Betting odds for matches on a date.
pub struct OddsByDateTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl OddsByDateTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_odds_by_date",
                "Fetches betting odds for matches on a specific date.",
                "tennis_api: get_odds_by_date",
            )
            .required("date", ParamType::String, DATE_DESCRIPTION),
            services,
        }
    }
}

#[async_trait]
impl Tool for OddsByDateTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: DateArgs = decode_args(self.name(), arguments)?;
        info!(date = %args.date, "get_odds_by_date");
        let Some(date) = parse_date(&args.date) else {
            return Ok(error_payload(INVALID_DATE));
        };
        // The odds endpoint answers with an event list too.
        let raw = payload_or_error(self.services.sports.odds_on(date).await);
        Ok(simplify_event_list(&raw))
    }
}

#[derive(Debug, Deserialize)]
struct EventArgs {
    #[serde(deserialize_with = "flexible_id")]
    event_id: i64,
}

/// Raw statistics for one event.
pub struct EventStatisticsTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl EventStatisticsTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_event_statistics",
                "Fetches detailed statistics for a single match using its event ID. This is a \
                 low-level tool; prefer 'find_match_and_get_details' instead.",
                "tennis_api: get_event_statistics",
            )
            .required(
                "event_id",
                ParamType::String,
                "The unique identifier for the tennis match.",
            ),
            services,
        }
    }
}

#[async_trait]
impl Tool for EventStatisticsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: EventArgs = decode_args(self.name(), arguments)?;
        info!(event_id = args.event_id, "get_event_statistics");
        Ok(payload_or_error(
            self.services.sports.event_statistics(args.event_id).await,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sports::date_segments;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::clients::ApiError;
    use crate::tools::testing::{args, services};
    use chrono::Local;
    use serde_json::json;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn today_path(prefix: &str) -> String {
        format!("{}/{}", prefix, date_segments(Local::now().date_naive()))
    }

    fn event(id: i64, home: &str, away: &str) -> Value {
        json!({
            "id": id,
            "tournament": {"name": "Roland Garros"},
            "homeTeam": {"name": home},
            "awayTeam": {"name": away},
            "status": {"description": "Not started"},
        })
    }

    #[test]
    fn test_general_schedule_today() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with(
                &today_path("api/tennis/events"),
                json!({"events": [event(1, "A", "B"), event(2, "C", "D"), event(3, "E", "F")]}),
            );
            let tool = GeneralScheduleTool::new(services(fake));
            let result = tool.execute(args(json!({"date": "today"}))).await.unwrap();
            assert_eq!(result["total_events_found"], 3);
            assert_eq!(result["events_returned"], 3);
            assert_eq!(result["events_preview"][2]["away_player"], "F");
        });
    }

    #[test]
    fn test_invalid_date() {
        rt().block_on(async {
            let tool = GeneralScheduleTool::new(services(FakeSportsData::new()));
            let result = tool
                .execute(args(json!({"date": "next friday"})))
                .await
                .unwrap();
            assert_eq!(result, json!({ "error": INVALID_DATE }));

            let odds = OddsByDateTool::new(services(FakeSportsData::new()));
            let result = odds.execute(args(json!({"date": "12/25/2024"}))).await.unwrap();
            assert_eq!(result, json!({ "error": INVALID_DATE }));
        });
    }

    #[test]
    fn test_live_events_empty() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with("api/tennis/events/live", json!({"events": []}));
            let tool = LiveEventsTool::new(services(fake));
            let result = tool.execute(Map::new()).await.unwrap();
            assert_eq!(result["summary"], "No events found for this query.");
        });
    }

    #[test]
    fn test_odds_for_explicit_date() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with(
                "api/tennis/events/odds/25/12/2024",
                json!({"events": [event(9, "X", "Y")]}),
            );
            let tool = OddsByDateTool::new(services(fake));
            let result = tool.execute(args(json!({"date": "2024-12-25"}))).await.unwrap();
            assert_eq!(result["events_returned"], 1);
        });
    }

    #[test]
    fn test_upstream_failure_becomes_error_payload() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with_error(
                "api/tennis/event/42/statistics",
                ApiError::Timeout {
                    url: "https://x.test".into(),
                },
            );
            let tool = EventStatisticsTool::new(services(fake));
            let result = tool.execute(args(json!({"event_id": "42"}))).await.unwrap();
            assert!(result["error"].as_str().unwrap().contains("did not respond"));
        });
    }
}
