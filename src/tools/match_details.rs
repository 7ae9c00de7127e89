//! The match super-tool.
//!
//! One call that finds a specific match and returns its result, score and
//! key statistics:
//!
//! 1. With a date: look the match up in that day's schedule.
//! 2. Without a date: check live matches first.
//! 3. Nothing live: fall back to the head-to-head history of the two
//!    players and hand the recent meetings back as clarification options.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::players::head_to_head;
use super::{decode_args, parse_date, payload_or_error, Tool, ToolError, ToolServices, INVALID_DATE};
use crate::simplify::{events_of, summarize_match, Event};
use crate::types::{error_message, error_payload, ParamType, ToolSchema};

#[derive(Debug, Deserialize)]
struct FindMatchArgs {
    player1_name: String,
    #[serde(default)]
    player2_name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl FindMatchArgs {
    fn player2(&self) -> Option<&str> {
        self.player2_name
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    fn date(&self) -> Option<&str> {
        self.date.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    fn description(&self) -> String {
        match self.player2() {
            Some(p2) => format!("'{}' vs '{}'", self.player1_name, p2),
            None => format!("'{}'", self.player1_name),
        }
    }
}

pub struct FindMatchTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl FindMatchTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "find_match_and_get_details",
                "The best tool for finding all details about a specific match. Use it to find the \
                 score, winner, or statistics (like aces) for a match when you know the player(s) \
                 and optionally the date. It finds the match and gets all available data in one step.",
                "tennis_api: find_match_and_get_details",
            )
            .required(
                "player1_name",
                ParamType::String,
                "The name of one of the players in the match.",
            )
            .optional(
                "player2_name",
                ParamType::String,
                "The name of the second player, for a more specific search.",
            )
            .optional(
                "date",
                ParamType::String,
                "The date of the match. Can be 'today', 'tomorrow', 'yesterday', or a date like '2024-12-25'.",
            ),
            services,
        }
    }

    /// Find the event naming the player(s) and enrich it with statistics.
    async fn details_from(&self, events: &[Value], args: &FindMatchArgs) -> Option<Value> {
        let target = events.iter().map(Event::from_value).find(|event| {
            event.involves(&args.player1_name) && args.player2().map_or(true, |p2| event.involves(p2))
        })?;
        let event_id = target.event_id?;

        info!(event_id, "found target event, fetching statistics");
        let statistics = payload_or_error(self.services.sports.event_statistics(event_id).await);
        let summary = summarize_match(&target, &statistics);
        Some(json!({
            "summary": "Successfully found and processed match details.",
            "match_details": summary,
        }))
    }
}

#[async_trait]
impl Tool for FindMatchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: FindMatchArgs = decode_args(self.name(), arguments)?;
        info!(
            p1 = %args.player1_name,
            p2 = ?args.player2(),
            date = ?args.date(),
            "find_match_and_get_details"
        );

        if let Some(date_text) = args.date() {
            let Some(date) = parse_date(date_text) else {
                return Ok(error_payload(INVALID_DATE));
            };
            let raw = payload_or_error(self.services.sports.events_on(date).await);
            if error_message(&raw).is_some() {
                return Ok(raw);
            }
            return Ok(self.details_from(events_of(&raw), &args).await.unwrap_or_else(|| {
                json!({
                    "summary": format!(
                        "I looked for a match with {} on {} but couldn't find one.",
                        args.description(),
                        date_text
                    )
                })
            }));
        }

        let live = payload_or_error(self.services.sports.live_events().await);
        if let Some(details) = self.details_from(events_of(&live), &args).await {
            info!("found live match");
            return Ok(details);
        }

        info!("no live match, looking up head-to-head for clarification");
        let Some(player2) = args.player2() else {
            return Ok(json!({
                "summary": "To find a past match without a date, please provide two player names."
            }));
        };

        let h2h = head_to_head(&self.services, &args.player1_name, player2).await;
        let has_history = h2h
            .get("recent_matches")
            .and_then(Value::as_array)
            .is_some_and(|m| !m.is_empty());
        if has_history {
            return Ok(json!({
                "summary": format!(
                    "I couldn't find a live match, but I found several recent matches for {} and {}. \
                     Please ask the user to clarify.",
                    args.player1_name, player2
                ),
                "clarification_options": h2h["recent_matches"],
            }));
        }
        Ok(h2h)
    }
}
