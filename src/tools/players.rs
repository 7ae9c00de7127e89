//! Player-centric tools: recent form, head-to-head, rankings and the raw
//! search used to debug name resolution.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{decode_args, payload_or_error, Tool, ToolError, ToolServices};
use crate::clients::sports::RankingKind;
use crate::resolver::resolve_player;
use crate::simplify::{aggregate_h2h, events_of, simplify_event_list, Side};
use crate::types::{error_payload, ParamType, ToolSchema};

/// Ranking rows returned by `get_rankings`.
const MAX_RANKING_ROWS: usize = 20;

#[derive(Debug, Deserialize)]
struct PlayerArgs {
    player_name: String,
}

/// A player's most recent matches.
pub struct RecentMatchesTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl RecentMatchesTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_player_recent_matches",
                "Finds a player by name and fetches their recent match history. Useful for \
                 analyzing a player's recent form.",
                "tennis_api: get_player_recent_matches",
            )
            .required("player_name", ParamType::String, "The player's name, e.g. 'Carlos Alcaraz'."),
            services,
        }
    }
}

#[async_trait]
impl Tool for RecentMatchesTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: PlayerArgs = decode_args(self.name(), arguments)?;
        info!(player = %args.player_name, "get_player_recent_matches");

        let Some(player) = resolve_player(self.services.sports.as_ref(), &args.player_name).await
        else {
            return Ok(json!({
                "summary": format!(
                    "I couldn't find a unique player named '{}'. Please try their full name or check the spelling.",
                    args.player_name
                )
            }));
        };

        let raw = payload_or_error(self.services.sports.previous_events(player.upstream_id).await);
        Ok(simplify_event_list(&raw))
    }
}

/// Resolve both players and summarize their head-to-head history.
pub(crate) async fn head_to_head(services: &ToolServices, player1: &str, player2: &str) -> Value {
    let sports = services.sports.as_ref();
    let (p1, p2) = tokio::join!(resolve_player(sports, player1), resolve_player(sports, player2));

    let (p1, p2) = match (p1, p2) {
        (Some(p1), Some(p2)) => (p1, p2),
        (p1, _) => {
            let failed = if p1.is_none() { player1 } else { player2 };
            return json!({
                "summary": format!(
                    "I had trouble finding a player named '{}'. Could you try their full name or check the spelling?",
                    failed
                )
            });
        }
    };

    info!(p1 = %p1.canonical_name, p2 = %p2.canonical_name, "head-to-head players resolved");
    let raw = payload_or_error(sports.h2h_events(p1.upstream_id, p2.upstream_id).await);
    let events = events_of(&raw);
    if events.is_empty() {
        return json!({
            "summary": format!(
                "I couldn't find any head-to-head match history between {} and {}.",
                player1, player2
            )
        });
    }

    let record = aggregate_h2h(
        events,
        Side {
            id: p1.upstream_id,
            fallback_name: player1,
        },
        Side {
            id: p2.upstream_id,
            fallback_name: player2,
        },
    );
    serde_json::to_value(record).unwrap_or_else(|e| error_payload(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct H2HArgs {
    player1_name: String,
    player2_name: String,
}

pub struct HeadToHeadTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl HeadToHeadTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_h2h_events",
                "Fetches the career head-to-head (H2H) win/loss record between two players. \
                 This is for the overall historical record, not for the score of a single match.",
                "tennis_api: get_h2h_events",
            )
            .required("player1_name", ParamType::String, "The full name of the first player.")
            .required("player2_name", ParamType::String, "The full name of the second player."),
            services,
        }
    }
}

#[async_trait]
impl Tool for HeadToHeadTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: H2HArgs = decode_args(self.name(), arguments)?;
        info!(p1 = %args.player1_name, p2 = %args.player2_name, "get_h2h_events");
        Ok(head_to_head(&self.services, &args.player1_name, &args.player2_name).await)
    }
}

#[derive(Debug, Deserialize)]
struct RankingArgs {
    ranking_type: String,
}

/// Live ATP or WTA rankings, top entries only.
pub struct RankingsTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl RankingsTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_rankings",
                "Fetches the official world tennis rankings for either men (ATP) or women (WTA).",
                "tennis_api: get_rankings",
            )
            .required(
                "ranking_type",
                ParamType::String,
                "The type of ranking to fetch. Must be either 'atp' or 'wta'.",
            ),
            services,
        }
    }
}

fn trim_rankings(raw: Value, kind: RankingKind) -> Value {
    let Some(rows) = raw.get("rankings").and_then(Value::as_array) else {
        return raw;
    };
    let top: Vec<Value> = rows
        .iter()
        .take(MAX_RANKING_ROWS)
        .map(|row| {
            let team = row.get("team");
            json!({
                "rank": row.get("ranking").cloned().unwrap_or(Value::Null),
                "player": team
                    .and_then(|t| t.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("N/A"),
                "country": team
                    .and_then(|t| t.get("country"))
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("N/A"),
                "points": row.get("points").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    json!({
        "ranking_type": kind.as_str(),
        "total_ranked": rows.len(),
        "rankings": top,
    })
}

#[async_trait]
impl Tool for RankingsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: RankingArgs = decode_args(self.name(), arguments)?;
        info!(ranking_type = %args.ranking_type, "get_rankings");
        let Some(kind) = RankingKind::parse(&args.ranking_type) else {
            return Ok(error_payload("Invalid ranking_type. Must be 'atp' or 'wta'."));
        };
        let raw = payload_or_error(self.services.sports.rankings(kind).await);
        Ok(trim_rankings(raw, kind))
    }
}

/// Raw search output, for checking what the API knows about a name.
pub struct DebugSearchTool {
    schema: ToolSchema,
    services: ToolServices,
}

impl DebugSearchTool {
    pub fn new(services: ToolServices) -> Self {
        Self {
            schema: ToolSchema::new(
                "debug_api_search",
                "(FOR DEBUGGING) Fetches the raw JSON results from the player search API for a \
                 given player's name.",
                "tennis_api: debug_api_search",
            )
            .required(
                "player_name",
                ParamType::String,
                "The full name of the player to search for, e.g. 'Carlos Alcaraz'.",
            ),
            services,
        }
    }
}

#[async_trait]
impl Tool for DebugSearchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args: PlayerArgs = decode_args(self.name(), arguments)?;
        info!(player = %args.player_name, "debug_api_search");
        Ok(payload_or_error(
            self.services.sports.search(&args.player_name).await,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::tools::testing::{args, services};

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn search_hit(id: i64, name: &str) -> Value {
        json!({"results": [{"type": "player", "entity": {"id": id, "name": name}}]})
    }

    fn h2h_event(home: (i64, &str), away: (i64, &str), winner: i64) -> Value {
        json!({
            "tournament": {"name": "US Open"},
            "homeTeam": {"id": home.0, "name": home.1},
            "awayTeam": {"id": away.0, "name": away.1},
            "winnerCode": winner,
            "homeScore": {"period1": 6, "period2": 6},
            "awayScore": {"period1": 3, "period2": 2},
            "startTimestamp": 1_700_000_000,
        })
    }

    fn two_players() -> FakeSportsData {
        FakeSportsData::new()
            .with("api/tennis/search/Alcaraz", search_hit(1, "Carlos Alcaraz"))
            .with("api/tennis/search/Sinner", search_hit(2, "Jannik Sinner"))
    }

    #[test]
    fn test_h2h_three_wins_to_one() {
        rt().block_on(async {
            let a = (1, "Carlos Alcaraz");
            let b = (2, "Jannik Sinner");
            let fake = two_players().with(
                "api/tennis/player/1/h2h/2",
                json!({"events": [
                    h2h_event(a, b, 1),
                    h2h_event(a, b, 1),
                    h2h_event(a, b, 1),
                    h2h_event(b, a, 1),
                ]}),
            );
            let tool = HeadToHeadTool::new(services(fake));
            let result = tool
                .execute(args(json!({"player1_name": "Alcaraz", "player2_name": "Sinner"})))
                .await
                .unwrap();
            assert_eq!(
                result["summary"],
                "Carlos Alcaraz leads Jannik Sinner 3-1 in their head-to-head matches."
            );
            assert_eq!(result["overall_record"]["Jannik Sinner_wins"], 1);
            assert!(result.get("p1_wins").is_none());
            assert_eq!(result["recent_matches"][0]["score"], "6-3, 6-2");
        });
    }

    #[test]
    fn test_h2h_unknown_player() {
        rt().block_on(async {
            let fake = FakeSportsData::new()
                .with("api/tennis/search/Alcaraz", search_hit(1, "Carlos Alcaraz"))
                .with("api/tennis/search/Nobody", json!({"results": []}));
            let result = head_to_head(&services(fake), "Alcaraz", "Nobody").await;
            assert!(result["summary"].as_str().unwrap().contains("'Nobody'"));
        });
    }

    #[test]
    fn test_h2h_without_history() {
        rt().block_on(async {
            let fake = two_players().with("api/tennis/player/1/h2h/2", json!({"events": []}));
            let result = head_to_head(&services(fake), "Alcaraz", "Sinner").await;
            assert_eq!(
                result["summary"],
                "I couldn't find any head-to-head match history between Alcaraz and Sinner."
            );
        });
    }

    #[test]
    fn test_h2h_names_fall_back_to_query() {
        rt().block_on(async {
            let fake = two_players().with(
                "api/tennis/player/1/h2h/2",
                json!({"events": [{
                    "homeTeam": {"id": 1, "name": "Carlos Alcaraz"},
                    "awayTeam": {"name": "J. Sinner"},
                    "winnerCode": 1,
                }]}),
            );
            let result = head_to_head(&services(fake), "Alcaraz", "Sinner").await;
            assert_eq!(
                result["summary"],
                "Carlos Alcaraz leads Sinner 1-0 in their head-to-head matches."
            );
        });
    }

    #[test]
    fn test_recent_matches_unresolved_player() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with("api/tennis/search/Federer", json!({"results": []}));
            let tool = RecentMatchesTool::new(services(fake));
            let result = tool
                .execute(args(json!({"player_name": "Federer"})))
                .await
                .unwrap();
            assert!(result["summary"]
                .as_str()
                .unwrap()
                .starts_with("I couldn't find a unique player named 'Federer'"));
        });
    }

    #[test]
    fn test_recent_matches() {
        rt().block_on(async {
            let fake = two_players().with(
                "api/tennis/player/2/events/previous/0",
                json!({"events": [h2h_event((2, "Jannik Sinner"), (3, "Other"), 1)]}),
            );
            let tool = RecentMatchesTool::new(services(fake));
            let result = tool
                .execute(args(json!({"player_name": "Sinner"})))
                .await
                .unwrap();
            assert_eq!(result["events_returned"], 1);
            assert_eq!(result["events_preview"][0]["tournament"], "US Open");
        });
    }

    #[test]
    fn test_rankings_validation_and_trim() {
        rt().block_on(async {
            let rows: Vec<Value> = (1..=30)
                .map(|i| {
                    json!({
                        "ranking": i,
                        "points": 10_000 - i,
                        "team": {"name": format!("Player {}", i), "country": {"name": "Italy"}},
                    })
                })
                .collect();
            let fake = FakeSportsData::new().with("api/tennis/rankings/atp/live", json!({ "rankings": rows }));
            let tool = RankingsTool::new(services(fake));

            let invalid = tool
                .execute(args(json!({"ranking_type": "itf"})))
                .await
                .unwrap();
            assert_eq!(invalid["error"], "Invalid ranking_type. Must be 'atp' or 'wta'.");

            let result = tool
                .execute(args(json!({"ranking_type": "ATP"})))
                .await
                .unwrap();
            assert_eq!(result["total_ranked"], 30);
            assert_eq!(result["rankings"].as_array().unwrap().len(), MAX_RANKING_ROWS);
            assert_eq!(result["rankings"][0]["player"], "Player 1");
            assert_eq!(result["rankings"][0]["country"], "Italy");
        });
    }

    #[test]
    fn test_debug_search_returns_raw_payload() {
        rt().block_on(async {
            let fake = two_players();
            let tool = DebugSearchTool::new(services(fake));
            let result = tool
                .execute(args(json!({"player_name": "Sinner"})))
                .await
                .unwrap();
            assert_eq!(result, search_hit(2, "Jannik Sinner"));
        });
    }
}
