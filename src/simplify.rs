//! Response simplifiers.
//!
//! Upstream payloads are large and deeply nested. These functions reduce
//! them to the handful of fields the model needs. Missing fields default to
//! "N/A" (or zero); absence of data is never an error.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::error_message;

/// Events kept in an event-list preview.
pub const MAX_EVENTS: usize = 25;

/// Head-to-head matches listed in `recent_matches`.
pub const MAX_RECENT_MATCHES: usize = 5;

const NOT_AVAILABLE: &str = "N/A";
const NO_EVENTS: &str = "No events found for this query.";
const NO_SCORE: &str = "Score not available";
const NO_STATISTICS: &str = "No detailed statistics available.";
const KEY_STATISTICS: [&str; 4] = [
    "aces",
    "doubleFaults",
    "breakPointsSaved",
    "breakPointsConverted",
];

// --- Events ---

/// A match, in the reduced shape handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tournament: String,
    pub category: String,
    pub home_player: String,
    pub away_player: String,
    pub status: String,
    pub event_id: Option<i64>,
    pub home_score: Value,
    pub away_score: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_code: Option<i64>,
}

impl Event {
    /// Parse either an upstream event or an already simplified one.
    pub fn from_value(raw: &Value) -> Self {
        Self {
            tournament: flat_or_nested(raw, "tournament", &["tournament", "name"]),
            category: flat_or_nested(raw, "category", &["tournament", "category", "name"]),
            home_player: flat_or_nested(raw, "home_player", &["homeTeam", "name"]),
            away_player: flat_or_nested(raw, "away_player", &["awayTeam", "name"]),
            status: flat_or_nested(raw, "status", &["status", "description"]),
            event_id: raw
                .get("event_id")
                .and_then(Value::as_i64)
                .or_else(|| raw.get("id").and_then(Value::as_i64)),
            home_score: score_object(raw, "home_score", "homeScore"),
            away_score: score_object(raw, "away_score", "awayScore"),
            winner_code: raw
                .get("winner_code")
                .and_then(Value::as_i64)
                .or_else(|| raw.get("winnerCode").and_then(Value::as_i64)),
        }
    }

    /// Whether either side's name contains `fragment` (case-insensitive).
    pub fn involves(&self, fragment: &str) -> bool {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.home_player.to_lowercase().contains(&needle)
            || self.away_player.to_lowercase().contains(&needle)
    }
}

fn flat_or_nested(raw: &Value, flat_key: &str, nested: &[&str]) -> String {
    if let Some(s) = raw.get(flat_key).and_then(Value::as_str) {
        return s.to_string();
    }
    let mut cursor = raw;
    for key in nested {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return NOT_AVAILABLE.to_string(),
        }
    }
    cursor.as_str().unwrap_or(NOT_AVAILABLE).to_string()
}

fn score_object(raw: &Value, flat_key: &str, upstream_key: &str) -> Value {
    raw.get(flat_key)
        .or_else(|| raw.get(upstream_key))
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// The event array of a payload, from either `events` or `events_preview`.
pub fn events_of(payload: &Value) -> &[Value] {
    payload
        .get("events")
        .or_else(|| payload.get("events_preview"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[derive(Debug, Serialize)]
struct EventListSummary {
    total_events_found: usize,
    events_returned: usize,
    events_preview: Vec<Event>,
}

/// Reduce an event list to at most [`MAX_EVENTS`] simplified events.
///
/// Error payloads pass through untouched.
pub fn simplify_event_list(raw: &Value) -> Value {
    if error_message(raw).is_some() {
        return raw.clone();
    }
    let events = events_of(raw);
    if events.is_empty() {
        return json!({ "summary": NO_EVENTS });
    }

    let preview: Vec<Event> = events.iter().take(MAX_EVENTS).map(Event::from_value).collect();
    debug!(total = events.len(), returned = preview.len(), "simplified event list");
    serde_json::to_value(EventListSummary {
        total_events_found: events.len(),
        events_returned: preview.len(),
        events_preview: preview,
    })
    .unwrap_or_else(|_| json!({ "summary": NO_EVENTS }))
}

// --- Match detail ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub tournament: String,
    pub home_player: String,
    pub away_player: String,
    pub status: String,
    pub winner: String,
    pub final_score: String,
    /// Key statistics by name, or a fixed sentence when there are none
    pub simplified_statistics: Value,
}

/// Combine an event with its statistics payload.
pub fn summarize_match(event: &Event, statistics: &Value) -> MatchSummary {
    let winner_code = event
        .winner_code
        .or_else(|| event.home_score.get("winnerCode").and_then(Value::as_i64))
        .or_else(|| event.away_score.get("winnerCode").and_then(Value::as_i64));
    let winner = match winner_code {
        Some(1) => event.home_player.clone(),
        Some(2) => event.away_player.clone(),
        _ => NOT_AVAILABLE.to_string(),
    };

    MatchSummary {
        tournament: event.tournament.clone(),
        home_player: event.home_player.clone(),
        away_player: event.away_player.clone(),
        status: event.status.clone(),
        winner,
        final_score: set_scores(&event.home_score, &event.away_score, true),
        simplified_statistics: key_statistics(statistics),
    }
}

/// "6-4, 3-6, 7-5". With `both_sides` a set counts only when both score
/// objects carry it; otherwise the home side decides.
fn set_scores(home: &Value, away: &Value, both_sides: bool) -> String {
    let mut sets = Vec::new();
    for i in 1..=5 {
        let key = format!("period{}", i);
        let h = home.get(&key);
        let a = away.get(&key);
        match (h, a) {
            (Some(h), Some(a)) => sets.push(format!("{}-{}", plain(h), plain(a))),
            (Some(h), None) if !both_sides => sets.push(format!("{}-{}", plain(h), NOT_AVAILABLE)),
            _ => {}
        }
    }
    if sets.is_empty() {
        NO_SCORE.to_string()
    } else {
        sets.join(", ")
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => NOT_AVAILABLE.to_string(),
        other => other.to_string(),
    }
}

/// Pick the key statistics from the `ALL` period. Accepts the whole
/// statistics payload or just its `statistics` array.
fn key_statistics(statistics: &Value) -> Value {
    let periods = statistics
        .get("statistics")
        .unwrap_or(statistics)
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let all = periods
        .iter()
        .find(|p| p.get("period").and_then(Value::as_str) == Some("ALL"));

    let mut stats = Map::new();
    if let Some(all) = all {
        let groups = all.get("groups").and_then(Value::as_array);
        for group in groups.into_iter().flatten() {
            let items = group.get("statisticsItems").and_then(Value::as_array);
            for item in items.into_iter().flatten() {
                let Some(key) = item.get("key").and_then(Value::as_str) else {
                    continue;
                };
                if KEY_STATISTICS.contains(&key) {
                    stats.insert(
                        key.to_string(),
                        json!({
                            "home": item.get("home").cloned().unwrap_or(Value::Null),
                            "away": item.get("away").cloned().unwrap_or(Value::Null),
                        }),
                    );
                }
            }
        }
    }

    if stats.is_empty() {
        Value::String(NO_STATISTICS.to_string())
    } else {
        Value::Object(stats)
    }
}

// --- Head-to-head ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentMatch {
    pub date: String,
    pub tournament: String,
    pub winner: String,
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2HRecord {
    pub summary: String,
    pub overall_record: Map<String, Value>,
    pub recent_matches: Vec<RecentMatch>,
    #[serde(skip)]
    pub p1_wins: u32,
    #[serde(skip)]
    pub p2_wins: u32,
}

/// A player as known to the aggregator: upstream id plus the name to use
/// when the events don't carry one.
#[derive(Debug, Clone, Copy)]
pub struct Side<'a> {
    pub id: i64,
    pub fallback_name: &'a str,
}

fn team_id(event: &Value, team: &str) -> Option<i64> {
    event.get(team).and_then(|t| t.get("id")).and_then(Value::as_i64)
}

fn team_name<'a>(event: &'a Value, team: &str) -> Option<&'a str> {
    event.get(team).and_then(|t| t.get("name")).and_then(Value::as_str)
}

fn canonical_name(first: Option<&Value>, side: Side<'_>) -> String {
    first
        .and_then(|event| {
            ["homeTeam", "awayTeam"]
                .into_iter()
                .find(|team| team_id(event, team) == Some(side.id))
                .and_then(|team| team_name(event, team))
        })
        .unwrap_or(side.fallback_name)
        .to_string()
}

/// Count wins per player and summarize the most recent meetings.
pub fn aggregate_h2h(events: &[Value], p1: Side<'_>, p2: Side<'_>) -> H2HRecord {
    let p1_name = canonical_name(events.first(), p1);
    let p2_name = canonical_name(events.first(), p2);

    let mut p1_wins = 0;
    let mut p2_wins = 0;
    for event in events {
        let winning_team = match event.get("winnerCode").and_then(Value::as_i64) {
            Some(1) => "homeTeam",
            Some(2) => "awayTeam",
            _ => continue,
        };
        match team_id(event, winning_team) {
            Some(id) if id == p1.id => p1_wins += 1,
            Some(id) if id == p2.id => p2_wins += 1,
            _ => {}
        }
    }

    let recent_matches = events
        .iter()
        .take(MAX_RECENT_MATCHES)
        .map(recent_match)
        .collect();

    let summary = if p1_wins > p2_wins {
        format!(
            "{} leads {} {}-{} in their head-to-head matches.",
            p1_name, p2_name, p1_wins, p2_wins
        )
    } else if p2_wins > p1_wins {
        format!(
            "{} leads {} {}-{} in their head-to-head matches.",
            p2_name, p1_name, p2_wins, p1_wins
        )
    } else {
        format!(
            "The head-to-head record between {} and {} is tied {}-{}.",
            p1_name, p2_name, p1_wins, p2_wins
        )
    };
    debug!(%summary, "aggregated head-to-head");

    let mut overall_record = Map::new();
    overall_record.insert(format!("{}_wins", p1_name), json!(p1_wins));
    overall_record.insert(format!("{}_wins", p2_name), json!(p2_wins));

    H2HRecord {
        summary,
        overall_record,
        recent_matches,
        p1_wins,
        p2_wins,
    }
}

fn recent_match(event: &Value) -> RecentMatch {
    let date = event
        .get("startTimestamp")
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let winner = match event.get("winnerCode").and_then(Value::as_i64) {
        Some(1) => team_name(event, "homeTeam"),
        Some(2) => team_name(event, "awayTeam"),
        _ => None,
    };
    let empty = Value::Object(Map::new());
    RecentMatch {
        date,
        tournament: flat_or_nested(event, "tournament", &["tournament", "name"]),
        winner: winner.unwrap_or(NOT_AVAILABLE).to_string(),
        score: set_scores(
            event.get("homeScore").unwrap_or(&empty),
            event.get("awayScore").unwrap_or(&empty),
            false,
        ),
    }
}
