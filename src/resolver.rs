//! Player name resolution.
//!
//! Turns a free-text player name ("C. Alcaraz", "sinner", "Rafael Nadal")
//! into the upstream player id. Only an unambiguous match is returned.

use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::clients::sports::SportsData;

/// A player the upstream API knows, with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub upstream_id: i64,
    pub canonical_name: String,
}

/// Lowercase, drop punctuation other than `-` and `'`, split on whitespace
/// and de-duplicate (first occurrence kept).
pub fn tokenize(name: &str) -> Vec<String> {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '\'' || c.is_whitespace() {
                c
            } else if c == ',' {
                ' '
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

fn token_pair_matches(query: &str, candidate: &str) -> bool {
    query == candidate
        || (candidate.chars().count() == 1 && query.starts_with(candidate))
        || (query.chars().count() == 1 && candidate.starts_with(query))
}

/// Every query token must match some candidate token, exactly or as an
/// initial of it (either direction).
pub fn tokens_match(query: &[String], candidate: &[String]) -> bool {
    !query.is_empty()
        && query
            .iter()
            .all(|q| candidate.iter().any(|c| token_pair_matches(q, c)))
}

/// Player entities from a search payload. Non-player results, results
/// without an integer id and results from other sports are skipped.
fn player_candidates(payload: &Value) -> Vec<(i64, String)> {
    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    results
        .iter()
        .filter(|r| r.get("type").and_then(Value::as_str) == Some("player"))
        .filter_map(|r| {
            let entity = r.get("entity")?;
            let id = entity.get("id").and_then(Value::as_i64)?;
            if let Some(sport) = entity
                .get("sport")
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
            {
                if !sport.eq_ignore_ascii_case("tennis") {
                    return None;
                }
            }
            let name = entity.get("name").and_then(Value::as_str).unwrap_or("");
            Some((id, name.to_string()))
        })
        .collect()
}

/// Resolve `player_name` to a single upstream player.
///
/// Searches with the full name and, for multi-word names, the surname, in
/// parallel. Returns `None` when nothing matches or when several distinct
/// players do.
pub async fn resolve_player(sports: &dyn SportsData, player_name: &str) -> Option<PlayerIdentity> {
    let query = tokenize(player_name);
    if query.is_empty() {
        return None;
    }
    info!(player_name, "resolving player");

    let full = player_name.trim().to_string();
    let mut terms = vec![full.clone()];
    if let Some(surname) = full.split_whitespace().last() {
        if full.split_whitespace().count() > 1 && surname != full {
            terms.push(surname.to_string());
        }
    }

    let searches = terms.iter().map(|term| sports.search(term));
    let payloads = join_all(searches).await;

    let mut matches: BTreeMap<i64, String> = BTreeMap::new();
    for (term, payload) in terms.iter().zip(payloads) {
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                warn!(term = %term, error = %e, "player search failed");
                continue;
            }
        };
        for (id, name) in player_candidates(&payload) {
            if tokens_match(&query, &tokenize(&name)) {
                matches.entry(id).or_insert(name);
            }
        }
    }

    match matches.len() {
        0 => {
            warn!(player_name, "no player matched");
            None
        }
        1 => {
            let (upstream_id, canonical_name) = matches.into_iter().next()?;
            info!(player_name, upstream_id, %canonical_name, "resolved player");
            Some(PlayerIdentity {
                upstream_id,
                canonical_name,
            })
        }
        n => {
            warn!(player_name, candidates = n, "ambiguous player name");
            for (id, name) in &matches {
                warn!(id, %name, "ambiguous candidate");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::clients::ApiError;
    use serde_json::json;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn player(id: i64, name: &str) -> Value {
        json!({"type": "player", "entity": {"id": id, "name": name, "sport": {"name": "Tennis"}}})
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("C. Alcaraz"), vec!["c", "alcaraz"]);
        assert_eq!(tokenize("Auger-Aliassime, Felix"), vec!["auger-aliassime", "felix"]);
        assert_eq!(tokenize("O'Connell o'connell"), vec!["o'connell"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_tokens_match_initials() {
        let cand = tokenize("Carlos Alcaraz");
        assert!(tokens_match(&tokenize("alcaraz"), &cand));
        assert!(tokens_match(&tokenize("C. Alcaraz"), &cand));
        assert!(tokens_match(&tokenize("alcaraz carlos"), &cand));
        assert!(tokens_match(&tokenize("Carlos Alcaraz"), &tokenize("Alcaraz C.")));
        assert!(!tokens_match(&tokenize("J. Alcaraz"), &cand));
        assert!(!tokens_match(&tokenize("Carlos Alcaraz Garfia"), &cand));
        assert!(!tokens_match(&[], &cand));
    }

    #[test]
    fn test_unique_match_resolves() {
        rt().block_on(async {
            let fake = FakeSportsData::new()
                .with(
                    "api/tennis/search/Jannik Sinner",
                    json!({"results": [
                        player(206570, "Sinner J."),
                        {"type": "team", "entity": {"id": 1, "name": "Jannik Sinner fans"}},
                    ]}),
                )
                .with(
                    "api/tennis/search/Sinner",
                    json!({"results": [player(206570, "Sinner J.")]}),
                );
            let found = resolve_player(&fake, "Jannik Sinner").await;
            assert_eq!(
                found,
                Some(PlayerIdentity {
                    upstream_id: 206570,
                    canonical_name: "Sinner J.".into()
                })
            );
            assert_eq!(fake.calls().len(), 2);
        });
    }

    #[test]
    fn test_ambiguous_match_returns_none() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with(
                "api/tennis/search/Zverev",
                json!({"results": [player(1, "Alexander Zverev"), player(2, "Mischa Zverev")]}),
            );
            assert_eq!(resolve_player(&fake, "Zverev").await, None);
        });
    }

    #[test]
    fn test_other_sports_and_missing_ids_are_ignored() {
        rt().block_on(async {
            let fake = FakeSportsData::new().with(
                "api/tennis/search/Murray",
                json!({"results": [
                    {"type": "player", "entity": {"id": 5, "name": "Jamie Murray", "sport": {"name": "Football"}}},
                    {"type": "player", "entity": {"id": "6", "name": "Andy Murray"}},
                    {"type": "player", "entity": {"id": 7, "name": "Andy Murray"}},
                ]}),
            );
            let found = resolve_player(&fake, "Murray").await;
            assert_eq!(found.map(|p| p.upstream_id), Some(7));
        });
    }

    #[test]
    fn test_failed_search_contributes_nothing() {
        rt().block_on(async {
            let fake = FakeSportsData::new()
                .with_error(
                    "api/tennis/search/Novak Djokovic",
                    ApiError::Status {
                        status: 500,
                        body: String::new(),
                    },
                )
                .with(
                    "api/tennis/search/Djokovic",
                    json!({"results": [player(14882, "Novak Djokovic")]}),
                );
            let found = resolve_player(&fake, "Novak Djokovic").await;
            assert_eq!(found.map(|p| p.upstream_id), Some(14882));
        });
    }

    #[test]
    fn test_empty_name_does_not_search() {
        rt().block_on(async {
            let fake = FakeSportsData::new();
            assert_eq!(resolve_player(&fake, " . ").await, None);
            assert!(fake.calls().is_empty());
        });
    }
}
