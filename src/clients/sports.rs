//! Sports-data API client.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use super::retry::{retry_with_backoff, RetryPolicy};
use super::{build_http_client, read_json, ApiError};
use crate::config::TennisApiConfig;

/// Which live ranking table to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingKind {
    Atp,
    Wta,
}

impl RankingKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "atp" => Some(RankingKind::Atp),
            "wta" => Some(RankingKind::Wta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingKind::Atp => "atp",
            RankingKind::Wta => "wta",
        }
    }
}

/// Upstream dates are `day/month/year` path segments without padding.
pub fn date_segments(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

/// Read access to the tennis data API.
///
/// Implementors only provide [`SportsData::fetch`]; the endpoint helpers
/// build the paths.
#[async_trait]
pub trait SportsData: Send + Sync {
    /// GET a path relative to the API root (e.g. `api/tennis/events/live`).
    async fn fetch(&self, path: &str) -> Result<Value, ApiError>;

    async fn search(&self, term: &str) -> Result<Value, ApiError> {
        let term = term.replace('/', " ");
        self.fetch(&format!("api/tennis/search/{}", term.trim())).await
    }

    async fn events_on(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/events/{}", date_segments(date)))
            .await
    }

    async fn live_events(&self) -> Result<Value, ApiError> {
        self.fetch("api/tennis/events/live").await
    }

    async fn odds_on(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/events/odds/{}", date_segments(date)))
            .await
    }

    async fn event_statistics(&self, event_id: i64) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/event/{}/statistics", event_id))
            .await
    }

    async fn previous_events(&self, player_id: i64) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/player/{}/events/previous/0", player_id))
            .await
    }

    async fn h2h_events(&self, player1_id: i64, player2_id: i64) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/player/{}/h2h/{}", player1_id, player2_id))
            .await
    }

    async fn rankings(&self, kind: RankingKind) -> Result<Value, ApiError> {
        self.fetch(&format!("api/tennis/rankings/{}/live", kind.as_str()))
            .await
    }
}

/// RapidAPI-hosted implementation.
pub struct SportsApiClient {
    client: reqwest::Client,
    base_url: Url,
    host: String,
    api_key: String,
    retry: RetryPolicy,
}

impl SportsApiClient {
    pub fn new(config: &TennisApiConfig, api_key: String) -> anyhow::Result<Self> {
        let base_url = Url::parse(&format!("https://{}/", config.host))?;
        Ok(Self {
            client: build_http_client(&config.http)?,
            base_url,
            host: config.host.clone(),
            api_key,
            retry: RetryPolicy::from_http(&config.http),
        })
    }

    /// Join `path` onto the base URL, percent-encoding each segment.
    fn url_for(&self, path: &str) -> Url {
        build_url(&self.base_url, path)
    }
}

fn build_url(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }
    url
}

#[async_trait]
impl SportsData for SportsApiClient {
    async fn fetch(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.url_for(path);
        debug!(path, "fetching sports data");
        retry_with_backoff(&self.retry, path, || {
            let request = self
                .client
                .get(url.clone())
                .header("X-RapidAPI-Key", &self.api_key)
                .header("X-RapidAPI-Host", &self.host);
            let url = url.clone();
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
                read_json(response, url.as_str()).await
            }
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory [`SportsData`] keyed by request path.
    #[derive(Default)]
    pub struct FakeSportsData {
        responses: HashMap<String, Result<Value, ApiError>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSportsData {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, path: &str, body: Value) -> Self {
            self.responses.insert(path.to_string(), Ok(body));
            self
        }

        pub fn with_error(mut self, path: &str, err: ApiError) -> Self {
            self.responses.insert(path.to_string(), Err(err));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SportsData for FakeSportsData {
        async fn fetch(&self, path: &str) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().push(path.to_string());
            self.responses.get(path).cloned().unwrap_or_else(|| {
                Err(ApiError::Status {
                    status: 404,
                    body: format!("no fixture for {}", path),
                })
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSportsData;
    use super::*;
    use serde_json::json;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_date_segments_are_unpadded() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(date_segments(date), "4/7/2024");
    }

    #[test]
    fn test_ranking_kind_parse() {
        assert_eq!(RankingKind::parse(" ATP "), Some(RankingKind::Atp));
        assert_eq!(RankingKind::parse("wta"), Some(RankingKind::Wta));
        assert_eq!(RankingKind::parse("itf"), None);
    }

    #[test]
    fn test_build_url_encodes_segments() {
        let base = Url::parse("https://tennis.example/").unwrap();
        let url = build_url(&base, "api/tennis/search/Jannik Sinner");
        assert_eq!(
            url.as_str(),
            "https://tennis.example/api/tennis/search/Jannik%20Sinner"
        );
    }

    #[test]
    fn test_endpoint_helpers_build_paths() {
        rt().block_on(async {
            let fake = FakeSportsData::new()
                .with("api/tennis/events/live", json!({"events": []}))
                .with("api/tennis/player/1/h2h/2", json!({"events": []}));
            assert!(fake.live_events().await.is_ok());
            assert!(fake.h2h_events(1, 2).await.is_ok());
            let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
            assert!(fake.odds_on(date).await.is_err());
            assert!(fake.rankings(RankingKind::Wta).await.is_err());
            assert!(fake.search("a/b").await.is_err());
            assert_eq!(
                fake.calls(),
                vec![
                    "api/tennis/events/live",
                    "api/tennis/player/1/h2h/2",
                    "api/tennis/events/odds/15/1/2024",
                    "api/tennis/rankings/wta/live",
                    "api/tennis/search/a b",
                ]
            );
        });
    }
}
