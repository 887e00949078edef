//! ESPN site API client.
//!
//! Scoreboards list the events of a date or a week; event summaries carry
//! everything the normalizer needs.

use anyhow::Context;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use crate::calendar::SeasonCalendar;
use crate::error::{IngestError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::scheduler::FetchTarget;

pub const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";

/// Fetch collaborator used by the pipeline.
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn fetch_summary(&self, calendar: &SeasonCalendar, event_id: &str) -> Result<Value>;

    async fn fetch_scoreboard(&self, calendar: &SeasonCalendar, target: &FetchTarget) -> Result<Value>;
}

pub fn scoreboard_url(base_url: &str, calendar: &SeasonCalendar) -> String {
    format!(
        "{}/{}/{}/scoreboard",
        base_url.trim_end_matches('/'),
        calendar.sport,
        calendar.league
    )
}

pub fn summary_url(base_url: &str, calendar: &SeasonCalendar) -> String {
    format!(
        "{}/{}/{}/summary",
        base_url.trim_end_matches('/'),
        calendar.sport,
        calendar.league
    )
}

/// Query parameters selecting `target` on the scoreboard endpoint, followed
/// by the league's own scoreboard parameters.
pub fn scoreboard_query(calendar: &SeasonCalendar, target: &FetchTarget) -> Vec<(String, String)> {
    let mut query = match *target {
        FetchTarget::Date(date) => vec![("dates".to_string(), date.format("%Y%m%d").to_string())],
        FetchTarget::Week {
            season,
            season_type,
            week,
        } => vec![
            ("year".to_string(), season.to_string()),
            ("week".to_string(), week.to_string()),
            ("seasontype".to_string(), season_type.code().to_string()),
        ],
    };
    query.extend(
        calendar
            .scoreboard_params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    query
}

/// ESPN ids show up both as strings and as numbers.
pub fn event_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Event ids on a scoreboard, first occurrence order, duplicates removed.
pub fn scoreboard_event_ids(scoreboard: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    scoreboard["events"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|event| event_id(&event["id"]))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid JSON: {0}")]
    Body(#[from] serde_json::Error),
}

impl RequestError {
    fn is_retriable(&self) -> bool {
        match self {
            RequestError::Transport(_) => true,
            RequestError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            RequestError::Body(_) => false,
        }
    }
}

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// HTTP client for the ESPN site API
pub struct EspnClient {
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    retry: RetryPolicy,
}

impl EspnClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        requests_per_second: u32,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let per_second =
            NonZeroU32::new(requests_per_second).context("REQUESTS_PER_SECOND must be at least 1")?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry,
        })
    }

    async fn request_once(&self, url: &str, query: &[(String, String)]) -> std::result::Result<Value, RequestError> {
        self.rate_limiter.until_ready().await;

        let response = self.http_client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RequestError::Status { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json(&self, url: String, query: Vec<(String, String)>) -> Result<Value> {
        debug!(url = %url, ?query, "GET");
        retry_with_backoff(
            &self.retry,
            &url,
            RequestError::is_retriable,
            || self.request_once(&url, &query),
        )
        .await
        .map_err(|failure| IngestError::Fetch {
            url: url.clone(),
            attempts: failure.attempts,
            message: failure.error.to_string(),
        })
    }
}

#[async_trait]
impl SummarySource for EspnClient {
    async fn fetch_summary(&self, calendar: &SeasonCalendar, event_id: &str) -> Result<Value> {
        let url = summary_url(&self.base_url, calendar);
        self.get_json(url, vec![("event".to_string(), event_id.to_string())])
            .await
    }

    async fn fetch_scoreboard(&self, calendar: &SeasonCalendar, target: &FetchTarget) -> Result<Value> {
        let url = scoreboard_url(&self.base_url, calendar);
        let scoreboard = self.get_json(url, scoreboard_query(calendar, target)).await?;
        info!(
            league = %calendar.league,
            %target,
            events = scoreboard["events"].as_array().map_or(0, Vec::len),
            "Fetched scoreboard"
        );
        Ok(scoreboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fixtures::{daily, date, weekly_simple};
    use crate::calendar::SeasonType;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            multiplier: 2,
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_urls() {
        let calendar = weekly_simple();
        assert_eq!(
            scoreboard_url(DEFAULT_BASE_URL, &calendar),
            "https://site.api.espn.com/apis/site/v2/sports/football/college-football/scoreboard"
        );
        assert_eq!(
            summary_url("http://localhost:9000/", &calendar),
            "http://localhost:9000/football/college-football/summary"
        );
    }

    #[test]
    fn test_week_query_carries_league_params() {
        let target = FetchTarget::Week {
            season: 2025,
            season_type: SeasonType::Postseason,
            week: 1,
        };
        let query = scoreboard_query(&weekly_simple(), &target);
        let expected: Vec<(String, String)> = [
            ("year", "2025"),
            ("week", "1"),
            ("seasontype", "3"),
            ("groups", "80"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_date_query() {
        let query = scoreboard_query(&daily(), &FetchTarget::Date(date(2025, 11, 3)));
        assert_eq!(query, vec![("dates".to_string(), "20251103".to_string())]);
    }

    #[test]
    fn test_scoreboard_event_ids_dedup_in_order() {
        let scoreboard = json!({
            "events": [
                {"id": "401"},
                {"id": 402},
                {"id": "401"},
                {"name": "no id"},
                {"id": "403"},
                {"id": "402"}
            ]
        });
        assert_eq!(scoreboard_event_ids(&scoreboard), vec!["401", "402", "403"]);
        assert!(scoreboard_event_ids(&json!({})).is_empty());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_summary_retries_server_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/football/college-football/summary",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (AxumStatus::OK, Json(json!({"header": {"id": "401"}})))
                    }
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let client = EspnClient::new(base, Duration::from_secs(5), 100, fast_retry(3)).unwrap();
        let summary = client.fetch_summary(&weekly_simple(), "401").await.unwrap();
        assert_eq!(summary["header"]["id"], "401");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/football/college-football/summary",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::NOT_FOUND
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let client = EspnClient::new(base, Duration::from_secs(5), 100, fast_retry(3)).unwrap();
        let err = client.fetch_summary(&weekly_simple(), "401").await.unwrap_err();
        match err {
            IngestError::Fetch { attempts, url, .. } => {
                assert_eq!(attempts, 1);
                assert!(url.ends_with("/football/college-football/summary"));
            }
            other => panic!("expected a fetch error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let app = Router::new().route(
            "/football/college-football/scoreboard",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(app).await;

        let client = EspnClient::new(base, Duration::from_secs(5), 100, fast_retry(2)).unwrap();
        let target = FetchTarget::Week {
            season: 2025,
            season_type: SeasonType::Regular,
            week: 3,
        };
        let err = client.fetch_scoreboard(&weekly_simple(), &target).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch { attempts: 2, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(EspnClient::new(DEFAULT_BASE_URL, Duration::from_secs(1), 0, RetryPolicy::default()).is_err());
    }
}
