//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use espn_ingestion::calendar::parse_calendars;
use espn_ingestion::espn::SummarySource;
use espn_ingestion::normalizer::EventRecord;
use espn_ingestion::store::{EventStore, MemoryStore};
use espn_ingestion::{FetchTarget, IngestError, LeagueState, SeasonCalendar};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn calendars() -> Vec<SeasonCalendar> {
    parse_calendars(
        r#"[
            {
                "league": "college-football",
                "sport": "football",
                "checkType": "weekly",
                "checkDay": 1,
                "seasonStart": "2025-08-23",
                "seasonEnd": "2026-01-20",
                "seasonTypeWeeks": {"2": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14], "3": [1]},
                "scoreboardParams": {"groups": "80"}
            },
            {
                "league": "nfl",
                "sport": "football",
                "checkType": "weekly",
                "checkDay": 1,
                "seasonStart": "2025-09-04",
                "seasonEnd": "2026-02-09",
                "seasonTypeWeeks": {"2": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18], "3": [1, 2, 4]},
                "policy": "skip-week-postseason"
            },
            {
                "league": "nba",
                "sport": "basketball",
                "checkType": "daily",
                "seasonStart": "2025-10-21",
                "seasonEnd": "2026-06-20",
                "breakStart": "2026-02-13",
                "breakEnd": "2026-02-18"
            }
        ]"#,
    )
    .unwrap()
}

pub fn calendar(league: &str) -> SeasonCalendar {
    calendars()
        .into_iter()
        .find(|calendar| calendar.league == league)
        .unwrap()
}

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// A complete, final regular-season summary.
pub fn summary(home: &str, away: &str) -> Value {
    json!({
        "header": {
            "season": {"year": 2025, "type": 2},
            "week": 10,
            "competitions": [{
                "date": "2025-11-01T19:30Z",
                "neutralSite": false,
                "status": {"type": {"id": "3"}},
                "competitors": [
                    {"homeAway": "home", "winner": true, "rank": 12, "team": {"displayName": home}},
                    {"homeAway": "away", "winner": false, "team": {"displayName": away}}
                ]
            }]
        },
        "winprobability": [{"homeWinPercentage": 0.64}],
        "pickcenter": [{
            "homeTeamOdds": {"moneyLine": -190},
            "awayTeamOdds": {"moneyLine": 160}
        }]
    })
}

pub fn scoreboard(event_ids: &[&str]) -> Value {
    json!({
        "events": event_ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()
    })
}

/// Summary source answering from fixed payloads. Unknown ids and targets
/// fail like an exhausted fetch.
#[derive(Default)]
pub struct ScriptedSource {
    summaries: HashMap<String, Value>,
    scoreboards: HashMap<String, Value>,
    pub summary_fetches: AtomicUsize,
    pub scoreboard_fetches: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, event_id: &str, summary: Value) -> Self {
        self.summaries.insert(event_id.to_string(), summary);
        self
    }

    pub fn with_scoreboard(mut self, target: FetchTarget, scoreboard: Value) -> Self {
        self.scoreboards.insert(target.to_string(), scoreboard);
        self
    }

    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummarySource for ScriptedSource {
    async fn fetch_summary(&self, calendar: &SeasonCalendar, event_id: &str) -> espn_ingestion::Result<Value> {
        self.summary_fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(event_id.to_string());
        self.summaries.get(event_id).cloned().ok_or_else(|| IngestError::Fetch {
            url: format!("summary/{}/{}", calendar.league, event_id),
            attempts: 5,
            message: "status 404 Not Found".to_string(),
        })
    }

    async fn fetch_scoreboard(&self, calendar: &SeasonCalendar, target: &FetchTarget) -> espn_ingestion::Result<Value> {
        self.scoreboard_fetches.fetch_add(1, Ordering::SeqCst);
        self.scoreboards
            .get(&target.to_string())
            .cloned()
            .ok_or_else(|| IngestError::Fetch {
                url: format!("scoreboard/{}/{}", calendar.league, target),
                attempts: 5,
                message: "operation timed out".to_string(),
            })
    }
}

/// Memory store whose bulk writes always fail.
#[derive(Clone, Default)]
pub struct UnreachableStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl EventStore for UnreachableStore {
    async fn existing_ids(&self, league: &str, ids: &[String]) -> anyhow::Result<HashSet<String>> {
        self.inner.existing_ids(league, ids).await
    }

    async fn bulk_insert(&self, _records: &[EventRecord]) -> anyhow::Result<usize> {
        Err(anyhow!("connection refused"))
    }

    async fn load_state(&self, league: &str) -> anyhow::Result<Option<LeagueState>> {
        self.inner.load_state(league).await
    }

    async fn save_state(&self, league: &str, state: &LeagueState) -> anyhow::Result<()> {
        self.inner.save_state(league, state).await
    }
}
