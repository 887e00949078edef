//! Event and league-state persistence.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::calendar::SeasonType;
use crate::normalizer::EventRecord;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::state::LeagueState;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// The subset of `ids` already stored for `league`.
    async fn existing_ids(&self, league: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Store events and their predictions in one transaction. Events already
    /// present are left alone. Returns the number of events inserted.
    async fn bulk_insert(&self, records: &[EventRecord]) -> Result<usize>;

    async fn load_state(&self, league: &str) -> Result<Option<LeagueState>>;

    async fn save_state(&self, league: &str, state: &LeagueState) -> Result<()>;
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        league TEXT NOT NULL,
        espn_id TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL,
        season INTEGER NOT NULL,
        week INTEGER,
        season_type SMALLINT NOT NULL,
        is_neutral_site BOOLEAN NOT NULL DEFAULT FALSE,
        both_ranked_matchup BOOLEAN NOT NULL DEFAULT FALSE,
        one_ranked_matchup BOOLEAN NOT NULL DEFAULT FALSE,
        winning_team TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (league, espn_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS team_predictions (
        id UUID PRIMARY KEY,
        event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        team_name TEXT NOT NULL,
        team_rank INTEGER,
        side TEXT NOT NULL,
        win_probability DOUBLE PRECISION NOT NULL,
        moneyline DOUBLE PRECISION,
        is_winner BOOLEAN NOT NULL DEFAULT FALSE,
        opponent_name TEXT NOT NULL,
        opponent_rank INTEGER,
        UNIQUE (event_id, team_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS league_states (
        league TEXT PRIMARY KEY,
        season_type SMALLINT NOT NULL,
        week INTEGER,
        last_collected_date DATE,
        is_offseason BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Postgres-backed store
#[derive(Clone)]
pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str, max_attempts: u32) -> Result<Self> {
        let db = retry_with_backoff(
            &RetryPolicy::connection(max_attempts),
            "Database connection",
            |_: &sqlx::Error| true,
            || {
                PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(url)
            },
        )
        .await
        .map_err(|failure| {
            anyhow!(
                "Failed to connect to database after {} attempts: {}",
                failure.attempts,
                failure.error
            )
        })?;
        info!("Connected to PostgreSQL");
        Ok(Self::new(db))
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.db)
                .await
                .context("Failed to create schema")?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn existing_ids(&self, league: &str, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<String> =
            sqlx::query_scalar("SELECT espn_id FROM events WHERE league = $1 AND espn_id = ANY($2)")
                .bind(league)
                .bind(ids)
                .fetch_all(&self.db)
                .await
                .context("Failed to look up stored events")?;
        Ok(found.into_iter().collect())
    }

    async fn bulk_insert(&self, records: &[EventRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut inserted = 0;

        for record in records {
            let event = &record.event;
            let event_id: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO events (
                    id, league, espn_id, date, season, week, season_type,
                    is_neutral_site, both_ranked_matchup, one_ranked_matchup, winning_team
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (league, espn_id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&event.league)
            .bind(&event.event_id)
            .bind(event.date)
            .bind(event.season)
            .bind(event.week.map(|w| w as i32))
            .bind(i16::from(event.season_type.code()))
            .bind(event.is_neutral_site)
            .bind(event.both_ranked_matchup)
            .bind(event.one_ranked_matchup)
            .bind(&event.winning_team)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert event {}", event.event_id))?;

            // already stored by an earlier run
            let Some(event_id) = event_id else {
                continue;
            };

            for prediction in &record.predictions {
                sqlx::query(
                    r#"
                    INSERT INTO team_predictions (
                        id, event_id, team_name, team_rank, side, win_probability,
                        moneyline, is_winner, opponent_name, opponent_rank
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (event_id, team_name) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(event_id)
                .bind(&prediction.team_name)
                .bind(prediction.team_rank.map(|r| r as i32))
                .bind(prediction.side.as_str())
                .bind(prediction.win_probability)
                .bind(prediction.moneyline)
                .bind(prediction.is_winner)
                .bind(&prediction.opponent_name)
                .bind(prediction.opponent_rank.map(|r| r as i32))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert predictions for event {}", event.event_id))?;
            }
            inserted += 1;
        }

        tx.commit().await?;
        info!("Stored {} events ({} already present)", inserted, records.len() - inserted);
        Ok(inserted)
    }

    async fn load_state(&self, league: &str) -> Result<Option<LeagueState>> {
        let row: Option<(i16, Option<i32>, Option<NaiveDate>, bool)> = sqlx::query_as(
            "SELECT season_type, week, last_collected_date, is_offseason FROM league_states WHERE league = $1",
        )
        .bind(league)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("Failed to load state for {}", league))?;

        row.map(|(season_type, week, last_collected_date, is_offseason)| {
            Ok(LeagueState {
                season_type: SeasonType::from_code(i64::from(season_type))
                    .ok_or_else(|| anyhow!("Stored season type {} for {} is unknown", season_type, league))?,
                week: week.map(|w| w as u32),
                last_collected_date,
                is_offseason,
            })
        })
        .transpose()
    }

    async fn save_state(&self, league: &str, state: &LeagueState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO league_states (league, season_type, week, last_collected_date, is_offseason, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (league) DO UPDATE SET
                season_type = EXCLUDED.season_type,
                week = EXCLUDED.week,
                last_collected_date = EXCLUDED.last_collected_date,
                is_offseason = EXCLUDED.is_offseason,
                updated_at = NOW()
            "#,
        )
        .bind(league)
        .bind(i16::from(state.season_type.code()))
        .bind(state.week.map(|w| w as i32))
        .bind(state.last_collected_date)
        .bind(state.is_offseason)
        .execute(&self.db)
        .await
        .with_context(|| format!("Failed to save state for {}", league))?;
        Ok(())
    }
}

#[derive(Default)]
struct Tables {
    events: HashMap<(String, String), EventRecord>,
    states: HashMap<String, LeagueState>,
}

/// In-memory store keyed by (league, event id).
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self, league: &str) -> usize {
        let tables = self.inner.read().await;
        tables.events.keys().filter(|(l, _)| l == league).count()
    }

    pub async fn record(&self, league: &str, event_id: &str) -> Option<EventRecord> {
        let tables = self.inner.read().await;
        tables
            .events
            .get(&(league.to_string(), event_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn existing_ids(&self, league: &str, ids: &[String]) -> Result<HashSet<String>> {
        let tables = self.inner.read().await;
        Ok(ids
            .iter()
            .filter(|id| tables.events.contains_key(&(league.to_string(), (*id).clone())))
            .cloned()
            .collect())
    }

    async fn bulk_insert(&self, records: &[EventRecord]) -> Result<usize> {
        let mut tables = self.inner.write().await;
        let mut inserted = 0;
        for record in records {
            let key = (record.event.league.clone(), record.event.event_id.clone());
            if !tables.events.contains_key(&key) {
                tables.events.insert(key, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn load_state(&self, league: &str) -> Result<Option<LeagueState>> {
        Ok(self.inner.read().await.states.get(league).cloned())
    }

    async fn save_state(&self, league: &str, state: &LeagueState) -> Result<()> {
        self.inner
            .write()
            .await
            .states
            .insert(league.to_string(), state.clone());
        Ok(())
    }
}
