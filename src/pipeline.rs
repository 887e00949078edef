//! Ingestion pipeline.
//!
//! A scheduled run walks the leagues one after another: decide, gather the
//! scoreboard's event ids into the pending queue, advance the league state,
//! then ingest whatever is pending for the league.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::calendar::{audit_calendars, SeasonCalendar};
use crate::error::{IngestError, Result};
use crate::espn::{scoreboard_event_ids, SummarySource};
use crate::normalizer::{normalize, Normalized};
use crate::pending::{dedup_ids, PendingIds};
use crate::report::{LeagueRunSummary, RunReport};
use crate::scheduler::{decide, Decision, FetchTarget};
use crate::state::LeagueState;
use crate::store::EventStore;

pub struct IngestionPipeline<S, E, P> {
    source: S,
    store: E,
    pending: P,
}

impl<S, E, P> IngestionPipeline<S, E, P>
where
    S: SummarySource,
    E: EventStore,
    P: PendingIds,
{
    pub fn new(source: S, store: E, pending: P) -> Self {
        Self {
            source,
            store,
            pending,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &E {
        &self.store
    }

    pub fn pending(&self) -> &P {
        &self.pending
    }

    /// Ingest `candidate_ids` for one league.
    ///
    /// Ids already stored are skipped without fetching. A fetch failure or an
    /// incomplete payload only affects that event. Everything staged is
    /// written in one bulk insert, after which the candidates are dropped
    /// from the pending queue.
    pub async fn run(&self, calendar: &SeasonCalendar, candidate_ids: &[String]) -> Result<LeagueRunSummary> {
        let league = calendar.league.as_str();
        let mut summary = LeagueRunSummary::new(league);

        let candidates = dedup_ids(candidate_ids.iter().cloned());
        summary.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(summary);
        }

        let existing = self.store.existing_ids(league, &candidates).await?;
        summary.already_stored = existing.len();

        let mut staged = Vec::new();
        for event_id in candidates.iter().filter(|id| !existing.contains(*id)) {
            let raw = match self.source.fetch_summary(calendar, event_id).await {
                Ok(raw) => raw,
                Err(e) if !e.is_fatal() => {
                    warn!(league, event_id = %event_id, "Summary fetch failed: {}", e);
                    summary.fetch_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match normalize(league, event_id, &raw) {
                Ok(Normalized::Event(record)) => staged.push(*record),
                Ok(Normalized::Skipped(exclusion)) => {
                    debug!(league, event_id = %event_id, ?exclusion, "Event skipped");
                    summary.skipped += 1;
                }
                Err(reason) => {
                    warn!(league, event_id = %event_id, %reason, "Incomplete event data");
                    summary.incomplete.record(league, event_id, reason);
                }
            }
        }

        summary.inserted = self.store.bulk_insert(&staged).await?;
        self.pending.remove(league, &candidates).await?;

        info!(
            league,
            candidates = summary.candidates,
            already_stored = summary.already_stored,
            inserted = summary.inserted,
            skipped = summary.skipped,
            incomplete = summary.incomplete.len(),
            fetch_failures = summary.fetch_failures,
            "League ingestion finished"
        );
        Ok(summary)
    }

    /// One scheduled cycle over every calendar.
    ///
    /// Stops at the first configuration or persistence error. Fetch failures
    /// are counted in the report.
    pub async fn run_scheduled(&self, calendars: &[SeasonCalendar], today: NaiveDate) -> Result<RunReport> {
        let mut report = RunReport::new(today);

        for notice in audit_calendars(calendars, today) {
            warn!("Calendar needs attention: {}", notice);
            report.notices.push(notice.to_string());
        }

        for calendar in calendars {
            let summary = self.run_league(calendar, today).await?;
            report.leagues.push(summary);
        }

        info!(
            "Scheduled run for {} finished: {} events stored, {} incomplete, {} fetch failures",
            today,
            report.inserted(),
            report.incomplete().len(),
            report.fetch_failures()
        );
        Ok(report)
    }

    async fn run_league(&self, calendar: &SeasonCalendar, today: NaiveDate) -> Result<LeagueRunSummary> {
        let league = calendar.league.as_str();
        let state = match self.store.load_state(league).await? {
            Some(state) => state,
            None => {
                info!(league, "No stored state, onboarding league");
                LeagueState::onboard()
            }
        };

        let decision = decide(calendar, &state, today)?;
        info!(league, %decision, "Scheduler decision");

        let mut scoreboard_failures = 0;
        match &decision {
            Decision::Skip(_) => {}
            Decision::Collect(target) => {
                if self.gather(calendar, target).await? {
                    self.store
                        .save_state(league, &state.advanced(calendar, target, today))
                        .await?;
                } else {
                    scoreboard_failures += 1;
                }
            }
            Decision::CollectAndAdvance { target, new_state } => {
                let gathered = match target {
                    Some(target) => self.gather(calendar, target).await?,
                    None => true,
                };
                if gathered {
                    self.store.save_state(league, new_state).await?;
                } else {
                    scoreboard_failures += 1;
                }
            }
        }

        let pending = self.pending.load(league).await?;
        let mut summary = self.run(calendar, &pending).await?;
        summary.decision = Some(decision.to_string());
        summary.fetch_failures += scoreboard_failures;
        Ok(summary)
    }

    /// Queue the target's event ids. `Ok(false)` when the scoreboard could
    /// not be fetched, in which case the state must not advance.
    async fn gather(&self, calendar: &SeasonCalendar, target: &FetchTarget) -> Result<bool> {
        let scoreboard = match self.source.fetch_scoreboard(calendar, target).await {
            Ok(scoreboard) => scoreboard,
            Err(e @ IngestError::Fetch { .. }) => {
                warn!(league = %calendar.league, %target, "Scoreboard fetch failed: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let ids = scoreboard_event_ids(&scoreboard);
        info!(league = %calendar.league, %target, events = ids.len(), "Queued scoreboard events");
        self.pending.push(&calendar.league, &ids).await?;
        Ok(true)
    }
}
