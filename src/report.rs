//! Per-run reports written for operators.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::normalizer::IncompleteReason;

pub const INCOMPLETE_REPORT_FILE: &str = "incomplete_data_events.json";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// league -> event id -> reason
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IncompleteReport {
    leagues: BTreeMap<String, BTreeMap<String, String>>,
}

impl IncompleteReport {
    pub fn record(&mut self, league: &str, event_id: &str, reason: IncompleteReason) {
        self.leagues
            .entry(league.to_string())
            .or_default()
            .insert(event_id.to_string(), reason.to_string());
    }

    pub fn reason(&self, league: &str, event_id: &str) -> Option<&str> {
        self.leagues.get(league)?.get(event_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.leagues.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn merge(&mut self, other: IncompleteReport) {
        for (league, events) in other.leagues {
            self.leagues.entry(league).or_default().extend(events);
        }
    }
}

/// Outcome of one league in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeagueRunSummary {
    pub league: String,
    /// What the scheduler decided, in words
    pub decision: Option<String>,
    pub candidates: usize,
    pub already_stored: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub fetch_failures: usize,
    pub incomplete: IncompleteReport,
}

impl LeagueRunSummary {
    pub fn new(league: &str) -> Self {
        Self {
            league: league.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub today: NaiveDate,
    pub notices: Vec<String>,
    pub leagues: Vec<LeagueRunSummary>,
}

impl RunReport {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            notices: Vec::new(),
            leagues: Vec::new(),
        }
    }

    pub fn league(&self, league: &str) -> Option<&LeagueRunSummary> {
        self.leagues.iter().find(|summary| summary.league == league)
    }

    pub fn inserted(&self) -> usize {
        self.leagues.iter().map(|summary| summary.inserted).sum()
    }

    pub fn fetch_failures(&self) -> usize {
        self.leagues.iter().map(|summary| summary.fetch_failures).sum()
    }

    pub fn incomplete(&self) -> IncompleteReport {
        let mut report = IncompleteReport::default();
        for summary in &self.leagues {
            report.merge(summary.incomplete.clone());
        }
        report
    }

    /// Write the incomplete-data report and the run summary into `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

        let incomplete = self.incomplete();
        write_json(&dir.join(INCOMPLETE_REPORT_FILE), &incomplete)?;
        write_json(&dir.join(RUN_SUMMARY_FILE), self)?;

        info!(
            "Wrote reports to {} ({} incomplete events)",
            dir.display(),
            incomplete.len()
        );
        Ok(())
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}
