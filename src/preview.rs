//! Matchup previews for upcoming games.
//!
//! A preview starts from a scoreboard event and is enriched later with the
//! event summary (win probabilities, moneylines, venue).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::normalizer::parse_event_time;
use crate::odds::{american_to_decimal, moneyline_from_json};
use crate::probability::ProbabilityExtractor;

/// Ranks outside the poll are not shown.
pub const MAX_DISPLAYED_RANK: u32 = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewTeam {
    pub name: String,
    pub rank: Option<u32>,
    pub win_probability: Option<f64>,
    pub moneyline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Venue {
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub indoor: Option<bool>,
}

impl Venue {
    fn read(value: &Value) -> Self {
        let text = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            name: text(&value["fullName"]).or_else(|| text(&value["name"])),
            city: text(&value["address"]["city"]),
            state: text(&value["address"]["state"]),
            indoor: value["indoor"].as_bool(),
        }
    }

    /// Fill fields that are still empty from `other`.
    fn fill_from(&mut self, other: Venue) {
        self.name = self.name.take().or(other.name);
        self.city = self.city.take().or(other.city);
        self.state = self.state.take().or(other.state);
        self.indoor = self.indoor.or(other.indoor);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchupPreview {
    pub event_id: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub home: PreviewTeam,
    pub away: PreviewTeam,
    pub neutral_site: bool,
    pub venue: Venue,
}

fn preview_team(competitor: &Value) -> PreviewTeam {
    let team = &competitor["team"];
    let name = team["shortDisplayName"]
        .as_str()
        .or_else(|| team["displayName"].as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("Not Found")
        .to_string();
    let rank = competitor["curatedRank"]["current"]
        .as_u64()
        .and_then(|rank| u32::try_from(rank).ok())
        .filter(|rank| *rank <= MAX_DISPLAYED_RANK);
    PreviewTeam {
        name,
        rank,
        win_probability: None,
        moneyline: None,
    }
}

/// One preview per scoreboard event that names both a home and an away side.
pub fn previews_from_scoreboard(scoreboard: &Value) -> Vec<MatchupPreview> {
    let Some(events) = scoreboard["events"].as_array() else {
        return Vec::new();
    };

    let mut previews = Vec::with_capacity(events.len());
    for event in events {
        let competition = &event["competitions"][0];
        let competitors = competition["competitors"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        let side = |name: &str| competitors.iter().find(|c| c["homeAway"].as_str() == Some(name));
        let (Some(home), Some(away)) = (side("home"), side("away")) else {
            tracing::debug!(event = %event["id"], "scoreboard event without home/away, no preview");
            continue;
        };
        let Some(event_id) = crate::espn::event_id(&event["id"]) else {
            continue;
        };

        previews.push(MatchupPreview {
            event_id,
            kickoff: event["date"]
                .as_str()
                .or_else(|| competition["date"].as_str())
                .and_then(parse_event_time),
            home: preview_team(home),
            away: preview_team(away),
            neutral_site: competition["neutralSite"].as_bool().unwrap_or(false),
            venue: Venue::read(&competition["venue"]),
        });
    }
    previews
}

impl MatchupPreview {
    /// Enrich with the event summary.
    pub fn apply_summary(&mut self, summary: &Value, extractor: &ProbabilityExtractor) {
        if let Some(found) = extractor.extract(summary) {
            self.home.win_probability = found.home;
            self.away.win_probability = found.away;
        }

        let betting = &summary["pickcenter"][0];
        self.home.moneyline = american_to_decimal(moneyline_from_json(&betting["homeTeamOdds"]["moneyLine"]));
        self.away.moneyline = american_to_decimal(moneyline_from_json(&betting["awayTeamOdds"]["moneyLine"]));

        for venue in [&summary["competitions"][0]["venue"], &summary["gameInfo"]["venue"]] {
            if venue.is_object() {
                self.venue.fill_from(Venue::read(venue));
            }
        }
    }
}
