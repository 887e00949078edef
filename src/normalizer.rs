//! Event summary normalization.
//!
//! Turns one ESPN event summary into an [`EventRecord`]. Every required field
//! is a gate: the first missing one short-circuits with an
//! [`IncompleteReason`]. Pre-season, postponed and canceled events are not
//! incomplete, they are [`Normalized::Skipped`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::calendar::{SeasonType, PRESEASON_CODE};
use crate::odds::{american_to_decimal, moneyline_from_json};

const STATUS_CANCELED: &str = "5";
const STATUS_POSTPONED: &str = "6";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
    Neutral,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
            Side::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub league: String,
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub season: i32,
    pub week: Option<u32>,
    pub season_type: SeasonType,
    pub is_neutral_site: bool,
    pub both_ranked_matchup: bool,
    pub one_ranked_matchup: bool,
    pub winning_team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamPrediction {
    pub team_name: String,
    pub team_rank: Option<u32>,
    pub side: Side,
    /// Percentage in 0..=100
    pub win_probability: f64,
    /// Decimal odds
    pub moneyline: Option<f64>,
    pub is_winner: bool,
    pub opponent_name: String,
    pub opponent_rank: Option<u32>,
}

/// An event together with the two predictions it owns (home first).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub event: Event,
    pub predictions: [TeamPrediction; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncompleteReason {
    SeasonHeader,
    SeasonType,
    Competition,
    EventDate,
    HomeAway,
    TeamName,
    WinProbs,
}

impl IncompleteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IncompleteReason::SeasonHeader => "season/header",
            IncompleteReason::SeasonType => "season type",
            IncompleteReason::Competition => "competition",
            IncompleteReason::EventDate => "date",
            IncompleteReason::HomeAway => "home/away",
            IncompleteReason::TeamName => "team name",
            IncompleteReason::WinProbs => "win probs",
        }
    }
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events left out on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Preseason,
    Canceled,
    Postponed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(Box<EventRecord>),
    Skipped(Exclusion),
}

struct Competitor {
    name: Option<String>,
    rank: Option<u32>,
    winner: bool,
}

impl Competitor {
    fn read(value: &Value) -> Self {
        Self {
            name: value["team"]["displayName"]
                .as_str()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            rank: read_rank(&value["rank"]),
            winner: value["winner"].as_bool().unwrap_or(false),
        }
    }
}

/// A rank is present when the field exists and is not null.
fn read_rank(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|r| u32::try_from(r).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse ESPN competition dates. ESPN often omits seconds ("2025-09-07T17:00Z"),
/// which strict RFC 3339 parsing rejects.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(naive) = raw.strip_suffix('Z') {
        return ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z")
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn status_id(competition: &Value) -> Option<String> {
    let id = &competition["status"]["type"]["id"];
    id.as_str()
        .map(str::to_string)
        .or_else(|| id.as_i64().map(|n| n.to_string()))
}

fn first_object(value: &Value) -> Option<&Value> {
    value
        .as_array()
        .and_then(|items| items.first())
        .filter(|item| item.as_object().is_some_and(|map| !map.is_empty()))
}

/// Normalize one event summary.
pub fn normalize(
    league: &str,
    event_id: &str,
    summary: &Value,
) -> Result<Normalized, IncompleteReason> {
    let header = &summary["header"];
    let season = header
        .get("season")
        .filter(|season| season.is_object())
        .ok_or(IncompleteReason::SeasonHeader)?;

    let season_code = season["type"].as_i64().ok_or(IncompleteReason::SeasonType)?;
    if season_code == PRESEASON_CODE {
        return Ok(Normalized::Skipped(Exclusion::Preseason));
    }
    let season_type = SeasonType::from_code(season_code).ok_or(IncompleteReason::SeasonType)?;
    let season_year = season["year"]
        .as_i64()
        .and_then(|year| i32::try_from(year).ok())
        .ok_or(IncompleteReason::SeasonHeader)?;
    let week = header["week"].as_u64().and_then(|week| u32::try_from(week).ok());

    let competition = first_object(&header["competitions"]).ok_or(IncompleteReason::Competition)?;

    match status_id(competition).as_deref() {
        Some(STATUS_CANCELED) => return Ok(Normalized::Skipped(Exclusion::Canceled)),
        Some(STATUS_POSTPONED) => return Ok(Normalized::Skipped(Exclusion::Postponed)),
        _ => {}
    }

    let date = competition["date"]
        .as_str()
        .and_then(parse_event_time)
        .ok_or(IncompleteReason::EventDate)?;

    let competitors = competition["competitors"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let find_side = |side: &str| {
        competitors
            .iter()
            .find(|c| c["homeAway"].as_str() == Some(side))
            .map(Competitor::read)
    };
    let (home, away) = match (find_side("home"), find_side("away")) {
        (Some(home), Some(away)) => (home, away),
        _ => return Err(IncompleteReason::HomeAway),
    };

    let (home_name, away_name) = match (home.name.clone(), away.name.clone()) {
        (Some(home_name), Some(away_name)) => (home_name, away_name),
        _ => return Err(IncompleteReason::TeamName),
    };
    // one prediction per (event, team)
    if home_name == away_name {
        return Err(IncompleteReason::HomeAway);
    }

    let both_ranked_matchup = home.rank.is_some() && away.rank.is_some();
    let one_ranked_matchup = home.rank.is_some() != away.rank.is_some();
    let neutral_site = competition["neutralSite"].as_bool().unwrap_or(false);

    let pregame = first_object(&summary["winprobability"]).ok_or(IncompleteReason::WinProbs)?;
    let home_fraction = pregame["homeWinPercentage"]
        .as_f64()
        .ok_or(IncompleteReason::WinProbs)?;
    let home_win_probability = home_fraction * 100.0;
    let away_win_probability = 100.0 - home_win_probability;

    let betting = summary["pickcenter"]
        .as_array()
        .and_then(|lines| lines.first())
        .unwrap_or(&Value::Null);
    let home_moneyline = american_to_decimal(moneyline_from_json(&betting["homeTeamOdds"]["moneyLine"]));
    let away_moneyline = american_to_decimal(moneyline_from_json(&betting["awayTeamOdds"]["moneyLine"]));

    let (home_side, away_side) = if neutral_site {
        (Side::Neutral, Side::Neutral)
    } else {
        (Side::Home, Side::Away)
    };

    let winning_team = match (home.winner, away.winner) {
        (true, false) => Some(home_name.clone()),
        (false, true) => Some(away_name.clone()),
        _ => None,
    };

    let event = Event {
        league: league.to_string(),
        event_id: event_id.to_string(),
        date,
        season: season_year,
        week,
        season_type,
        is_neutral_site: neutral_site,
        both_ranked_matchup,
        one_ranked_matchup,
        winning_team,
    };

    let home_prediction = TeamPrediction {
        team_name: home_name.clone(),
        team_rank: home.rank,
        side: home_side,
        win_probability: home_win_probability,
        moneyline: home_moneyline,
        is_winner: home.winner,
        opponent_name: away_name.clone(),
        opponent_rank: away.rank,
    };
    let away_prediction = TeamPrediction {
        team_name: away_name,
        team_rank: away.rank,
        side: away_side,
        win_probability: away_win_probability,
        moneyline: away_moneyline,
        is_winner: away.winner,
        opponent_name: home_name,
        opponent_rank: home.rank,
    };

    Ok(Normalized::Event(Box::new(EventRecord {
        event,
        predictions: [home_prediction, away_prediction],
    })))
}
