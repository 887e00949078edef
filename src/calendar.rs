//! Per-league season calendars.
//!
//! A calendar is static configuration: when the season runs, when (if ever)
//! it pauses, how often the league is checked, and for weekly leagues which
//! week numbers exist in each season type. Nothing here names a league; the
//! weekly postseason behaviour is selected by [`PostseasonPolicy`].

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::{IngestError, Result};

/// ESPN season type code for pre-season events.
pub const PRESEASON_CODE: i64 = 1;

/// Season types that are collected. ESPN codes: 2 regular, 3 post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SeasonType {
    Regular,
    Postseason,
}

impl SeasonType {
    pub fn code(self) -> u8 {
        match self {
            SeasonType::Regular => 2,
            SeasonType::Postseason => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(SeasonType::Regular),
            3 => Some(SeasonType::Postseason),
            _ => None,
        }
    }
}

impl TryFrom<u8> for SeasonType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_code(code as i64).ok_or_else(|| format!("unknown season type code {code}"))
    }
}

impl From<SeasonType> for u8 {
    fn from(season_type: SeasonType) -> Self {
        season_type.code()
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeasonType::Regular => write!(f, "regular"),
            SeasonType::Postseason => write!(f, "postseason"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    /// Checked every day; each check covers the previous day
    Daily,
    /// Checked once a week on `check_day`
    Weekly,
}

/// How a weekly league moves through its postseason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostseasonPolicy {
    /// The whole postseason is fetched as its final week once the season
    /// window has closed.
    #[default]
    SimplePostseason,
    /// Postseason weeks are fetched one by one; week numbers missing from
    /// the postseason list are ceremonial and advanced over without a fetch.
    SkipWeekPostseason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonCalendar {
    /// ESPN league slug, e.g. "nfl" or "college-football"
    pub league: String,
    /// ESPN sport slug, e.g. "football"
    pub sport: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub check_type: CheckType,
    /// Weekday index, 0 = Monday. Required for weekly leagues.
    #[serde(default)]
    pub check_day: Option<u8>,
    pub season_start: NaiveDate,
    pub season_end: NaiveDate,
    #[serde(default)]
    pub break_start: Option<NaiveDate>,
    #[serde(default)]
    pub break_end: Option<NaiveDate>,
    #[serde(default)]
    pub season_type_weeks: BTreeMap<SeasonType, Vec<u32>>,
    #[serde(default)]
    pub policy: PostseasonPolicy,
    /// Extra scoreboard query parameters (e.g. `groups=80`)
    #[serde(default)]
    pub scoreboard_params: BTreeMap<String, String>,
}

impl SeasonCalendar {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.league)
    }

    /// Year ESPN files this season under.
    pub fn season_year(&self) -> i32 {
        self.season_start.year()
    }

    pub fn break_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.break_start.zip(self.break_end)
    }

    pub fn in_break(&self, date: NaiveDate) -> bool {
        self.break_window()
            .is_some_and(|(start, end)| start <= date && date <= end)
    }

    pub fn check_weekday(&self) -> Result<Weekday> {
        let day = self.check_day.ok_or_else(|| {
            IngestError::config(format!("{}: weekly league has no check day", self.league))
        })?;
        weekday_from_index(day).ok_or_else(|| {
            IngestError::config(format!("{}: check day {day} is not in 0..=6", self.league))
        })
    }

    /// Ordered week numbers for a season type.
    pub fn weeks(&self, season_type: SeasonType) -> Result<&[u32]> {
        match self.season_type_weeks.get(&season_type) {
            Some(weeks) if !weeks.is_empty() => Ok(weeks),
            _ => Err(IngestError::config(format!(
                "{}: no {season_type} weeks configured",
                self.league
            ))),
        }
    }

    pub fn first_week(&self, season_type: SeasonType) -> Result<u32> {
        Ok(self.weeks(season_type)?[0])
    }

    pub fn last_week(&self, season_type: SeasonType) -> Result<u32> {
        let weeks = self.weeks(season_type)?;
        Ok(weeks[weeks.len() - 1])
    }

    /// Check the calendar invariants. Every violation is reported in one
    /// message so an operator can fix them in a single pass.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.season_start >= self.season_end {
            problems.push("season start must be before season end".to_string());
        }

        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) => {
                if !(self.season_start < start && start <= end && end < self.season_end) {
                    problems.push("break window must sit inside the season".to_string());
                }
            }
            (None, None) => {}
            _ => problems.push("break needs both a start and an end date".to_string()),
        }

        if self.check_type == CheckType::Weekly {
            match self.check_day {
                None => problems.push("weekly leagues must specify a check day".to_string()),
                Some(day) if weekday_from_index(day).is_none() => {
                    problems.push(format!("check day {day} is not in 0..=6"))
                }
                Some(_) => {}
            }
            for season_type in [SeasonType::Regular, SeasonType::Postseason] {
                match self.season_type_weeks.get(&season_type) {
                    Some(weeks) if !weeks.is_empty() => {
                        if weeks[0] == 0 || weeks.windows(2).any(|w| w[0] >= w[1]) {
                            problems.push(format!(
                                "{season_type} weeks must be increasing and start at 1 or later"
                            ));
                        }
                    }
                    _ => problems.push(format!("no {season_type} weeks configured")),
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(IngestError::config(format!(
                "{}: {}",
                self.league,
                problems.join("; ")
            )))
        }
    }
}

fn weekday_from_index(day: u8) -> Option<Weekday> {
    match day {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse a JSON array of calendars. Validation happens when a calendar is
/// used, so one bad league is reported by the audit instead of hiding the
/// others.
pub fn parse_calendars(json: &str) -> Result<Vec<SeasonCalendar>> {
    let calendars: Vec<SeasonCalendar> = serde_json::from_str(json)
        .map_err(|e| IngestError::config(format!("invalid league calendar file: {e}")))?;

    let mut seen = HashSet::new();
    for calendar in &calendars {
        if !seen.insert(calendar.league.as_str()) {
            return Err(IngestError::config(format!(
                "league {} is configured more than once",
                calendar.league
            )));
        }
    }

    Ok(calendars)
}

pub fn load_calendars(path: impl AsRef<Path>) -> Result<Vec<SeasonCalendar>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        IngestError::config(format!("cannot read league calendars {}: {e}", path.display()))
    })?;
    parse_calendars(&json)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarNotice {
    Misconfigured { league: String, problem: String },
    SeasonEnded { league: String, season_end: NaiveDate },
}

impl fmt::Display for CalendarNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarNotice::Misconfigured { league, problem } => write!(
                f,
                "The stored {league} season dates are not properly configured: {problem}"
            ),
            CalendarNotice::SeasonEnded { league, season_end } => write!(
                f,
                "The current {league} season ended on {season_end}; season dates should be updated"
            ),
        }
    }
}

/// Operator-facing checks on calendar data.
pub fn audit_calendars(calendars: &[SeasonCalendar], today: NaiveDate) -> Vec<CalendarNotice> {
    let mut notices = Vec::new();

    for calendar in calendars {
        if let Err(e) = calendar.validate() {
            let problem = match e {
                IngestError::Configuration(message) => message,
                other => other.to_string(),
            };
            notices.push(CalendarNotice::Misconfigured {
                league: calendar.label().to_string(),
                problem,
            });
        }
        if today > calendar.season_end {
            notices.push(CalendarNotice::SeasonEnded {
                league: calendar.label().to_string(),
                season_end: calendar.season_end,
            });
        }
    }

    notices
}
