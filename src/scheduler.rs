//! Collection scheduling.
//!
//! [`decide`] is a pure function of the calendar, the league state and the
//! caller's notion of "today". It never reads a clock, so running it twice
//! with the same inputs yields the same [`Decision`].

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::calendar::{CheckType, PostseasonPolicy, SeasonCalendar, SeasonType};
use crate::error::{IngestError, Result};
use crate::state::LeagueState;

/// What to fetch from the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchTarget {
    /// All events played on a date (daily leagues)
    Date(NaiveDate),
    /// One week of a season type (weekly leagues)
    Week {
        season: i32,
        season_type: SeasonType,
        week: u32,
    },
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Date(date) => write!(f, "date {date}"),
            FetchTarget::Week {
                season,
                season_type,
                week,
            } => write!(f, "{season} {season_type} week {week}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotCheckDay,
    OutsideSeason,
    BreakWindow,
    Offseason,
    /// Regular season is done; the postseason is only retrievable once the
    /// season window closes
    AwaitingSeasonEnd,
    /// Postseason is collected and the calendar still describes that season
    SeasonComplete,
    NothingToCollect,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotCheckDay => "not the check day",
            SkipReason::OutsideSeason => "outside the season window",
            SkipReason::BreakWindow => "inside the break window",
            SkipReason::Offseason => "offseason",
            SkipReason::AwaitingSeasonEnd => "waiting for the season end",
            SkipReason::SeasonComplete => "season complete",
            SkipReason::NothingToCollect => "nothing to collect",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    /// Fetch the target, then persist `state.advanced(..)`
    Collect(FetchTarget),
    /// Persist `new_state` now; fetch `target` if there is one
    CollectAndAdvance {
        target: Option<FetchTarget>,
        new_state: LeagueState,
    },
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip(reason) => write!(f, "skip: {reason}"),
            Decision::Collect(target) => write!(f, "collect {target}"),
            Decision::CollectAndAdvance {
                target: Some(target),
                ..
            } => write!(f, "collect {target} and advance"),
            Decision::CollectAndAdvance {
                target: None,
                new_state,
            } => match new_state.week {
                Some(week) => write!(f, "advance to {} week {week} without fetching", new_state.season_type),
                None => write!(f, "advance without fetching"),
            },
        }
    }
}

/// True when the league should be treated as out of season.
///
/// A recorded season end that has passed wins over the stored flag, so a
/// calendar nobody updated cannot keep a league collecting. The stored flag
/// only matters until the (new) season start is reached.
pub fn is_offseason(calendar: &SeasonCalendar, state: &LeagueState, today: NaiveDate) -> bool {
    let Some(yesterday) = today.pred_opt() else {
        return false;
    };
    yesterday > calendar.season_end || (state.is_offseason && yesterday < calendar.season_start)
}

/// Decide whether to collect today and what.
pub fn decide(calendar: &SeasonCalendar, state: &LeagueState, today: NaiveDate) -> Result<Decision> {
    calendar.validate()?;

    // a day's events are only final once the day is over
    let yesterday = today
        .pred_opt()
        .ok_or_else(|| IngestError::config(format!("{today} has no previous day")))?;

    match calendar.check_type {
        CheckType::Daily => Ok(decide_daily(calendar, yesterday)),
        CheckType::Weekly => decide_weekly(calendar, state, today, yesterday),
    }
}

fn decide_daily(calendar: &SeasonCalendar, yesterday: NaiveDate) -> Decision {
    if yesterday < calendar.season_start || yesterday > calendar.season_end {
        return Decision::Skip(SkipReason::OutsideSeason);
    }
    if calendar.in_break(yesterday) {
        return Decision::Skip(SkipReason::BreakWindow);
    }
    Decision::Collect(FetchTarget::Date(yesterday))
}

fn decide_weekly(
    calendar: &SeasonCalendar,
    state: &LeagueState,
    today: NaiveDate,
    yesterday: NaiveDate,
) -> Result<Decision> {
    if today.weekday() != calendar.check_weekday()? {
        return Ok(Decision::Skip(SkipReason::NotCheckDay));
    }

    if is_offseason(calendar, state, today) && !postseason_outstanding(calendar, state)? {
        return Ok(Decision::Skip(SkipReason::Offseason));
    }

    match state.season_type {
        SeasonType::Regular => regular_season(calendar, state, yesterday),
        SeasonType::Postseason => postseason(calendar, state, today),
    }
}

/// Simple-postseason leagues fetch their postseason after the season end,
/// which the staleness rule would otherwise already call offseason.
fn postseason_outstanding(calendar: &SeasonCalendar, state: &LeagueState) -> Result<bool> {
    Ok(calendar.policy == PostseasonPolicy::SimplePostseason
        && state.season_type == SeasonType::Regular
        && state.week == Some(calendar.last_week(SeasonType::Regular)?))
}

fn week_target(calendar: &SeasonCalendar, season_type: SeasonType, week: u32) -> Decision {
    Decision::Collect(FetchTarget::Week {
        season: calendar.season_year(),
        season_type,
        week,
    })
}

fn regular_season(
    calendar: &SeasonCalendar,
    state: &LeagueState,
    yesterday: NaiveDate,
) -> Result<Decision> {
    let weeks = calendar.weeks(SeasonType::Regular)?;
    let last = calendar.last_week(SeasonType::Regular)?;

    let Some(week) = state.week else {
        return Ok(week_target(calendar, SeasonType::Regular, weeks[0]));
    };

    if week > last {
        return Err(IngestError::config(format!(
            "{}: regular week {week} is past the last configured week {last}",
            calendar.league
        )));
    }

    if week < last {
        let next = week + 1;
        if !weeks.contains(&next) {
            return Err(IngestError::config(format!(
                "{}: regular week {next} is not configured",
                calendar.league
            )));
        }
        return Ok(week_target(calendar, SeasonType::Regular, next));
    }

    match calendar.policy {
        PostseasonPolicy::SimplePostseason => {
            if yesterday >= calendar.season_end {
                let final_week = calendar.last_week(SeasonType::Postseason)?;
                Ok(week_target(calendar, SeasonType::Postseason, final_week))
            } else {
                Ok(Decision::Skip(SkipReason::AwaitingSeasonEnd))
            }
        }
        PostseasonPolicy::SkipWeekPostseason => {
            let first = calendar.first_week(SeasonType::Postseason)?;
            Ok(week_target(calendar, SeasonType::Postseason, first))
        }
    }
}

fn postseason(calendar: &SeasonCalendar, state: &LeagueState, today: NaiveDate) -> Result<Decision> {
    let weeks = calendar.weeks(SeasonType::Postseason)?;
    let last = calendar.last_week(SeasonType::Postseason)?;

    let week = state.week.ok_or_else(|| {
        IngestError::config(format!("{}: postseason state has no week", calendar.league))
    })?;

    if week > last {
        return Err(IngestError::config(format!(
            "{}: postseason week {week} is past the last configured week {last}",
            calendar.league
        )));
    }

    if week == last {
        // Roll over only once the calendar describes a season that started
        // after our last collection.
        let new_season = state
            .last_collected_date
            .map_or(true, |collected| collected < calendar.season_start);
        return if new_season {
            let first = calendar.first_week(SeasonType::Regular)?;
            Ok(week_target(calendar, SeasonType::Regular, first))
        } else {
            Ok(Decision::Skip(SkipReason::SeasonComplete))
        };
    }

    match calendar.policy {
        PostseasonPolicy::SimplePostseason => Ok(Decision::Skip(SkipReason::NothingToCollect)),
        PostseasonPolicy::SkipWeekPostseason => {
            let next = week + 1;
            if weeks.contains(&next) {
                return Ok(week_target(calendar, SeasonType::Postseason, next));
            }
            // ceremonial week: nothing to fetch, but move past it
            Ok(Decision::CollectAndAdvance {
                target: None,
                new_state: LeagueState {
                    season_type: SeasonType::Postseason,
                    week: Some(next),
                    last_collected_date: Some(today),
                    is_offseason: state.is_offseason,
                },
            })
        }
    }
}
