//! Last-collected position of a league.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{SeasonCalendar, SeasonType};
use crate::scheduler::FetchTarget;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueState {
    pub season_type: SeasonType,
    /// Last collected week. `None` for daily leagues, and for weekly leagues
    /// that have not collected anything this season.
    pub week: Option<u32>,
    pub last_collected_date: Option<NaiveDate>,
    /// May be stale; see [`crate::scheduler::is_offseason`].
    pub is_offseason: bool,
}

impl Default for LeagueState {
    fn default() -> Self {
        Self::onboard()
    }
}

impl LeagueState {
    /// State of a league that has never been collected.
    pub fn onboard() -> Self {
        Self {
            season_type: SeasonType::Regular,
            week: None,
            last_collected_date: None,
            is_offseason: false,
        }
    }

    /// State after `target` was collected successfully on `today`.
    pub fn advanced(&self, calendar: &SeasonCalendar, target: &FetchTarget, today: NaiveDate) -> Self {
        match *target {
            FetchTarget::Date(date) => Self {
                season_type: self.season_type,
                week: None,
                last_collected_date: Some(date),
                is_offseason: false,
            },
            FetchTarget::Week {
                season_type, week, ..
            } => {
                let final_week = season_type == SeasonType::Postseason
                    && calendar
                        .last_week(SeasonType::Postseason)
                        .is_ok_and(|last| last == week);
                Self {
                    season_type,
                    week: Some(week),
                    last_collected_date: Some(today),
                    is_offseason: final_week,
                }
            }
        }
    }
}
