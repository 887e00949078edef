//! ESPN Event Ingestion
//!
//! Decides per league and per day whether ESPN data should be collected,
//! normalizes event summaries into events with two team predictions each,
//! and stores them without duplicates.
//!
//! - [`scheduler`]: season-state advancement (daily and weekly leagues)
//! - [`normalizer`]: event summary to [`normalizer::EventRecord`]
//! - [`pipeline`]: scheduled runs tying fetch, normalize and store together

pub mod calendar;
pub mod config;
pub mod error;
pub mod espn;
pub mod health;
pub mod normalizer;
pub mod odds;
pub mod pending;
pub mod pipeline;
pub mod preview;
pub mod probability;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod store;

pub use calendar::{load_calendars, SeasonCalendar, SeasonType};
pub use error::{IngestError, Result};
pub use normalizer::{normalize, EventRecord, IncompleteReason, Normalized};
pub use odds::american_to_decimal;
pub use pipeline::IngestionPipeline;
pub use scheduler::{decide, Decision, FetchTarget, SkipReason};
pub use state::LeagueState;
