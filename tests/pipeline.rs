mod common;

use std::sync::atomic::Ordering;

use common::*;
use espn_ingestion::calendar::SeasonType;
use espn_ingestion::pending::{MemoryPendingIds, PendingIds};
use espn_ingestion::store::{EventStore, MemoryStore};
use espn_ingestion::{FetchTarget, IngestError, IngestionPipeline, LeagueState};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn pipeline(source: ScriptedSource) -> IngestionPipeline<ScriptedSource, MemoryStore, MemoryPendingIds> {
    IngestionPipeline::new(source, MemoryStore::new(), MemoryPendingIds::new())
}

#[tokio::test]
async fn test_same_event_is_stored_once_across_runs() {
    let source = ScriptedSource::new()
        .with_summary("401", summary("Georgia Bulldogs", "Auburn Tigers"))
        .with_summary("402", summary("Ohio State Buckeyes", "Penn State Nittany Lions"));
    let pipeline = pipeline(source);
    let calendar = calendar("college-football");

    let first = assert_ok!(pipeline.run(&calendar, &ids(&["401", "402", "401"])).await);
    assert_eq!(first.candidates, 2);
    assert_eq!(first.inserted, 2);

    let second = assert_ok!(pipeline.run(&calendar, &ids(&["402", "401"])).await);
    assert_eq!(second.already_stored, 2);
    assert_eq!(second.inserted, 0);

    assert_eq!(pipeline.store().event_count("college-football").await, 2);
    // stored ids are never fetched again
    assert_eq!(pipeline.source().summary_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bad_events_do_not_abort_the_batch() {
    let mut preseason = summary("Preseason Home", "Preseason Away");
    preseason["header"]["season"]["type"] = json!(1);
    let mut no_probabilities = summary("Texas Longhorns", "Oklahoma Sooners");
    no_probabilities.as_object_mut().unwrap().remove("winprobability");

    let source = ScriptedSource::new()
        .with_summary("1", summary("Georgia Bulldogs", "Auburn Tigers"))
        .with_summary("2", preseason)
        .with_summary("3", no_probabilities);
    let pipeline = pipeline(source);
    let calendar = calendar("college-football");

    let summary = assert_ok!(pipeline.run(&calendar, &ids(&["1", "2", "3", "4"])).await);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.incomplete.len(), 1);
    assert_eq!(summary.incomplete.reason("college-football", "3"), Some("win probs"));
    // skipped events leave no incomplete entry
    assert_eq!(summary.incomplete.reason("college-football", "2"), None);

    let record = pipeline.store().record("college-football", "1").await.unwrap();
    assert_eq!(record.event.winning_team.as_deref(), Some("Georgia Bulldogs"));
    assert!(record.predictions.iter().all(|p| p.moneyline.unwrap() > 1.0));
}

#[tokio::test]
async fn test_scheduled_weekly_collect_advances_state() {
    let target = FetchTarget::Week {
        season: 2025,
        season_type: SeasonType::Regular,
        week: 4,
    };
    let source = ScriptedSource::new()
        .with_scoreboard(target, scoreboard(&["501", "502", "501"]))
        .with_summary("501", summary("Alabama Crimson Tide", "LSU Tigers"))
        .with_summary("502", summary("Michigan Wolverines", "Iowa Hawkeyes"));
    let pipeline = pipeline(source);
    let calendar = calendar("college-football");
    let today = date(2025, 11, 4);

    let state = LeagueState {
        season_type: SeasonType::Regular,
        week: Some(3),
        last_collected_date: Some(date(2025, 10, 28)),
        is_offseason: false,
    };
    pipeline.store().save_state("college-football", &state).await.unwrap();

    let report = assert_ok!(pipeline.run_scheduled(&[calendar], today).await);
    let league = report.league("college-football").unwrap();
    assert_eq!(league.inserted, 2);
    assert_eq!(league.decision.as_deref(), Some("collect 2025 regular week 4"));
    assert_eq!(pipeline.source().fetched_ids(), ids(&["501", "502"]));

    let state = pipeline.store().load_state("college-football").await.unwrap().unwrap();
    assert_eq!(state.week, Some(4));
    assert_eq!(state.last_collected_date, Some(today));
    assert!(pipeline.pending().load("college-football").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_league_is_onboarded() {
    let target = FetchTarget::Week {
        season: 2025,
        season_type: SeasonType::Regular,
        week: 1,
    };
    let source = ScriptedSource::new().with_scoreboard(target, scoreboard(&[]));
    let pipeline = pipeline(source);

    assert_ok!(pipeline.run_scheduled(&[calendar("college-football")], date(2025, 11, 4)).await);

    let state = pipeline.store().load_state("college-football").await.unwrap().unwrap();
    assert_eq!(state.season_type, SeasonType::Regular);
    assert_eq!(state.week, Some(1));
}

#[tokio::test]
async fn test_ceremonial_week_advances_without_fetch() {
    let pipeline = pipeline(ScriptedSource::new());
    let state = LeagueState {
        season_type: SeasonType::Postseason,
        week: Some(2),
        last_collected_date: Some(date(2026, 1, 20)),
        is_offseason: false,
    };
    pipeline.store().save_state("nfl", &state).await.unwrap();

    let today = date(2026, 1, 27);
    let report = assert_ok!(pipeline.run_scheduled(&[calendar("nfl")], today).await);
    assert_eq!(report.fetch_failures(), 0);
    assert_eq!(pipeline.source().scoreboard_fetches.load(Ordering::SeqCst), 0);

    let state = pipeline.store().load_state("nfl").await.unwrap().unwrap();
    assert_eq!(state.season_type, SeasonType::Postseason);
    assert_eq!(state.week, Some(3));
    assert_eq!(state.last_collected_date, Some(today));
}

#[tokio::test]
async fn test_scoreboard_failure_keeps_state_for_next_run() {
    let pipeline = pipeline(ScriptedSource::new());
    let state = LeagueState {
        season_type: SeasonType::Regular,
        week: Some(9),
        last_collected_date: Some(date(2025, 11, 4)),
        is_offseason: false,
    };
    pipeline.store().save_state("college-football", &state).await.unwrap();

    let report = assert_ok!(
        pipeline
            .run_scheduled(&[calendar("college-football")], date(2025, 11, 11))
            .await
    );
    assert_eq!(report.fetch_failures(), 1);
    assert_eq!(
        pipeline.store().load_state("college-football").await.unwrap(),
        Some(state)
    );
}

#[tokio::test]
async fn test_daily_league_collects_yesterday() {
    let target = FetchTarget::Date(date(2025, 11, 3));
    let source = ScriptedSource::new()
        .with_scoreboard(target, scoreboard(&["701"]))
        .with_summary("701", summary("Boston Celtics", "Miami Heat"));
    let pipeline = pipeline(source);

    let report = assert_ok!(pipeline.run_scheduled(&[calendar("nba")], date(2025, 11, 4)).await);
    assert_eq!(report.inserted(), 1);

    let state = pipeline.store().load_state("nba").await.unwrap().unwrap();
    assert_eq!(state.last_collected_date, Some(date(2025, 11, 3)));
    assert_eq!(state.week, None);
}

#[tokio::test]
async fn test_leftover_pending_ids_are_ingested_on_skip_days() {
    let source = ScriptedSource::new().with_summary("801", summary("Duke Blue Devils", "North Carolina Tar Heels"));
    let pipeline = pipeline(source);
    pipeline.pending().push("college-football", &ids(&["801"])).await.unwrap();

    // Wednesday is not the check day
    let report = assert_ok!(
        pipeline
            .run_scheduled(&[calendar("college-football")], date(2025, 11, 5))
            .await
    );
    let league = report.league("college-football").unwrap();
    assert_eq!(league.decision.as_deref(), Some("skip: not the check day"));
    assert_eq!(league.inserted, 1);
    assert!(pipeline.pending().load("college-football").await.unwrap().is_empty());
    assert_eq!(pipeline.store().load_state("college-football").await.unwrap(), None);
}

#[tokio::test]
async fn test_configuration_error_aborts_the_run() {
    let pipeline = pipeline(ScriptedSource::new());
    let state = LeagueState {
        season_type: SeasonType::Regular,
        week: Some(20),
        last_collected_date: Some(date(2025, 10, 28)),
        is_offseason: false,
    };
    pipeline.store().save_state("college-football", &state).await.unwrap();

    let err = assert_err!(
        pipeline
            .run_scheduled(&calendars(), date(2025, 11, 4))
            .await
    );
    assert!(matches!(err, IngestError::Configuration(_)));
}

#[tokio::test]
async fn test_unreachable_store_aborts_and_keeps_pending_ids() {
    let source = ScriptedSource::new().with_summary("901", summary("Kansas Jayhawks", "Baylor Bears"));
    let pipeline = IngestionPipeline::new(source, UnreachableStore::default(), MemoryPendingIds::new());
    pipeline.pending().push("college-football", &ids(&["901"])).await.unwrap();

    let err = assert_err!(
        pipeline
            .run_scheduled(&[calendar("college-football")], date(2025, 11, 5))
            .await
    );
    assert!(matches!(err, IngestError::Persistence(_)));
    assert!(err.is_fatal());
    assert_eq!(
        pipeline.pending().load("college-football").await.unwrap(),
        ids(&["901"])
    );
}
