use ci_status_poster::aggregate::AggregatedPayload;
use ci_status_poster::config::TestType;
use ci_status_poster::history::{
    delta, record_and_fetch, Delta, HistoryStore, SqliteHistoryStore,
};
use rust_decimal::Decimal;
use tempfile::TempDir;

const BRANCH: &str = "COOL-NAME-8-unit-tests";
const BUILD_START_TIME_FIRST_RUN: i64 = 1520333673;
const BUILD_START_TIME_SECOND_RUN: i64 = 1520334089;

fn pylint_payload(score: i64) -> AggregatedPayload {
    [(TestType::new("pylint"), Decimal::from(score))]
        .into_iter()
        .collect()
}

#[test]
fn test_record_and_fetch_returns_new_record() {
    let store = SqliteHistoryStore::open_in_memory().unwrap();
    let records =
        record_and_fetch(&store, BRANCH, BUILD_START_TIME_FIRST_RUN, &pylint_payload(100)).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].branch, BRANCH);
    assert_eq!(records[0].build_start_time, BUILD_START_TIME_FIRST_RUN);
    assert_eq!(
        delta(&TestType::new("pylint"), &records),
        Delta::FirstBuild
    );
}

#[test]
fn test_two_runs_give_negative_delta() {
    let store = SqliteHistoryStore::open_in_memory().unwrap();
    record_and_fetch(&store, BRANCH, BUILD_START_TIME_FIRST_RUN, &pylint_payload(100)).unwrap();
    let records =
        record_and_fetch(&store, BRANCH, BUILD_START_TIME_SECOND_RUN, &pylint_payload(90)).unwrap();

    assert_eq!(
        delta(&TestType::new("pylint"), &records),
        Delta::Change(Decimal::from(-10))
    );
}

#[test]
fn test_branches_are_partitioned() {
    let store = SqliteHistoryStore::open_in_memory().unwrap();
    record_and_fetch(&store, "main", 1, &pylint_payload(100)).unwrap();
    let records = record_and_fetch(&store, BRANCH, 2, &pylint_payload(80)).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(store.query_by_partition("main").unwrap().len(), 1);
    assert!(store.query_by_partition("unknown").unwrap().is_empty());
}

#[test]
fn test_query_is_idempotent() {
    let store = SqliteHistoryStore::open_in_memory().unwrap();
    record_and_fetch(&store, BRANCH, 1, &pylint_payload(100)).unwrap();
    record_and_fetch(&store, BRANCH, 2, &pylint_payload(95)).unwrap();

    let first = store.query_by_partition(BRANCH).unwrap();
    let second = store.query_by_partition(BRANCH).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("history.db");

    {
        let store = SqliteHistoryStore::new(&db_path).unwrap();
        record_and_fetch(&store, BRANCH, 1, &pylint_payload(100)).unwrap();
    }

    let store = SqliteHistoryStore::new(&db_path).unwrap();
    let records = record_and_fetch(&store, BRANCH, 2, &pylint_payload(90)).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0].scores.get(&TestType::new("pylint")),
        Some(Decimal::from(100))
    );
}

#[test]
fn test_decimal_scores_round_trip_exactly() {
    let store = SqliteHistoryStore::open_in_memory().unwrap();
    let payload: AggregatedPayload = [
        (TestType::new("pytest"), Decimal::new(875, 1)),
        (TestType::new("coverage"), Decimal::new(9133, 2)),
    ]
    .into_iter()
    .collect();

    let records = record_and_fetch(&store, BRANCH, 1, &payload).unwrap();
    assert_eq!(records[0].scores, payload);
}
