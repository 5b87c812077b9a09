// Tests for the run-metrics store

use chrono::{Local, TimeZone};
use shelfmap_core::data::MetricsStore;
use shelfmap_core::metrics::{MetricsRecord, RunMetrics};
use tempfile::TempDir;

fn create_test_store() -> (TempDir, MetricsStore) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("metadata.db");
    let store = MetricsStore::new(&db_path).unwrap();
    (temp_dir, store)
}

fn record(rows: usize, errors: usize) -> MetricsRecord {
    let started = Local.with_ymd_and_hms(2024, 3, 14, 9, 5, 0).unwrap();
    let ended = Local.with_ymd_and_hms(2024, 3, 14, 9, 7, 30).unwrap();
    RunMetrics::started_at(started).finish_at(ended, rows, errors, 3)
}

// ============================================================================
// Store Creation Tests
// ============================================================================

#[test]
fn test_store_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("metadata.db");

    assert!(!MetricsStore::exists(&db_path));
    let store = MetricsStore::new(&db_path);
    assert!(store.is_ok());
    assert!(MetricsStore::exists(&db_path));
}

#[test]
fn test_sheet_created_on_first_append() {
    let (_temp, store) = create_test_store();

    assert!(!store.has_sheet("Categorias").unwrap());
    store.append("Categorias", &record(300, 0)).unwrap();
    assert!(store.has_sheet("Categorias").unwrap());
}

#[test]
fn test_missing_sheet_reads_as_empty() {
    let store = MetricsStore::in_memory().unwrap();

    assert!(store.recent("Categorias", 10).unwrap().is_empty());
    assert_eq!(store.count("Categorias").unwrap(), 0);
}

// ============================================================================
// Append Tests
// ============================================================================

#[test]
fn test_append_round_trips_record() {
    let (_temp, store) = create_test_store();
    let original = record(300, 2);

    let id = store.append("Categorias", &original).unwrap();
    assert!(id > 0);

    let records = store.recent("Categorias", 10).unwrap();
    assert_eq!(records.len(), 1);
    let stored = &records[0];
    assert_eq!(stored.run_id, original.run_id);
    assert_eq!(stored.date, "14/03/2024");
    assert_eq!(stored.start, "09:05:00");
    assert_eq!(stored.end, "09:07:30");
    assert_eq!(stored.elapsed, "0:02:30");
    assert_eq!(stored.rows, 300);
    assert_eq!(stored.rows_per_minute, 120.0);
    assert_eq!(stored.errors, 2);
    assert_eq!(stored.reached_depth, 3);
}

#[test]
fn test_appends_never_overwrite() {
    let (_temp, store) = create_test_store();

    store.append("Categorias", &record(10, 0)).unwrap();
    store.append("Categorias", &record(20, 0)).unwrap();
    store.append("Categorias", &record(30, 1)).unwrap();

    assert_eq!(store.count("Categorias").unwrap(), 3);
    let recent: Vec<usize> = store
        .recent("Categorias", 2)
        .unwrap()
        .iter()
        .map(|r| r.rows)
        .collect();
    assert_eq!(recent, vec![30, 20]);
}

#[test]
fn test_same_run_cannot_be_appended_twice() {
    let (_temp, store) = create_test_store();
    let run = record(10, 0);

    store.append("Categorias", &run).unwrap();
    assert!(store.append("Categorias", &run).is_err());
    assert_eq!(store.count("Categorias").unwrap(), 1);
}

#[test]
fn test_sheets_are_independent() {
    let (_temp, store) = create_test_store();

    store.append("Categorias", &record(10, 0)).unwrap();
    store.append("Pruebas", &record(20, 0)).unwrap();

    assert_eq!(store.count("Categorias").unwrap(), 1);
    assert_eq!(store.count("Pruebas").unwrap(), 1);
}

#[test]
fn test_sheet_name_is_quoted() {
    let store = MetricsStore::in_memory().unwrap();
    let sheet = "runs\"; DROP TABLE x; --";

    store.append(sheet, &record(5, 0)).unwrap();

    assert!(store.has_sheet(sheet).unwrap());
    assert_eq!(store.recent(sheet, 1).unwrap()[0].rows, 5);
}

#[test]
fn test_rows_per_minute_stored_as_real() {
    let store = MetricsStore::in_memory().unwrap();
    store.append("Categorias", &record(7, 0)).unwrap();

    let kind: String = store
        .get_connection()
        .query_row(
            "SELECT typeof(rows_per_minute) FROM \"Categorias\"",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(kind, "real");
}

#[test]
fn test_store_persists_across_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("metadata.db");

    {
        let store = MetricsStore::new(&db_path).unwrap();
        store.append("Categorias", &record(42, 0)).unwrap();
    }

    let store = MetricsStore::new(&db_path).unwrap();
    assert_eq!(store.recent("Categorias", 1).unwrap()[0].rows, 42);
}
