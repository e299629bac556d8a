//! Integration tests for the database lifecycle, the write path and queries.
//!
//! Every test runs against the in-process engine over a temporary directory.

use alopex_tsdb::query::{OrderBy, Predicate};
use alopex_tsdb::{
    AggregateFunction, AggregateQuery, CreateOptions, DatabaseConfig, GroupAggregateQuery,
    JoinQuery, MetadataQuery, Row, SelectQuery, Status, Tag, Tsdb, TsdbError, WalConfig,
};
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tempfile::TempDir;

fn setup() -> (TempDir, Tsdb<alopex_tsdb::MemoryEngine>) {
    let temp_dir = TempDir::new().unwrap();
    let tsdb = Tsdb::in_memory();
    tsdb.create_database(temp_dir.path(), "test", &CreateOptions::default())
        .unwrap();
    (temp_dir, tsdb)
}

// ============================================================================
// Write / Select
// ============================================================================

/// Writes three points and reads them back in timestamp order.
#[test]
fn test_write_and_select_cpu_load() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();

    session.write("cpu.load host=a", 30, 0.3).unwrap();
    session.write("cpu.load host=a", 10, 0.1).unwrap();
    session.write("cpu.load host=a", 20, 0.2).unwrap();

    let query = SelectQuery::builder("cpu.load")
        .range(0, 100)
        .build()
        .unwrap();
    let mut cursor = session.query(&query).unwrap();

    let mut rows = Vec::new();
    while !cursor.done().unwrap() {
        if let Some(row) = cursor.next_row().unwrap() {
            rows.push(row);
        }
    }
    cursor.close().unwrap();

    assert_eq!(rows.len(), 3);
    for (row, (ts, value)) in rows.iter().zip([(10, 0.1), (20, 0.2), (30, 0.3)]) {
        assert_eq!(row.series(), Some("cpu.load host=a"));
        assert_eq!(row.timestamp(), Some(ts));
        assert_eq!(row.values(), &[value]);
        assert_eq!(row.metric(), Some("cpu.load"));
        assert_eq!(row.tags(), vec![Tag::new("host", "a")]);
    }
}

/// Data written in one session is visible after reopening the database.
#[test]
fn test_reopen_keeps_data() {
    let (temp_dir, tsdb) = setup();
    {
        let db = tsdb
            .open_database(temp_dir.path(), "test", DatabaseConfig::default())
            .unwrap();
        let session = db.session().unwrap();
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        session.write_at("mem host=a", time, 42.0).unwrap();
    }
    assert_eq!(tsdb.engine().open_databases(), 0);

    let config = DatabaseConfig {
        wal: Some(WalConfig::default()),
        ..Default::default()
    };
    let db = tsdb.open_database(temp_dir.path(), "test", config).unwrap();
    let session = db.session().unwrap();
    let rows: Vec<Row> = session
        .open_cursor(r#"{"select":"mem"}"#)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].time(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    );
}

/// Output ordering, value filters and paging reach the engine.
#[test]
fn test_select_clauses() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();
    for ts in 0..5 {
        session.write("disk host=a", ts, ts as f64).unwrap();
        session.write("disk host=b", ts, 10.0 + ts as f64).unwrap();
    }

    let query = SelectQuery::builder("disk")
        .range(0, 5)
        .order_by(OrderBy::Time)
        .filter(Predicate::GreaterOrEqual, 3.0)
        .filter(Predicate::LessThan, 12.0)
        .build()
        .unwrap();
    let rows: Vec<Row> = session
        .query(&query)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let got: Vec<_> = rows
        .iter()
        .map(|r| (r.timestamp().unwrap(), r.value()))
        .collect();
    assert_eq!(got, vec![(0, 10.0), (1, 11.0), (3, 3.0), (4, 4.0)]);

    let query = SelectQuery::builder("disk")
        .where_tag("host", &["b"])
        .range(5, 0)
        .limit(2)
        .build()
        .unwrap();
    let rows: Vec<Row> = session
        .query(&query)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let ts: Vec<_> = rows.iter().map(|r| r.timestamp().unwrap()).collect();
    assert_eq!(ts, vec![4, 3]);
}

// ============================================================================
// Join / Aggregate / Metadata
// ============================================================================

/// Join rows carry one slot per metric, NaN where a metric has no point.
#[test]
fn test_join_rows() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();
    session.write("cpu.usage host=a", 1, 0.5).unwrap();
    session.write("hdd.usage host=a", 1, 70.0).unwrap();
    session.write("hdd.usage host=a", 2, 71.0).unwrap();

    let query = JoinQuery::builder(&["cpu.usage", "hdd.usage"])
        .range(0, 10)
        .build()
        .unwrap();
    let rows: Vec<Row> = session
        .query(&query)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].metrics(), vec!["cpu.usage", "hdd.usage"]);
    assert_eq!(rows[0].values(), &[0.5, 70.0]);
    assert!(rows[1].values()[0].is_nan());
    assert_eq!(rows[1].values()[1], 71.0);
    assert_eq!(rows[1].tags(), vec![Tag::new("host", "a")]);
}

#[test]
fn test_aggregate_rows() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();
    for (ts, value) in [(1, 3.0), (2, 9.0), (3, 6.0)] {
        session.write("mem server=1", ts, value).unwrap();
    }

    let query = AggregateQuery::builder("mem", AggregateFunction::Max)
        .build()
        .unwrap();
    let rows: Vec<Row> = session
        .query(&query)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metric(), Some("mem"));
    assert_eq!(rows[0].aggregate_functions(), vec![AggregateFunction::Max]);
    assert_eq!(rows[0].value_of(AggregateFunction::Max), 9.0);
    assert_eq!(rows[0].timestamp(), Some(2));
}

#[test]
fn test_metadata_names() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();
    session.write("mem server=1", 1, 1.0).unwrap();
    session.write("mem server=2", 1, 1.0).unwrap();
    session.write("cpu server=1", 1, 1.0).unwrap();

    let all: Vec<String> = session
        .metadata(&MetadataQuery::all())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all, vec!["cpu server=1", "mem server=1", "mem server=2"]);

    let query = MetadataQuery::metric_with_tag("mem", "server", &["2"]).unwrap();
    let mut cursor = session.metadata(&query).unwrap();
    assert_eq!(cursor.next_name().unwrap().as_deref(), Some("mem server=2"));
    assert!(cursor.done().unwrap());
}

/// Queries the engine can't answer fail through the cursor.
#[test]
fn test_unsupported_query_fails_cursor() {
    let (temp_dir, tsdb) = setup();
    let db = tsdb
        .open_database(temp_dir.path(), "test", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();

    let query = GroupAggregateQuery::builder(
        &["mem"],
        Duration::from_secs(1),
        &[AggregateFunction::Mean],
    )
    .from(0)
    .build()
    .unwrap();
    let mut cursor = session.query(&query).unwrap();
    assert!(!cursor.can_proceed().unwrap());
    assert!(matches!(
        cursor.next_row(),
        Err(TsdbError::Engine(Status::NotImplemented))
    ));
}

// ============================================================================
// Create / Open / Remove
// ============================================================================

#[test]
fn test_create_open_remove() {
    let temp_dir = TempDir::new().unwrap();
    let tsdb = Tsdb::in_memory();

    let file = tsdb
        .create_database(temp_dir.path(), "metrics", &CreateOptions::default())
        .unwrap();
    assert!(file.exists());
    assert_eq!(file.file_name().unwrap(), "metrics.akumuli");

    assert!(matches!(
        tsdb.create_database(temp_dir.path(), "metrics", &CreateOptions::default()),
        Err(TsdbError::Engine(Status::General))
    ));

    let mut db = tsdb
        .open_database(temp_dir.path(), "metrics", DatabaseConfig::default())
        .unwrap();
    assert_eq!(db.path(), file);
    assert!(matches!(
        tsdb.remove_database(temp_dir.path(), "metrics"),
        Err(TsdbError::Engine(Status::Busy))
    ));

    db.close().unwrap();
    tsdb.remove_database(temp_dir.path(), "metrics").unwrap();
    assert!(!file.exists());
    assert!(matches!(
        tsdb.open_database(temp_dir.path(), "metrics", DatabaseConfig::default()),
        Err(TsdbError::DatabaseNotFound(_))
    ));
}

#[test]
fn test_invalid_options_rejected_before_engine() {
    let temp_dir = TempDir::new().unwrap();
    let tsdb = Tsdb::in_memory();

    let options = CreateOptions::new(0, 1024 * 1024, false);
    assert!(matches!(
        tsdb.create_database(temp_dir.path(), "db", &options),
        Err(TsdbError::InvalidConfig(_))
    ));

    tsdb.create_database(temp_dir.path(), "db", &CreateOptions::default())
        .unwrap();
    let config = DatabaseConfig {
        wal: Some(WalConfig::new(1, 1024 * 1024, 1)),
        ..Default::default()
    };
    let before = tsdb.engine().calls();
    assert!(matches!(
        tsdb.open_database(temp_dir.path(), "db", config),
        Err(TsdbError::InvalidConfig(_))
    ));
    assert_eq!(tsdb.engine().calls(), before);
}
