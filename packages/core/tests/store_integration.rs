//! Integration tests for the fee telemetry store.
//!
//! Most tests run against an in-memory SQLite pool with all migrations
//! applied. Concurrency and reopen tests use a file database in a temp
//! directory, the same way the binary runs in production.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use sqlx::Row;
use tempfile::TempDir;

use stellar_fee_store::{
    config::Config,
    db,
    repository::{FeeRepository, FeeTelemetryStore},
    types::{NewFeeDataPoint, NewFeeSnapshot, TimeRange},
};

// ---- Helpers ----------------------------------------------------------------

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn point_at(fee_amount: u64, timestamp: DateTime<Utc>) -> NewFeeDataPoint {
    NewFeeDataPoint {
        fee_amount,
        timestamp,
        transaction_hash: format!("txhash{:06}", fee_amount),
        ledger_sequence: 50_000_000 + fee_amount,
    }
}

fn snapshot_at(avg_fee: &str, captured_at: DateTime<Utc>) -> NewFeeSnapshot {
    NewFeeSnapshot {
        base_fee: "100".into(),
        min_fee: "100".into(),
        max_fee: "5000".into(),
        avg_fee: avg_fee.into(),
        captured_at,
    }
}

async fn memory_repo() -> FeeRepository {
    FeeRepository::new(db::create_pool("sqlite::memory:").await.unwrap())
}

/// File-backed repository. The `TempDir` must outlive the repository.
async fn file_repo() -> (FeeRepository, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        database_url: format!("sqlite://{}", dir.path().join("fees.db").display()),
        max_connections: 8,
        busy_timeout_ms: 10_000,
    };
    let pool = db::connect(&config).await.unwrap();
    (FeeRepository::new(pool), dir)
}

// ---- Example scenario -------------------------------------------------------

#[tokio::test]
async fn two_points_five_minutes_apart_come_back_in_order() {
    let repo = memory_repo().await;

    let first = NewFeeDataPoint {
        fee_amount: 100,
        timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
        transaction_hash: "abc123".into(),
        ledger_sequence: 42,
    };
    let id = repo.insert_fee_point(&first).await.unwrap();
    assert_eq!(id, 1);

    let stored = repo.get_fee_point(id).await.unwrap().expect("readable immediately");
    assert_eq!(stored.transaction_hash, "abc123");
    assert!(stored.created_at <= Utc::now() + Duration::seconds(2));

    let second = NewFeeDataPoint {
        timestamp: "2024-01-01T00:05:00Z".parse().unwrap(),
        ..first.clone()
    };
    let second_id = repo.insert_fee_point(&second).await.unwrap();

    let range = TimeRange::new(
        "2024-01-01T00:00:00Z".parse().unwrap(),
        "2024-01-01T00:05:00Z".parse().unwrap(),
    )
    .unwrap();
    let points = repo.fee_points_between(range).await.unwrap();

    let ids: Vec<i64> = points.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![id, second_id]);
    assert!(points[0].timestamp < points[1].timestamp);
}

// ---- Schema -----------------------------------------------------------------

#[tokio::test]
async fn range_queries_use_the_time_indexes() {
    let repo = memory_repo().await;

    let plans = [
        (
            "EXPLAIN QUERY PLAN
             SELECT id FROM fee_data_points
             WHERE timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC, id ASC",
            "idx_fee_data_points_timestamp",
        ),
        (
            "EXPLAIN QUERY PLAN
             SELECT id FROM fee_snapshots
             WHERE captured_at >= ? AND captured_at < ?
             ORDER BY captured_at ASC, id ASC",
            "idx_fee_snapshots_captured_at",
        ),
    ];

    for (sql, index) in plans {
        let rows = sqlx::query(sql)
            .bind("2024-01-01T00:00:00")
            .bind("2024-01-02T00:00:01")
            .fetch_all(repo.pool())
            .await
            .unwrap();

        let details: Vec<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("detail"))
            .collect();
        assert!(
            details.iter().any(|d| d.contains(index)),
            "expected {} in plan {:?}",
            index,
            details
        );
    }
}

#[tokio::test]
async fn reopening_a_file_database_keeps_rows_and_ids() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("fees.db").display());

    let first_id = {
        let repo = FeeRepository::new(db::create_pool(&url).await.unwrap());
        let id = repo
            .insert_fee_point(&point_at(100, base_time()))
            .await
            .unwrap();
        repo.close().await;
        id
    };

    // Migrations run again on reconnect and must not disturb existing rows.
    let repo = FeeRepository::new(db::create_pool(&url).await.unwrap());
    assert_eq!(repo.count_fee_points().await.unwrap(), 1);

    let next_id = repo
        .insert_fee_point(&point_at(200, base_time()))
        .await
        .unwrap();
    assert!(next_id > first_id);
    repo.close().await;
}

// ---- Concurrency ------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_get_unique_ids_and_lose_nothing() {
    let (repo, _dir) = file_repo().await;
    let store: Arc<dyn FeeTelemetryStore + Send + Sync> = Arc::new(repo.clone());

    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 25;

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..PER_WRITER {
                let fee = writer * 1_000 + i;
                let ts = base_time() + Duration::seconds(fee as i64);
                ids.push(store.insert_fee_point(&point_at(fee, ts)).await.unwrap());
            }
            ids
        }));
    }

    // An independent snapshot writer runs alongside the point writers.
    let snapshot_store = store.clone();
    let snapshot_writer = tokio::spawn(async move {
        let mut ids = Vec::new();
        for i in 0..10 {
            let ts = base_time() + Duration::minutes(i);
            ids.push(
                snapshot_store
                    .insert_snapshot(&snapshot_at("213", ts))
                    .await
                    .unwrap(),
            );
        }
        ids
    });

    let mut all_ids = HashSet::new();
    for handle in handles {
        let ids = handle.await.unwrap();
        // Each writer sees its own ids strictly increasing.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all_ids.extend(ids);
    }
    let snapshot_ids = snapshot_writer.await.unwrap();

    assert_eq!(all_ids.len() as u64, WRITERS * PER_WRITER);
    assert_eq!(repo.count_fee_points().await.unwrap() as u64, WRITERS * PER_WRITER);
    assert_eq!(snapshot_ids.len(), 10);
    assert_eq!(repo.count_snapshots().await.unwrap(), 10);

    repo.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_partial_batches() {
    let (repo, _dir) = file_repo().await;

    const BATCH: usize = 20;
    const BATCHES: usize = 10;

    let writer_repo = repo.clone();
    let writer = tokio::spawn(async move {
        for b in 0..BATCHES {
            let batch: Vec<NewFeeDataPoint> = (0..BATCH)
                .map(|i| {
                    let fee = (b * BATCH + i) as u64;
                    point_at(fee, base_time() + Duration::seconds(fee as i64))
                })
                .collect();
            writer_repo.insert_fee_points(&batch).await.unwrap();
        }
    });

    let reader_repo = repo.clone();
    let reader = tokio::spawn(async move {
        let all = TimeRange::new(base_time(), base_time() + Duration::days(1)).unwrap();
        for _ in 0..50 {
            let seen = reader_repo.fee_points_between(all).await.unwrap().len();
            assert_eq!(seen % BATCH, 0, "observed a partial batch of {} rows", seen);
            tokio::task::yield_now().await;
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();

    assert_eq!(repo.count_fee_points().await.unwrap() as usize, BATCH * BATCHES);
    repo.close().await;
}

// ---- Properties -------------------------------------------------------------

fn offsets_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..10_000, 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Range queries return exactly the in-bounds rows, ordered by time then id.
    #[test]
    fn prop_point_range_query_matches_filter(
        offsets in offsets_strategy(),
        a in 0i64..10_000,
        b in 0i64..10_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let (expected, got) = tokio_test::block_on(async {
            let repo = memory_repo().await;
            let points: Vec<NewFeeDataPoint> = offsets
                .iter()
                .enumerate()
                .map(|(i, secs)| point_at(i as u64, base_time() + Duration::seconds(*secs)))
                .collect();
            let ids = repo.insert_fee_points(&points).await.unwrap();

            let range = TimeRange::new(
                base_time() + Duration::seconds(lo),
                base_time() + Duration::seconds(hi),
            )
            .unwrap();

            let mut expected: Vec<(DateTime<Utc>, i64)> = points
                .iter()
                .zip(&ids)
                .filter(|(p, _)| range.contains(p.timestamp))
                .map(|(p, id)| (p.timestamp, *id))
                .collect();
            expected.sort();

            let got: Vec<(DateTime<Utc>, i64)> = repo
                .fee_points_between(range)
                .await
                .unwrap()
                .into_iter()
                .map(|p| (p.timestamp, p.id))
                .collect();

            repo.close().await;
            (expected, got)
        });

        prop_assert_eq!(expected, got);
    }

    /// Snapshot range queries follow the same contract on `captured_at`.
    #[test]
    fn prop_snapshot_range_query_matches_filter(
        offsets in offsets_strategy(),
        a in 0i64..10_000,
        b in 0i64..10_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let (expected, got) = tokio_test::block_on(async {
            let repo = memory_repo().await;
            let mut expected = Vec::new();
            for secs in &offsets {
                let captured_at = base_time() + Duration::seconds(*secs);
                let id = repo
                    .insert_snapshot(&snapshot_at(&secs.to_string(), captured_at))
                    .await
                    .unwrap();
                if (lo..=hi).contains(secs) {
                    expected.push((captured_at, id));
                }
            }
            expected.sort();

            let range = TimeRange::new(
                base_time() + Duration::seconds(lo),
                base_time() + Duration::seconds(hi),
            )
            .unwrap();
            let got: Vec<(DateTime<Utc>, i64)> = repo
                .snapshots_between(range)
                .await
                .unwrap()
                .into_iter()
                .map(|s| (s.captured_at, s.id))
                .collect();

            repo.close().await;
            (expected, got)
        });

        prop_assert_eq!(expected, got);
    }

    /// Ids are strictly increasing across sequential inserts, and every row
    /// reads back with identical field values.
    #[test]
    fn prop_ids_increase_and_rows_roundtrip(
        fees in prop::collection::vec(0u64..=i64::MAX as u64, 1..20),
        hash in "[a-f0-9]{64}",
        nanos in 0i64..1_000_000_000,
    ) {
        let ok = tokio_test::block_on(async {
            let repo = memory_repo().await;
            let mut last_id = 0;
            let mut ok = true;

            for (i, fee) in fees.iter().enumerate() {
                let point = NewFeeDataPoint {
                    fee_amount: *fee,
                    timestamp: base_time() + Duration::seconds(i as i64) + Duration::nanoseconds(nanos),
                    transaction_hash: hash.clone(),
                    ledger_sequence: i as u64,
                };
                let id = repo.insert_fee_point(&point).await.unwrap();
                let stored = repo.get_fee_point(id).await.unwrap().unwrap();

                ok &= id > last_id
                    && stored.fee_amount == point.fee_amount
                    && stored.timestamp == point.timestamp
                    && stored.transaction_hash == point.transaction_hash
                    && stored.ledger_sequence == point.ledger_sequence;
                last_id = id;
            }

            repo.close().await;
            ok
        });

        prop_assert!(ok);
    }
}
