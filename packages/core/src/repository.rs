//! Database repository for fee telemetry persistence.
//!
//! All SQLite read/write logic lives here. Both tables are append-only:
//! the repository inserts and reads, it never updates or deletes.
//!
//! Ingestion and API layers depend on the [`FeeTelemetryStore`] trait rather
//! than on [`FeeRepository`] directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::timestamp;
use crate::types::{FeeDataPoint, FeeSnapshot, NewFeeDataPoint, NewFeeSnapshot, TimeRange};

/// Upper bound for `latest_fee_points`.
pub const MAX_QUERY_LIMIT: i64 = 1_000;

/// Persistence contract for fee observations and fee snapshots.
#[async_trait]
pub trait FeeTelemetryStore {
    /// Insert one fee observation and return its store-assigned id.
    async fn insert_fee_point(&self, point: &NewFeeDataPoint) -> Result<i64, StoreError>;

    /// Insert a batch atomically. Either every point is stored or none is.
    async fn insert_fee_points(&self, points: &[NewFeeDataPoint]) -> Result<Vec<i64>, StoreError>;

    async fn get_fee_point(&self, id: i64) -> Result<Option<FeeDataPoint>, StoreError>;

    /// Points whose `timestamp` lies in `range` (inclusive), oldest first.
    async fn fee_points_between(&self, range: TimeRange) -> Result<Vec<FeeDataPoint>, StoreError>;

    /// Points with `timestamp >= since`, oldest first.
    async fn fee_points_since(&self, since: DateTime<Utc>) -> Result<Vec<FeeDataPoint>, StoreError>;

    /// The `limit` most recent points, oldest first.
    async fn latest_fee_points(&self, limit: i64) -> Result<Vec<FeeDataPoint>, StoreError>;

    async fn count_fee_points(&self) -> Result<i64, StoreError>;

    /// Insert one fee snapshot and return its store-assigned id.
    async fn insert_snapshot(&self, snapshot: &NewFeeSnapshot) -> Result<i64, StoreError>;

    async fn get_snapshot(&self, id: i64) -> Result<Option<FeeSnapshot>, StoreError>;

    /// Snapshots whose `captured_at` lies in `range` (inclusive), oldest first.
    async fn snapshots_between(&self, range: TimeRange) -> Result<Vec<FeeSnapshot>, StoreError>;

    async fn latest_snapshot(&self) -> Result<Option<FeeSnapshot>, StoreError>;

    async fn count_snapshots(&self) -> Result<i64, StoreError>;
}

/// Repository for reading and writing fee telemetry to SQLite.
#[derive(Debug, Clone)]
pub struct FeeRepository {
    pool: SqlitePool,
}

impl FeeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FeeTelemetryStore for FeeRepository {
    async fn insert_fee_point(&self, point: &NewFeeDataPoint) -> Result<i64, StoreError> {
        point.validate()?;

        let result = sqlx::query(
            "INSERT INTO fee_data_points
             (fee_amount, timestamp, transaction_hash, ledger_sequence)
             VALUES (?, ?, ?, ?)",
        )
        .bind(point.fee_amount as i64)
        .bind(timestamp::encode(&point.timestamp))
        .bind(&point.transaction_hash)
        .bind(point.ledger_sequence as i64)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, ledger = point.ledger_sequence, "Stored fee data point");
        Ok(id)
    }

    async fn insert_fee_points(&self, points: &[NewFeeDataPoint]) -> Result<Vec<i64>, StoreError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        // Reject the whole batch before opening a transaction.
        for point in points {
            point.validate()?;
        }

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(points.len());

        for point in points {
            let result = sqlx::query(
                "INSERT INTO fee_data_points
                 (fee_amount, timestamp, transaction_hash, ledger_sequence)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(point.fee_amount as i64)
            .bind(timestamp::encode(&point.timestamp))
            .bind(&point.transaction_hash)
            .bind(point.ledger_sequence as i64)
            .execute(&mut *tx)
            .await?;

            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;

        tracing::info!("Stored batch of {} fee data points", ids.len());
        Ok(ids)
    }

    async fn get_fee_point(&self, id: i64) -> Result<Option<FeeDataPoint>, StoreError> {
        let row = sqlx::query(
            "SELECT id, fee_amount, timestamp, transaction_hash, ledger_sequence, created_at
             FROM fee_data_points
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(fee_point_from_row).transpose()
    }

    async fn fee_points_between(&self, range: TimeRange) -> Result<Vec<FeeDataPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, fee_amount, timestamp, transaction_hash, ledger_sequence, created_at
             FROM fee_data_points
             WHERE timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(timestamp::lower_bound_key(&range.start()))
        .bind(timestamp::upper_bound_key(&range.end()))
        .fetch_all(&self.pool)
        .await?;

        // The scan covers whole seconds at both ends; trim to the exact range
        // and restore time order for rows stored in other UTC spellings.
        let mut points = Vec::with_capacity(rows.len());
        for row in &rows {
            let point = fee_point_from_row(row)?;
            if range.contains(point.timestamp) {
                points.push(point);
            }
        }
        points.sort_by_key(|p| (p.timestamp, p.id));
        Ok(points)
    }

    async fn fee_points_since(&self, since: DateTime<Utc>) -> Result<Vec<FeeDataPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, fee_amount, timestamp, transaction_hash, ledger_sequence, created_at
             FROM fee_data_points
             WHERE timestamp >= ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(timestamp::lower_bound_key(&since))
        .fetch_all(&self.pool)
        .await?;

        let mut points = Vec::with_capacity(rows.len());
        for row in &rows {
            let point = fee_point_from_row(row)?;
            if point.timestamp >= since {
                points.push(point);
            }
        }
        points.sort_by_key(|p| (p.timestamp, p.id));
        Ok(points)
    }

    async fn latest_fee_points(&self, limit: i64) -> Result<Vec<FeeDataPoint>, StoreError> {
        let limit = limit.clamp(1, MAX_QUERY_LIMIT);

        let rows = sqlx::query(
            "SELECT id, fee_amount, timestamp, transaction_hash, ledger_sequence, created_at
             FROM fee_data_points
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut points = rows
            .iter()
            .map(fee_point_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse();
        Ok(points)
    }

    async fn count_fee_points(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM fee_data_points")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count)
    }

    async fn insert_snapshot(&self, snapshot: &NewFeeSnapshot) -> Result<i64, StoreError> {
        snapshot.validate()?;

        let result = sqlx::query(
            "INSERT INTO fee_snapshots (base_fee, min_fee, max_fee, avg_fee, captured_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.base_fee)
        .bind(&snapshot.min_fee)
        .bind(&snapshot.max_fee)
        .bind(&snapshot.avg_fee)
        .bind(timestamp::encode(&snapshot.captured_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, base_fee = %snapshot.base_fee, "Stored fee snapshot");
        Ok(id)
    }

    async fn get_snapshot(&self, id: i64) -> Result<Option<FeeSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT id, base_fee, min_fee, max_fee, avg_fee, captured_at
             FROM fee_snapshots
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn snapshots_between(&self, range: TimeRange) -> Result<Vec<FeeSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, base_fee, min_fee, max_fee, avg_fee, captured_at
             FROM fee_snapshots
             WHERE captured_at >= ? AND captured_at < ?
             ORDER BY captured_at ASC, id ASC",
        )
        .bind(timestamp::lower_bound_key(&range.start()))
        .bind(timestamp::upper_bound_key(&range.end()))
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let snapshot = snapshot_from_row(row)?;
            if range.contains(snapshot.captured_at) {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| (s.captured_at, s.id));
        Ok(snapshots)
    }

    async fn latest_snapshot(&self) -> Result<Option<FeeSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT id, base_fee, min_fee, max_fee, avg_fee, captured_at
             FROM fee_snapshots
             ORDER BY captured_at DESC, id DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn count_snapshots(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM fee_snapshots")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count)
    }
}

fn fee_point_from_row(row: &SqliteRow) -> Result<FeeDataPoint, StoreError> {
    let id: i64 = row.try_get("id")?;
    let fee_amount: i64 = row.try_get("fee_amount")?;
    let timestamp_str: String = row.try_get("timestamp")?;
    let transaction_hash: String = row.try_get("transaction_hash")?;
    let ledger_sequence: i64 = row.try_get("ledger_sequence")?;
    let created_at_str: String = row.try_get("created_at")?;

    Ok(FeeDataPoint {
        id,
        fee_amount: non_negative(id, "fee_amount", fee_amount)?,
        timestamp: timestamp::decode(&timestamp_str)?,
        transaction_hash,
        ledger_sequence: non_negative(id, "ledger_sequence", ledger_sequence)?,
        created_at: timestamp::decode(&created_at_str)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<FeeSnapshot, StoreError> {
    let captured_at_str: String = row.try_get("captured_at")?;

    Ok(FeeSnapshot {
        id: row.try_get("id")?,
        base_fee: row.try_get("base_fee")?,
        min_fee: row.try_get("min_fee")?,
        max_fee: row.try_get("max_fee")?,
        avg_fee: row.try_get("avg_fee")?,
        captured_at: timestamp::decode(&captured_at_str)?,
    })
}

// The schema has no CHECK constraints, so rows written by other tools may
// hold negatives.
fn non_negative(id: i64, column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| {
        StoreError::corrupt_row(format!("fee_data_points row {} has negative {}: {}", id, column, value))
    })
}
