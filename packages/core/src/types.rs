//! Core data types for fee telemetry rows

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A fee observation ready to be inserted. The store assigns `id`
/// and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeeDataPoint {
    pub fee_amount: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub ledger_sequence: u64,
}

/// A persisted fee observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDataPoint {
    pub id: i64,
    pub fee_amount: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub ledger_sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// A fee statistics capture ready to be inserted.
///
/// Fee figures stay as decimal strings, exactly as the upstream
/// `fee_stats` endpoint reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeeSnapshot {
    pub base_fee: String,
    pub min_fee: String,
    pub max_fee: String,
    pub avg_fee: String,
    pub captured_at: DateTime<Utc>,
}

/// A persisted fee statistics capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSnapshot {
    pub id: i64,
    pub base_fee: String,
    pub min_fee: String,
    pub max_fee: String,
    pub avg_fee: String,
    pub captured_at: DateTime<Utc>,
}

/// Inclusive time bounds for range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Fails when `start` is after `end`. Equal bounds select a single instant.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, StoreError> {
        if start > end {
            return Err(StoreError::invalid_range(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

impl NewFeeDataPoint {
    /// Application-level checks the schema itself does not enforce.
    pub fn validate(&self) -> Result<(), StoreError> {
        ensure_fits_i64("fee_amount", self.fee_amount)?;
        ensure_fits_i64("ledger_sequence", self.ledger_sequence)?;
        ensure_four_digit_year("timestamp", &self.timestamp)?;

        if self.transaction_hash.trim().is_empty() {
            return Err(StoreError::invalid_record("transaction_hash must not be empty"));
        }

        Ok(())
    }
}

impl NewFeeSnapshot {
    /// Every fee figure must be a non-negative decimal literal.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fields = [
            ("base_fee", &self.base_fee),
            ("min_fee", &self.min_fee),
            ("max_fee", &self.max_fee),
            ("avg_fee", &self.avg_fee),
        ];

        for (name, value) in fields {
            if !is_decimal_literal(value) {
                return Err(StoreError::invalid_record(format!(
                    "{} must be a non-negative decimal, got '{}'",
                    name, value
                )));
            }
        }

        ensure_four_digit_year("captured_at", &self.captured_at)

    }
}

fn ensure_fits_i64(field: &str, value: u64) -> Result<(), StoreError> {
    if value > i64::MAX as u64 {
        return Err(StoreError::invalid_record(format!(
            "{} {} exceeds the storable maximum {}",
            field,
            value,
            i64::MAX
        )));
    }
    Ok(())
}

/// Stored time text only sorts chronologically for years 0000..=9999;
/// chrono writes other years with a sign (`+10000-...`, `-0001-...`).
fn ensure_four_digit_year(field: &str, instant: &DateTime<Utc>) -> Result<(), StoreError> {
    if !(0..=9999).contains(&instant.year()) {
        return Err(StoreError::invalid_record(format!(
            "{} {} is outside years 0000-9999",
            field,
            instant.to_rfc3339()
        )));
    }
    Ok(())
}

/// `digits` or `digits.digits`, nothing else (no sign, exponent or whitespace).
fn is_decimal_literal(value: &str) -> bool {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match value.split_once('.') {
        Some((whole, fraction)) => all_digits(whole) && all_digits(fraction),
        None => all_digits(value),
    }
}
