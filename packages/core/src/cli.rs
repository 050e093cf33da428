use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::AppError;
use crate::repository::FeeTelemetryStore;
use crate::types::{NewFeeDataPoint, NewFeeSnapshot, TimeRange};

/// Stellar Fee Store CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "stellar-fee-store",
    version,
    about = "Persistent storage for Stellar network fee telemetry"
)]
pub struct Cli {
    /// SQLite connection string (overrides DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Maximum pooled connections (overrides DB_MAX_CONNECTIONS), at least 1
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_connections: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Record one observed transaction fee
    RecordPoint {
        /// Fee paid, in stroops
        #[arg(long)]
        fee_amount: u64,
        /// Observation time (RFC 3339)
        #[arg(long)]
        timestamp: DateTime<Utc>,
        #[arg(long)]
        transaction_hash: String,
        #[arg(long)]
        ledger_sequence: u64,
    },

    /// Record one fee statistics snapshot
    RecordSnapshot {
        #[arg(long)]
        base_fee: String,
        #[arg(long)]
        min_fee: String,
        #[arg(long)]
        max_fee: String,
        #[arg(long)]
        avg_fee: String,
        /// Capture time (RFC 3339); defaults to now
        #[arg(long)]
        captured_at: Option<DateTime<Utc>>,
    },

    /// List fee data points observed within [from, to]
    Points {
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
    },

    /// List fee snapshots captured within [from, to]
    Snapshots {
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
    },

    /// Show one fee data point by id
    Point { id: i64 },

    /// Show one fee snapshot by id
    Snapshot { id: i64 },

    /// Show the most recently captured snapshot
    LatestSnapshot,

    /// Row counts for both tables
    Stats,
}

impl Cli {
    /// Apply command-line overrides on top of the environment config.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        config
    }
}

/// Run one command against `store` and return its JSON result.
///
/// Stores opened through [`crate::db::connect`] are already migrated, so
/// `migrate` only confirms the schema is current.
pub async fn execute(
    command: Command,
    store: &(dyn FeeTelemetryStore + Send + Sync),
) -> Result<Value, AppError> {
    match command {
        Command::Migrate => Ok(json!({ "status": "up to date" })),

        Command::RecordPoint {
            fee_amount,
            timestamp,
            transaction_hash,
            ledger_sequence,
        } => {
            let id = store
                .insert_fee_point(&NewFeeDataPoint {
                    fee_amount,
                    timestamp,
                    transaction_hash,
                    ledger_sequence,
                })
                .await?;
            tracing::info!("Recorded fee data point {}", id);
            Ok(json!({ "id": id }))
        }

        Command::RecordSnapshot {
            base_fee,
            min_fee,
            max_fee,
            avg_fee,
            captured_at,
        } => {
            let id = store
                .insert_snapshot(&NewFeeSnapshot {
                    base_fee,
                    min_fee,
                    max_fee,
                    avg_fee,
                    captured_at: captured_at.unwrap_or_else(Utc::now),
                })
                .await?;
            tracing::info!("Recorded fee snapshot {}", id);
            Ok(json!({ "id": id }))
        }

        Command::Points { from, to } => {
            let points = store.fee_points_between(TimeRange::new(from, to)?).await?;
            to_json(&points)
        }

        Command::Snapshots { from, to } => {
            let snapshots = store.snapshots_between(TimeRange::new(from, to)?).await?;
            to_json(&snapshots)
        }

        Command::Point { id } => match store.get_fee_point(id).await? {
            Some(point) => to_json(&point),
            None => Err(AppError::NotFound(format!("fee data point {}", id))),
        },

        Command::Snapshot { id } => match store.get_snapshot(id).await? {
            Some(snapshot) => to_json(&snapshot),
            None => Err(AppError::NotFound(format!("fee snapshot {}", id))),
        },

        Command::LatestSnapshot => to_json(&store.latest_snapshot().await?),

        Command::Stats => Ok(json!({
            "fee_data_points": store.count_fee_points().await?,
            "fee_snapshots": store.count_snapshots().await?,
        })),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::Unknown(err.to_string()))
}
