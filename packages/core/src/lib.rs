// Library root. Exposes the store for ingestion/API crates and for
// integration tests in `tests/`. The operator CLI lives in `src/main.rs`.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod repository;
pub mod timestamp;
pub mod types;

pub use error::{AppError, StoreError};
pub use repository::{FeeRepository, FeeTelemetryStore};
pub use types::{FeeDataPoint, FeeSnapshot, NewFeeDataPoint, NewFeeSnapshot, TimeRange};
