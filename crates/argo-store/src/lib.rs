//! SQLite storage for ARGO float measurements
//!
//! Holds the single `argo_data` table that natural-language questions are
//! answered against, the shared connection handle used by the server, and
//! the offline CSV bulk loader that populates it.

use thiserror::Error;

pub mod loader;
pub mod record;
pub mod store;

pub use loader::{create_table, insert_records, load_csv, LoadSummary};
pub use record::{juld_to_datetime, MeasurementRecord, COLUMNS, TABLE_NAME};
pub use store::{ArgoStore, QueryStore, Row};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Source file not found: {0}")]
    MissingSource(String),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when the database rejected or failed the statement itself,
    /// as opposed to the store being unusable.
    pub fn is_query_error(&self) -> bool {
        matches!(self, StoreError::Sqlite(_))
    }
}
