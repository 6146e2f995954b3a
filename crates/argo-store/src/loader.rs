//! Offline bulk load of an ARGO CSV export into the measurement table

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::record::{MeasurementRecord, COLUMNS, TABLE_NAME};
use crate::StoreError;

/// What a load run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub rows: usize,
    /// Smallest and largest `juld` seen, if any loaded row carried one
    pub juld_range: Option<(f64, f64)>,
    /// Earliest and latest observation time among the dated rows
    pub observed_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |range, v| match range {
        None => Some((v, v)),
        Some((lo, hi)) => Some((
            if v < lo { v } else { lo },
            if v > hi { v } else { hi },
        )),
    })
}

/// Drop and recreate the measurement table.
pub fn create_table(conn: &Connection) -> Result<(), StoreError> {
    let columns = COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
        table = TABLE_NAME,
        columns = columns
    ))?;
    Ok(())
}

/// Insert records in a single transaction.
pub fn insert_records(conn: &mut Connection, records: &[MeasurementRecord]) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            TABLE_NAME
        ))?;
        for r in records {
            stmt.execute(params![
                r.uid,
                r.platform_number,
                r.cycle_number,
                r.latitude,
                r.longitude,
                r.pressure,
                r.temperature,
                r.salinity,
                r.juld,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Read `csv_path` and replace the measurement table in the database at `db_path`.
pub fn load_csv<P: AsRef<Path>, Q: AsRef<Path>>(csv_path: P, db_path: Q) -> Result<LoadSummary, StoreError> {
    let csv_path = csv_path.as_ref();
    let db_path = db_path.as_ref();

    if !csv_path.exists() {
        return Err(StoreError::MissingSource(csv_path.display().to_string()));
    }

    tracing::info!(csv = %csv_path.display(), "Reading measurement export");
    let mut reader = csv::Reader::from_path(csv_path)?;
    let records = reader
        .deserialize::<MeasurementRecord>()
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(db = %db_path.display(), "Creating SQLite database");
    let mut conn = Connection::open(db_path)?;

    tracing::info!(table = TABLE_NAME, rows = records.len(), "Writing records");
    create_table(&conn)?;
    let rows = insert_records(&mut conn, &records)?;

    let juld_range = min_max(records.iter().filter_map(|r| r.juld));
    let observed_range = min_max(records.iter().filter_map(MeasurementRecord::observed_at));

    if let Some((first, last)) = observed_range {
        tracing::info!(%first, %last, "Loaded measurements time span");
    }
    tracing::info!(db = %db_path.display(), rows, "Database created and ready for use");

    Ok(LoadSummary {
        rows,
        juld_range,
        observed_range,
    })
}
