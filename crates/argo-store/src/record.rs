//! Measurement record schema and Julian-day conversion

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Name of the one table the service queries.
pub const TABLE_NAME: &str = "argo_data";

/// Column names with their SQL types, in table order.
pub const COLUMNS: [(&str, &str); 9] = [
    ("uid", "INTEGER"),
    ("platform_number", "INTEGER"),
    ("cycle_number", "INTEGER"),
    ("latitude", "REAL"),
    ("longitude", "REAL"),
    ("pressure", "REAL"),
    ("temperature", "REAL"),
    ("salinity", "REAL"),
    ("juld", "REAL"),
];

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// One float profile measurement, as exported from the ARGO data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub uid: i64,
    pub platform_number: i64,
    pub cycle_number: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    /// Days since 1950-01-01, fractional part included
    pub juld: Option<f64>,
}

impl MeasurementRecord {
    /// Calendar time of the measurement, if `juld` is present and representable.
    pub fn observed_at(&self) -> Option<NaiveDateTime> {
        self.juld.and_then(juld_to_datetime)
    }
}

fn juld_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1950, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a Julian-day offset into a calendar time (millisecond precision).
pub fn juld_to_datetime(juld: f64) -> Option<NaiveDateTime> {
    if !juld.is_finite() {
        return None;
    }
    let millis = (juld * MILLIS_PER_DAY).round();
    // Roughly +/- 30,000 years; anything past that is garbage input.
    if millis.abs() > 1.0e15 {
        return None;
    }
    juld_epoch().checked_add_signed(Duration::milliseconds(millis as i64))
}
