use serde::Serialize;
use time::{Date, OffsetDateTime};

/// A utility meter attached to a property; scopes uploaded usage reports.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Meter {
    pub meter_id: i64,
    pub property_id: i64,
    pub utility: String,
    pub meter_name: Option<String>,
}

/// Metadata for one uploaded interval report.
///
/// `report_date` is the local calendar date of the report's first reading.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UsageReport {
    pub report_id: i64,
    pub meter_id: i64,
    pub report_date: Date,
    pub interval_minutes: i32,
    pub source_filename: Option<String>,
}

/// Persisted form of one parsed interval reading.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UsageIntervalRow {
    #[serde(with = "time::serde::rfc3339")]
    pub start_ts: OffsetDateTime,
    pub kwh: f64,
}
