use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};

use crate::domain::{Meter, UsageIntervalRow, UsageReport};

pub async fn meters_for_property(pool: &PgPool, property_id: i64) -> Result<Vec<Meter>> {
    let rows = sqlx::query_as::<_, Meter>(
        r#"
        SELECT
            meter_id,
            property_id,
            utility,
            meter_name
        FROM meters
        WHERE property_id = $1
        ORDER BY meter_id
        "#,
    )
    .bind(property_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All reports for a meter, newest report date first.
pub async fn reports_for_meter(pool: &PgPool, meter_id: i64) -> Result<Vec<UsageReport>> {
    let rows = sqlx::query_as::<_, UsageReport>(
        r#"
        SELECT
            report_id,
            meter_id,
            report_date,
            interval_minutes,
            source_filename
        FROM usage_reports
        WHERE meter_id = $1
        ORDER BY report_date DESC
        "#,
    )
    .bind(meter_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Time-ordered interval rows for one report.
pub async fn intervals_for_report(pool: &PgPool, report_id: i64) -> Result<Vec<UsageIntervalRow>> {
    let rows = sqlx::query_as::<_, UsageIntervalRow>(
        r#"
        SELECT
            start_ts,
            kwh
        FROM usage_intervals
        WHERE report_id = $1
        ORDER BY start_ts
        "#,
    )
    .bind(report_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn create_report(
    pool: &PgPool,
    meter_id: i64,
    report_date: Date,
    interval_minutes: i32,
    source_filename: Option<&str>,
) -> Result<i64> {
    let (report_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO usage_reports (meter_id, report_date, interval_minutes, source_filename)
        VALUES ($1, $2, $3, $4)
        RETURNING report_id
        "#,
    )
    .bind(meter_id)
    .bind(report_date)
    .bind(interval_minutes)
    .bind(source_filename)
    .fetch_one(pool)
    .await?;

    Ok(report_id)
}

/// Bulk insert of parsed interval rows for a freshly created report.
pub async fn bulk_insert_intervals(
    pool: &PgPool,
    report_id: i64,
    intervals: &[(OffsetDateTime, f64)],
) -> Result<()> {
    if intervals.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO usage_intervals (report_id, start_ts, kwh) ",
    );

    builder.push_values(intervals, |mut b, (start_ts, kwh)| {
        b.push_bind(report_id).push_bind(start_ts).push_bind(kwh);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
