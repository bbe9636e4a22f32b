//! Ownership lookups for the authorization chain
//! `properties -> meters -> usage_reports -> usage_intervals` and
//! `properties -> items -> usage_events`.
//!
//! Each function resolves the owning user id of a row, or `None` when the
//! row does not exist. Callers compare against the requesting identity and
//! reject mismatches before any core operation runs.

use anyhow::Result;
use sqlx::PgPool;

pub async fn property_owner(pool: &PgPool, property_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT user_id FROM properties WHERE property_id = $1")
            .bind(property_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn meter_owner(pool: &PgPool, meter_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT p.user_id
        FROM meters m
        JOIN properties p ON m.property_id = p.property_id
        WHERE m.meter_id = $1
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn report_owner(pool: &PgPool, report_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT p.user_id
        FROM usage_reports r
        JOIN meters m     ON r.meter_id = m.meter_id
        JOIN properties p ON m.property_id = p.property_id
        WHERE r.report_id = $1
        "#,
    )
    .bind(report_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn item_owner(pool: &PgPool, item_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT p.user_id
        FROM items i
        JOIN properties p ON i.property_id = p.property_id
        WHERE i.item_id = $1
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id,)| id))
}
