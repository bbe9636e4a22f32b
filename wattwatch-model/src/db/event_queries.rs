use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{Item, UsageEvent};

/// Fetch every usage event owned (transitively) by `user_id`, newest first.
///
/// Ownership transits `properties -> items -> usage_events`; rows outside
/// the caller's properties are never returned. An optional `item_id` narrows
/// the result to a single item.
pub async fn events_for_owned_items(
    pool: &PgPool,
    user_id: i64,
    item_id: Option<i64>,
) -> Result<Vec<UsageEvent>> {
    let rows = sqlx::query_as::<_, UsageEvent>(
        r#"
        SELECT
            e.event_id,
            e.item_id,
            e.start_ts,
            e.end_ts
        FROM usage_events e
        JOIN items i      ON e.item_id = i.item_id
        JOIN properties p ON i.property_id = p.property_id
        WHERE p.user_id = $1
          AND ($2::bigint IS NULL OR e.item_id = $2)
        ORDER BY e.start_ts DESC
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All items across the caller's properties, for nickname resolution.
pub async fn items_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Item>> {
    let rows = sqlx::query_as::<_, Item>(
        r#"
        SELECT
            i.item_id,
            i.property_id,
            i.nickname
        FROM items i
        JOIN properties p ON i.property_id = p.property_id
        WHERE p.user_id = $1
        ORDER BY i.item_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
