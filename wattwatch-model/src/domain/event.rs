use serde::Serialize;
use time::OffsetDateTime;

/// One manual start/stop window for an electrical item.
///
/// `end_ts` is absent while the event is ongoing. `end_ts >= start_ts` when
/// present; at most one ongoing event per item is a UI-flow convention, not
/// a storage constraint.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UsageEvent {
    pub event_id: i64,
    pub item_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub start_ts: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_ts: Option<OffsetDateTime>,
}

/// An electrical item registered under a property.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Item {
    pub item_id: i64,
    pub property_id: i64,
    pub nickname: String,
}
