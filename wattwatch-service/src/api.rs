//! Thin HTTP surface over the engines: report upload, daily usage summary,
//! and report navigation. Handlers only authenticate, authorize ownership,
//! and delegate; all aggregation and parsing logic lives in the engine
//! modules.
//!
//! Identity handling: the bearer token authenticates the caller against the
//! configured secret, and the resolved user id arrives in an `x-user-id`
//! header set by the upstream session layer. Both are hard requirements;
//! neither is ever defaulted.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Date, OffsetDateTime, UtcOffset};
use wattwatch_model::db::{event_queries, ownership, report_queries};

use crate::espi::{self, IntervalReading};
use crate::grouping::{self, EventDuration, HourlyTotal};
use crate::navigator::{MeterFilter, NavigatorView, ReportNavigator, ReportStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn ReportStore>,
    pub auth_bearer_token: Option<String>,
    pub offset: UtcOffset,
    pub interval_minutes: i32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reports/upload", post(upload_report))
        .route("/reports/current", get(current_report))
        .route("/usage/daily", get(daily_summary))
        .with_state(state)
}

type ApiError = (StatusCode, String);

/// Authenticate the bearer credential and resolve the caller identity.
/// Both failures are `401`; a wrong credential is never downgraded.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    if let Some(expected) = &state.auth_bearer_token {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            metrics::counter!("api_unauthorized_total").increment(1);
            return Err((StatusCode::UNAUTHORIZED, "unauthorized".to_string()));
        }
    }

    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing caller identity".to_string()))
}

fn parse_date_param(s: &str) -> Result<Date, ApiError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(s, &format)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid date '{s}', expected YYYY-MM-DD")))
}

fn storage_error(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %e, "storage failure");
    (StatusCode::INTERNAL_SERVER_ERROR, "storage failure".to_string())
}

#[derive(Deserialize)]
struct UploadParams {
    meter_id: i64,
    filename: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    report_id: i64,
    report_date: Date,
    interval_minutes: i32,
    readings: Vec<IntervalReading>,
}

async fn upload_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: String,
) -> Result<Json<UploadResponse>, ApiError> {
    let user_id = authorize(&state, &headers)?;

    let owner = ownership::meter_owner(&state.pool, params.meter_id)
        .await
        .map_err(storage_error)?;
    if owner != Some(user_id) {
        return Err((StatusCode::FORBIDDEN, "meter is not owned by the caller".to_string()));
    }

    let parsed = match espi::parse_interval_report(&body, state.offset) {
        Ok(parsed) => parsed,
        Err(e) => {
            metrics::counter!("report_upload_rejected_total").increment(1);
            return Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()));
        }
    };

    let Some(report_date) = parsed.report_date else {
        metrics::counter!("report_upload_rejected_total").increment(1);
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "report contained no interval readings".to_string(),
        ));
    };

    let report_id = report_queries::create_report(
        &state.pool,
        params.meter_id,
        report_date,
        state.interval_minutes,
        params.filename.as_deref(),
    )
    .await
    .map_err(storage_error)?;

    let rows: Vec<(OffsetDateTime, f64)> =
        parsed.readings.iter().map(|r| (r.start_ts, r.kwh)).collect();
    report_queries::bulk_insert_intervals(&state.pool, report_id, &rows)
        .await
        .map_err(storage_error)?;

    metrics::counter!("report_upload_readings_total").increment(parsed.readings.len() as u64);
    tracing::info!(report_id, %report_date, readings = parsed.readings.len(), "stored interval report");

    Ok(Json(UploadResponse {
        report_id,
        report_date,
        interval_minutes: state.interval_minutes,
        readings: parsed
            .readings
            .iter()
            .map(|r| r.chart_reading(state.offset))
            .collect(),
    }))
}

#[derive(Deserialize)]
struct DailyParams {
    date: Option<String>,
    item_id: Option<i64>,
}

#[derive(Serialize)]
struct EventView {
    event_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    start_ts: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    end_ts: Option<OffsetDateTime>,
    /// Rounded minutes; `null` while the event is ongoing.
    minutes: Option<i64>,
}

#[derive(Serialize)]
struct GroupView {
    usage_date: Date,
    nickname: String,
    events: Vec<EventView>,
}

#[derive(Serialize)]
struct DailySummaryResponse {
    groups: Vec<GroupView>,
    hourly: Vec<HourlyTotal>,
}

async fn daily_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DailyParams>,
) -> Result<Json<DailySummaryResponse>, ApiError> {
    let user_id = authorize(&state, &headers)?;

    let target_date = params.date.as_deref().map(parse_date_param).transpose()?;

    let events = event_queries::events_for_owned_items(&state.pool, user_id, params.item_id)
        .await
        .map_err(storage_error)?;
    let nicknames: HashMap<i64, String> = event_queries::items_for_user(&state.pool, user_id)
        .await
        .map_err(storage_error)?
        .into_iter()
        .map(|i| (i.item_id, i.nickname))
        .collect();

    let mut groups = grouping::group_by_date_and_nickname(&events, &nicknames, state.offset);
    if let Some(date) = target_date {
        groups.retain(|g| g.usage_date == date);
    }
    let hourly = grouping::hourly_totals(&groups, state.offset);

    metrics::counter!("daily_summary_requests_total").increment(1);

    let groups = groups
        .into_iter()
        .map(|g| GroupView {
            usage_date: g.usage_date,
            nickname: g.nickname,
            events: g
                .events
                .iter()
                .map(|e| EventView {
                    event_id: e.event_id,
                    start_ts: e.start_ts,
                    end_ts: e.end_ts,
                    minutes: match grouping::event_duration(e) {
                        EventDuration::Minutes(m) => Some(m.round() as i64),
                        EventDuration::Ongoing => None,
                    },
                })
                .collect(),
        })
        .collect();

    Ok(Json(DailySummaryResponse { groups, hourly }))
}

#[derive(Deserialize)]
struct CurrentReportParams {
    property_id: i64,
    date: Option<String>,
    utility: Option<String>,
    meter_name: Option<String>,
}

async fn current_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CurrentReportParams>,
) -> Result<Json<NavigatorView>, ApiError> {
    let user_id = authorize(&state, &headers)?;

    let target_date = params.date.as_deref().map(parse_date_param).transpose()?;

    let filter = MeterFilter {
        utility: params.utility,
        meter_name: params.meter_name,
    };
    let nav = ReportNavigator::attach(
        state.store.clone(),
        user_id,
        params.property_id,
        &filter,
        state.offset,
    )
    .await;

    if let Some(date) = target_date {
        nav.go_to_date(date).await;
    }

    Ok(Json(nav.view().await))
}
