//! Postgres-backed [`ReportStore`] with ownership checks at the boundary.
//!
//! Every call verifies that the requesting identity owns the row (through
//! the property chain) before the query runs; a row owned by someone else
//! is `Forbidden`, never silently empty.

use sqlx::PgPool;
use wattwatch_model::db::{ownership, report_queries};
use wattwatch_model::domain::{Meter, UsageIntervalRow, UsageReport};

use crate::navigator::{ReportStore, StoreError};

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: anyhow::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn check_owner(owner: Option<i64>, user_id: i64, what: &str) -> Result<(), StoreError> {
    match owner {
        Some(id) if id == user_id => Ok(()),
        _ => Err(StoreError::Forbidden(format!("{what} is not owned by the caller"))),
    }
}

#[async_trait::async_trait]
impl ReportStore for PgReportStore {
    async fn meters_for_property(
        &self,
        user_id: i64,
        property_id: i64,
    ) -> Result<Vec<Meter>, StoreError> {
        let owner = ownership::property_owner(&self.pool, property_id)
            .await
            .map_err(backend)?;
        check_owner(owner, user_id, "property")?;

        report_queries::meters_for_property(&self.pool, property_id)
            .await
            .map_err(backend)
    }

    async fn reports_for_meter(
        &self,
        user_id: i64,
        meter_id: i64,
    ) -> Result<Vec<UsageReport>, StoreError> {
        let owner = ownership::meter_owner(&self.pool, meter_id)
            .await
            .map_err(backend)?;
        check_owner(owner, user_id, "meter")?;

        report_queries::reports_for_meter(&self.pool, meter_id)
            .await
            .map_err(backend)
    }

    async fn intervals_for_report(
        &self,
        user_id: i64,
        report_id: i64,
    ) -> Result<Vec<UsageIntervalRow>, StoreError> {
        let owner = ownership::report_owner(&self.pool, report_id)
            .await
            .map_err(backend)?;
        check_owner(owner, user_id, "report")?;

        report_queries::intervals_for_report(&self.pool, report_id)
            .await
            .map_err(backend)
    }
}
