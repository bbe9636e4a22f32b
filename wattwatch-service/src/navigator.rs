//! Report navigation engine.
//!
//! Resolves a property's meter, loads interval reports by date with
//! prev/next stepping, and falls back to the closest available report when
//! an exact date is absent. Storage sits behind the [`ReportStore`] trait;
//! the engine itself only sequences loads and commits results.
//!
//! Loads follow a last-request-wins rule: every load takes a fresh
//! generation from a monotonic counter and only the highest generation may
//! commit, so a slow response can never overwrite a newer navigation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use time::{Date, UtcOffset};
use tokio::sync::Mutex;
use wattwatch_model::domain::{Meter, UsageIntervalRow, UsageReport};

use crate::espi::IntervalReading;
use crate::timeutil;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Backend(String),
}

/// Collaborator boundary over meters, reports and interval rows.
///
/// Implementations must return only rows owned (transitively) by `user_id`
/// and order reports newest first.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    async fn meters_for_property(
        &self,
        user_id: i64,
        property_id: i64,
    ) -> Result<Vec<Meter>, StoreError>;

    async fn reports_for_meter(
        &self,
        user_id: i64,
        meter_id: i64,
    ) -> Result<Vec<UsageReport>, StoreError>;

    async fn intervals_for_report(
        &self,
        user_id: i64,
        report_id: i64,
    ) -> Result<Vec<UsageIntervalRow>, StoreError>;
}

/// Optional meter selection filter; empty fields match anything.
#[derive(Debug, Clone, Default)]
pub struct MeterFilter {
    pub utility: Option<String>,
    pub meter_name: Option<String>,
}

/// Snapshot of the navigator's display state.
///
/// `is_exact` is false when the shown report only approximates a requested
/// date; `prev_date`/`next_date` are the navigation candidates around it.
/// A failed load stores `error` and leaves the rest of the snapshot intact.
#[derive(Debug, Clone, Serialize)]
pub struct NavigatorView {
    pub meter_id: Option<i64>,
    pub report: Option<UsageReport>,
    pub readings: Vec<IntervalReading>,
    pub is_exact: bool,
    pub prev_date: Option<Date>,
    pub next_date: Option<Date>,
    pub error: Option<String>,
}

impl Default for NavigatorView {
    fn default() -> Self {
        Self {
            meter_id: None,
            report: None,
            readings: Vec::new(),
            is_exact: true,
            prev_date: None,
            next_date: None,
            error: None,
        }
    }
}

pub struct ReportNavigator {
    store: Arc<dyn ReportStore>,
    user_id: i64,
    offset: UtcOffset,
    meter_id: Option<i64>,
    generation: AtomicU64,
    view: Mutex<NavigatorView>,
}

impl ReportNavigator {
    /// Resolve the property's meter and load its most recent report.
    ///
    /// A property without meters or reports yields the terminal empty
    /// state; a collaborator failure on this initial mount yields the same
    /// empty state with a diagnostic.
    pub async fn attach(
        store: Arc<dyn ReportStore>,
        user_id: i64,
        property_id: i64,
        filter: &MeterFilter,
        offset: UtcOffset,
    ) -> Self {
        let mut nav = Self {
            store,
            user_id,
            offset,
            meter_id: None,
            generation: AtomicU64::new(0),
            view: Mutex::new(NavigatorView::default()),
        };

        let meters = match nav.store.meters_for_property(user_id, property_id).await {
            Ok(meters) => meters,
            Err(e) => {
                nav.view.get_mut().error = Some(e.to_string());
                return nav;
            }
        };

        let Some(meter) = resolve_meter(&meters, filter) else {
            return nav;
        };
        nav.meter_id = Some(meter.meter_id);
        nav.view.get_mut().meter_id = Some(meter.meter_id);

        nav.load(None).await;
        nav
    }

    /// Jump to an explicit date; falls back to the closest available
    /// report when the exact date has no upload.
    pub async fn go_to_date(&self, date: Date) {
        self.load(Some(date)).await;
    }

    /// Step to the previous report. A no-op when no earlier report exists;
    /// no load is issued.
    pub async fn go_prev(&self) {
        let target = self.view.lock().await.prev_date;
        if let Some(date) = target {
            self.load(Some(date)).await;
        }
    }

    /// Step to the next report. A no-op when no later report exists.
    pub async fn go_next(&self) {
        let target = self.view.lock().await.next_date;
        if let Some(date) = target {
            self.load(Some(date)).await;
        }
    }

    pub async fn view(&self) -> NavigatorView {
        self.view.lock().await.clone()
    }

    async fn load(&self, requested: Option<Date>) {
        let Some(meter_id) = self.meter_id else {
            return;
        };
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        metrics::counter!("report_navigation_loads_total").increment(1);
        let result = self.fetch_view(meter_id, requested).await;

        let mut view = self.view.lock().await;
        if self.generation.load(Ordering::SeqCst) != gen {
            // A newer load was issued while this one was in flight.
            metrics::counter!("report_navigation_stale_results_total").increment(1);
            return;
        }

        match result {
            Ok(next) => *view = next,
            Err(e) => {
                tracing::warn!(error = %e, meter_id, "report load failed, keeping previous state");
                view.error = Some(e.to_string());
            }
        }
    }

    async fn fetch_view(
        &self,
        meter_id: i64,
        requested: Option<Date>,
    ) -> Result<NavigatorView, StoreError> {
        let mut reports = self.store.reports_for_meter(self.user_id, meter_id).await?;
        reports.sort_by(|a, b| b.report_date.cmp(&a.report_date));

        let shown = match requested {
            None => reports.first().cloned(),
            Some(date) => reports
                .iter()
                .find(|r| r.report_date == date)
                .cloned()
                .or_else(|| closest_report(&reports, date)),
        };

        let is_exact = match (&shown, requested) {
            (Some(report), Some(date)) => report.report_date == date,
            (Some(_), None) => true,
            (None, _) => true,
        };

        // prev/next bracket the requested date when one was given, else the
        // shown report's own date.
        let anchor = requested.or_else(|| shown.as_ref().map(|r| r.report_date));
        let (prev_date, next_date) = match anchor {
            Some(anchor) => (
                reports
                    .iter()
                    .find(|r| r.report_date < anchor)
                    .map(|r| r.report_date),
                reports
                    .iter()
                    .rev()
                    .find(|r| r.report_date > anchor)
                    .map(|r| r.report_date),
            ),
            None => (None, None),
        };

        let readings = match &shown {
            Some(report) => self
                .store
                .intervals_for_report(self.user_id, report.report_id)
                .await?
                .iter()
                .map(|row| IntervalReading {
                    hour: timeutil::hour_label(row.start_ts, self.offset),
                    kwh: row.kwh,
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(NavigatorView {
            meter_id: Some(meter_id),
            report: shown,
            readings,
            is_exact,
            prev_date,
            next_date,
            error: None,
        })
    }
}

/// First meter matching the filter, else the first meter at all.
fn resolve_meter<'a>(meters: &'a [Meter], filter: &MeterFilter) -> Option<&'a Meter> {
    meters
        .iter()
        .find(|m| {
            filter.utility.as_deref().map_or(true, |u| m.utility == u)
                && filter
                    .meter_name
                    .as_deref()
                    .map_or(true, |n| m.meter_name.as_deref() == Some(n))
        })
        .or_else(|| meters.first())
}

/// Nearest report to `date` by day distance; `reports` is sorted newest
/// first, so a tie resolves to the more recent report.
fn closest_report(reports: &[UsageReport], date: Date) -> Option<UsageReport> {
    reports
        .iter()
        .min_by_key(|r| (r.report_date - date).whole_days().abs())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use time::macros::{date, datetime};
    use tokio::sync::Semaphore;

    fn meter(meter_id: i64, utility: &str, meter_name: Option<&str>) -> Meter {
        Meter {
            meter_id,
            property_id: 1,
            utility: utility.to_string(),
            meter_name: meter_name.map(str::to_string),
        }
    }

    fn report(report_id: i64, report_date: Date) -> UsageReport {
        UsageReport {
            report_id,
            meter_id: 1,
            report_date,
            interval_minutes: 60,
            source_filename: None,
        }
    }

    #[derive(Default)]
    struct MockStore {
        meters: Vec<Meter>,
        reports: Vec<UsageReport>,
        intervals: HashMap<i64, Vec<UsageIntervalRow>>,
        report_calls: AtomicU64,
        fail_reports: AtomicBool,
        // (report_id, gate) — interval fetches for that report wait on the gate.
        hold: Option<(i64, Arc<Semaphore>)>,
    }

    #[async_trait::async_trait]
    impl ReportStore for MockStore {
        async fn meters_for_property(
            &self,
            _user_id: i64,
            _property_id: i64,
        ) -> Result<Vec<Meter>, StoreError> {
            Ok(self.meters.clone())
        }

        async fn reports_for_meter(
            &self,
            _user_id: i64,
            _meter_id: i64,
        ) -> Result<Vec<UsageReport>, StoreError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reports.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection refused".to_string()));
            }
            let mut reports = self.reports.clone();
            reports.sort_by(|a, b| b.report_date.cmp(&a.report_date));
            Ok(reports)
        }

        async fn intervals_for_report(
            &self,
            _user_id: i64,
            report_id: i64,
        ) -> Result<Vec<UsageIntervalRow>, StoreError> {
            if let Some((held_id, gate)) = &self.hold {
                if *held_id == report_id {
                    gate.acquire().await.map_err(|e| StoreError::Backend(e.to_string()))?.forget();
                }
            }
            Ok(self.intervals.get(&report_id).cloned().unwrap_or_default())
        }
    }

    fn store_with_reports(reports: Vec<UsageReport>) -> MockStore {
        MockStore {
            meters: vec![meter(1, "SDGE", None)],
            reports,
            ..MockStore::default()
        }
    }

    #[tokio::test]
    async fn attach_loads_most_recent_report() {
        let store = Arc::new(store_with_reports(vec![
            report(10, date!(2024-06-01)),
            report(11, date!(2024-06-03)),
        ]));
        let nav =
            ReportNavigator::attach(store, 7, 1, &MeterFilter::default(), UtcOffset::UTC).await;

        let view = nav.view().await;
        assert_eq!(view.meter_id, Some(1));
        assert_eq!(view.report.as_ref().unwrap().report_date, date!(2024-06-03));
        assert!(view.is_exact);
        assert_eq!(view.prev_date, Some(date!(2024-06-01)));
        assert_eq!(view.next_date, None);
    }

    #[tokio::test]
    async fn meter_filter_selects_match_then_falls_back_to_first() {
        let store = Arc::new(MockStore {
            meters: vec![meter(1, "SDGE", None), meter(2, "PGE", Some("barn"))],
            ..MockStore::default()
        });

        let filter = MeterFilter {
            utility: Some("PGE".to_string()),
            meter_name: Some("barn".to_string()),
        };
        let nav = ReportNavigator::attach(store.clone(), 7, 1, &filter, UtcOffset::UTC).await;
        assert_eq!(nav.view().await.meter_id, Some(2));

        let unmatched = MeterFilter {
            utility: Some("ConEd".to_string()),
            meter_name: None,
        };
        let nav = ReportNavigator::attach(store, 7, 1, &unmatched, UtcOffset::UTC).await;
        assert_eq!(nav.view().await.meter_id, Some(1));
    }

    #[tokio::test]
    async fn property_without_meters_is_terminal_empty_state() {
        let store = Arc::new(MockStore::default());
        let nav =
            ReportNavigator::attach(store.clone(), 7, 1, &MeterFilter::default(), UtcOffset::UTC)
                .await;

        let view = nav.view().await;
        assert_eq!(view.meter_id, None);
        assert!(view.report.is_none() && view.readings.is_empty());

        // Navigation against the terminal state issues no loads.
        nav.go_next().await;
        assert_eq!(store.report_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_date_falls_back_to_closest_with_candidates() {
        let store = Arc::new(store_with_reports(vec![
            report(10, date!(2024-06-01)),
            report(11, date!(2024-06-03)),
        ]));
        let nav =
            ReportNavigator::attach(store, 7, 1, &MeterFilter::default(), UtcOffset::UTC).await;

        nav.go_to_date(date!(2024-06-02)).await;

        let view = nav.view().await;
        assert!(!view.is_exact);
        assert_eq!(view.prev_date, Some(date!(2024-06-01)));
        assert_eq!(view.next_date, Some(date!(2024-06-03)));
        assert!(view.report.is_some());
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn go_next_without_candidate_is_a_no_op() {
        let store = Arc::new(store_with_reports(vec![
            report(10, date!(2024-06-01)),
            report(11, date!(2024-06-03)),
        ]));
        let nav = ReportNavigator::attach(store.clone(), 7, 1, &MeterFilter::default(), UtcOffset::UTC)
            .await;

        let before = nav.view().await;
        assert_eq!(before.next_date, None);
        let calls = store.report_calls.load(Ordering::SeqCst);

        nav.go_next().await;

        assert_eq!(store.report_calls.load(Ordering::SeqCst), calls);
        let after = nav.view().await;
        assert_eq!(after.report, before.report);
    }

    #[tokio::test]
    async fn go_prev_steps_to_earlier_report() {
        let store = Arc::new(store_with_reports(vec![
            report(10, date!(2024-06-01)),
            report(11, date!(2024-06-03)),
        ]));
        let nav =
            ReportNavigator::attach(store, 7, 1, &MeterFilter::default(), UtcOffset::UTC).await;

        nav.go_prev().await;

        let view = nav.view().await;
        assert_eq!(view.report.as_ref().unwrap().report_date, date!(2024-06-01));
        assert!(view.is_exact);
        assert_eq!(view.prev_date, None);
        assert_eq!(view.next_date, Some(date!(2024-06-03)));
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_state() {
        let store = Arc::new(store_with_reports(vec![report(11, date!(2024-06-03))]));
        let nav = ReportNavigator::attach(store.clone(), 7, 1, &MeterFilter::default(), UtcOffset::UTC)
            .await;
        assert!(nav.view().await.error.is_none());

        store.fail_reports.store(true, Ordering::SeqCst);
        nav.go_to_date(date!(2024-06-01)).await;

        let view = nav.view().await;
        assert!(view.error.as_deref().unwrap().contains("connection refused"));
        // Last good state survives the failure.
        assert_eq!(view.report.as_ref().unwrap().report_date, date!(2024-06-03));
    }

    #[tokio::test]
    async fn readings_are_mapped_to_hour_labels() {
        let mut store = store_with_reports(vec![report(11, date!(2024-06-15))]);
        store.intervals.insert(
            11,
            vec![
                UsageIntervalRow {
                    start_ts: datetime!(2024-06-15 00:00:00 UTC),
                    kwh: 1.2,
                },
                UsageIntervalRow {
                    start_ts: datetime!(2024-06-15 01:00:00 UTC),
                    kwh: 0.4,
                },
            ],
        );
        let nav = ReportNavigator::attach(Arc::new(store), 7, 1, &MeterFilter::default(), UtcOffset::UTC)
            .await;

        let view = nav.view().await;
        let hours: Vec<&str> = view.readings.iter().map(|r| r.hour.as_str()).collect();
        assert_eq!(hours, vec!["00:00", "01:00"]);
        assert_eq!(view.readings[0].kwh, 1.2);
    }

    #[tokio::test]
    async fn stale_load_result_is_discarded() {
        let gate = Arc::new(Semaphore::new(0));
        let mut store = store_with_reports(vec![
            report(10, date!(2024-06-01)),
            report(11, date!(2024-06-03)),
            report(12, date!(2024-06-05)),
        ]);
        store.hold = Some((10, gate.clone()));
        let store = Arc::new(store);

        let nav = Arc::new(
            ReportNavigator::attach(store, 7, 1, &MeterFilter::default(), UtcOffset::UTC).await,
        );

        // First navigation stalls inside the interval fetch for report 10.
        let stalled = {
            let nav = nav.clone();
            tokio::spawn(async move { nav.go_to_date(date!(2024-06-01)).await })
        };
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // A newer navigation completes while the first is still in flight.
        nav.go_to_date(date!(2024-06-03)).await;
        assert_eq!(
            nav.view().await.report.as_ref().unwrap().report_date,
            date!(2024-06-03)
        );

        gate.add_permits(1);
        stalled.await.unwrap();

        // The stale result must not have overwritten the newer one.
        let view = nav.view().await;
        assert_eq!(view.report.as_ref().unwrap().report_date, date!(2024-06-03));
        assert!(view.error.is_none());
    }
}
