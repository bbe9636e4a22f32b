//! Parser for NAESB ESPI-style interval usage reports.
//!
//! Utilities export these as XML with one `IntervalReading` element per
//! interval, carrying a `start` child (epoch seconds) and a `value` child
//! (watt-hours). Namespaces vary between utilities, so elements are matched
//! by local name only.

use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::timeutil;

#[derive(thiserror::Error, Debug)]
pub enum EspiError {
    #[error("malformed interval report: {0}")]
    MalformedReport(String),
}

/// Persisted form of one reading: the interval start instant and kWh.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub start_ts: OffsetDateTime,
    pub kwh: f64,
}

impl ParsedReading {
    /// Chart-facing (hour label, kWh) pair in the reference timezone.
    pub fn chart_reading(&self, offset: UtcOffset) -> IntervalReading {
        IntervalReading {
            hour: timeutil::hour_label(self.start_ts, offset),
            kwh: self.kwh,
        }
    }
}

/// One (hour label, kWh) pair as displayed on the usage chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalReading {
    pub hour: String,
    pub kwh: f64,
}

/// Result of parsing one uploaded document.
///
/// `report_date` is the local calendar date of the first reading; `None`
/// when the document held no readings, in which case the caller treats the
/// upload as failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub report_date: Option<Date>,
    pub readings: Vec<ParsedReading>,
}

/// Decode an interval report into ordered readings.
///
/// Document order is preserved. A document that is not well-formed XML
/// fails with [`EspiError::MalformedReport`]; a missing or non-numeric
/// `start`/`value` child defaults to 0 so one bad interval cannot sink the
/// whole report.
pub fn parse_interval_report(xml: &str, offset: UtcOffset) -> Result<ParsedReport, EspiError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| EspiError::MalformedReport(e.to_string()))?;

    let mut readings = Vec::new();
    let mut report_date = None;

    for node in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "IntervalReading")
    {
        let start_secs = child_integer(node, "start");
        let value_wh = child_integer(node, "value");

        let start_ts = OffsetDateTime::from_unix_timestamp(start_secs)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        if report_date.is_none() {
            report_date = Some(timeutil::local_calendar_date(start_ts, offset));
        }

        readings.push(ParsedReading {
            start_ts,
            kwh: value_wh as f64 / 1000.0,
        });
    }

    Ok(ParsedReport {
        report_date,
        readings,
    })
}

/// First descendant element with the given local name, parsed as an
/// integer. Searching descendants covers both flat readings and the usual
/// `timePeriod`-nested `start`. Missing or non-numeric content defaults
/// to 0.
fn child_integer(node: roxmltree::Node<'_, '_>, name: &str) -> i64 {
    let text = node
        .descendants()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .and_then(|c| c.text())
        .map(str::trim)
        .unwrap_or("");

    match text.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(element = name, content = text, "non-numeric interval field, defaulting to 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const SINGLE_READING: &str = r#"
        <espi:IntervalBlock xmlns:espi="http://naesb.org/espi">
            <espi:IntervalReading>
                <espi:timePeriod>
                    <espi:duration>3600</espi:duration>
                    <espi:start>1718481000</espi:start>
                </espi:timePeriod>
                <espi:value>2500</espi:value>
            </espi:IntervalReading>
        </espi:IntervalBlock>
    "#;

    #[test]
    fn parses_namespaced_reading_into_kwh() {
        let report = parse_interval_report(SINGLE_READING, UtcOffset::UTC).unwrap();
        assert_eq!(report.readings.len(), 1);
        // 1718481000 is 2024-06-15T19:50:00Z; 2500 Wh is 2.5 kWh.
        assert_eq!(report.readings[0].kwh, 2.5);
        assert_eq!(
            report.readings[0].chart_reading(UtcOffset::UTC).hour,
            "19:50"
        );
        assert_eq!(report.report_date, Some(date!(2024-06-15)));
    }

    #[test]
    fn preserves_document_order() {
        let xml = r#"
            <IntervalBlock>
                <IntervalReading><start>1718481000</start><value>1000</value></IntervalReading>
                <IntervalReading><start>1718484600</start><value>2000</value></IntervalReading>
                <IntervalReading><start>1718488200</start><value>500</value></IntervalReading>
            </IntervalBlock>
        "#;
        let report = parse_interval_report(xml, UtcOffset::UTC).unwrap();
        let kwh: Vec<f64> = report.readings.iter().map(|r| r.kwh).collect();
        assert_eq!(kwh, vec![1.0, 2.0, 0.5]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let a = parse_interval_report(SINGLE_READING, UtcOffset::UTC).unwrap();
        let b = parse_interval_report(SINGLE_READING, UtcOffset::UTC).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_xml_is_an_error_not_a_panic() {
        let res = parse_interval_report("<IntervalBlock><IntervalReading>", UtcOffset::UTC);
        assert!(matches!(res, Err(EspiError::MalformedReport(_))));
    }

    #[test]
    fn document_without_readings_has_no_report_date() {
        let report = parse_interval_report("<UsagePoint/>", UtcOffset::UTC).unwrap();
        assert!(report.readings.is_empty());
        assert_eq!(report.report_date, None);
    }

    #[test]
    fn missing_or_non_numeric_fields_default_to_zero() {
        let xml = r#"
            <IntervalBlock>
                <IntervalReading><value>1500</value></IntervalReading>
                <IntervalReading><start>not-a-number</start><value>abc</value></IntervalReading>
            </IntervalBlock>
        "#;
        let report = parse_interval_report(xml, UtcOffset::UTC).unwrap();
        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.readings[0].start_ts, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(report.readings[0].kwh, 1.5);
        assert_eq!(report.readings[1].kwh, 0.0);
    }
}
