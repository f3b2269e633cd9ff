use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::dates::parse_report_date;
use crate::model::{MetricRecord, MetricValue};
use crate::numbers::first_number;
use crate::pipeline::normalizer::{ReferenceBounds, parse_reference_range};

pub const MIN_TREND_POINTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub report_date: String,
    /// `None` when the date matched no known layout; such points sort last.
    pub parsed_date: Option<NaiveDate>,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub bounds: ReferenceBounds,
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendCandidate {
    pub canonical_test_name: String,
    pub points: usize,
}

/// Records with both a date and a number-bearing value.
pub(super) fn qualifying_point(record: &MetricRecord) -> Option<SeriesPoint> {
    let report_date = record.report_date.as_deref()?.trim();
    if report_date.is_empty() {
        return None;
    }

    let value = match &record.value {
        MetricValue::Numeric(number) => *number,
        MetricValue::Text(text) => first_number(text)?,
    };

    let bounds = record
        .reference_range
        .as_deref()
        .map(parse_reference_range)
        .unwrap_or(ReferenceBounds {
            min: None,
            max: None,
        });

    Some(SeriesPoint {
        report_date: report_date.to_string(),
        parsed_date: parse_report_date(report_date),
        value,
        unit: record.unit.clone(),
        reference_range: record.reference_range.clone(),
        bounds,
        source_file: record.source_file.clone(),
    })
}

/// Dated points ascending; undated points after them in input order.
pub fn build_series(history: &[MetricRecord], canonical_test_name: &str) -> Vec<SeriesPoint> {
    let mut points = history
        .iter()
        .filter(|record| record.canonical_test_name == canonical_test_name)
        .filter_map(qualifying_point)
        .collect::<Vec<SeriesPoint>>();

    points.sort_by(|left, right| compare_dates(left.parsed_date, right.parsed_date));
    points
}

fn compare_dates(left: Option<NaiveDate>, right: Option<NaiveDate>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Tests with at least [`MIN_TREND_POINTS`] points, most points first.
pub fn trend_candidates(history: &[MetricRecord]) -> Vec<TrendCandidate> {
    let mut counts = BTreeMap::<&str, usize>::new();
    for record in history {
        if record.canonical_test_name.is_empty() || qualifying_point(record).is_none() {
            continue;
        }
        *counts.entry(record.canonical_test_name.as_str()).or_default() += 1;
    }

    let mut candidates = counts
        .into_iter()
        .filter(|(_, points)| *points >= MIN_TREND_POINTS)
        .map(|(name, points)| TrendCandidate {
            canonical_test_name: name.to_string(),
            points,
        })
        .collect::<Vec<TrendCandidate>>();

    candidates.sort_by(|left, right| {
        right
            .points
            .cmp(&left.points)
            .then_with(|| left.canonical_test_name.cmp(&right.canonical_test_name))
    });
    candidates
}
