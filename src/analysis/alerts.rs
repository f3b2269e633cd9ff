use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::model::MetricRecord;

use super::categories::{category_for, category_names};
use super::series::{SeriesPoint, qualifying_point};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    High,
    Low,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    Current,
    Stale,
    VeryStale,
    /// The report date did not parse, so its age is unknown.
    Unknown,
}

impl Staleness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Stale => "stale",
            Self::VeryStale => "very_stale",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub stale_after_months: u32,
    pub very_stale_after_months: u32,
}

impl StalenessPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            stale_after_months: config.stale_after_months,
            very_stale_after_months: config.very_stale_after_months,
        }
    }

    pub fn classify(&self, report_date: Option<NaiveDate>, today: NaiveDate) -> Staleness {
        let Some(report_date) = report_date else {
            return Staleness::Unknown;
        };

        let reached = |months: u32| {
            today
                .checked_sub_months(Months::new(months))
                .is_some_and(|threshold| report_date <= threshold)
        };

        if reached(self.very_stale_after_months) {
            Staleness::VeryStale
        } else if reached(self.stale_after_months) {
            Staleness::Stale
        } else {
            Staleness::Current
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEntry {
    pub test_name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub report_date: String,
    pub status: AlertStatus,
    /// Unavailable when the crossed bound is zero.
    pub deviation_percent: Option<i64>,
    pub staleness: Staleness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertGroup {
    pub category: String,
    pub alerts: Vec<AlertEntry>,
}

/// Out-of-range status of one reading, with the rounded percentage past the
/// crossed bound. A missing bound is never crossed.
pub fn classify_reading(
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Option<(AlertStatus, Option<i64>)> {
    if let Some(min) = min.filter(|min| min.is_finite()) {
        if value < min {
            return Some((AlertStatus::Low, percent_past(min - value, min)));
        }
    }

    if let Some(max) = max.filter(|max| max.is_finite()) {
        if value > max {
            return Some((AlertStatus::High, percent_past(value - max, max)));
        }
    }

    None
}

fn percent_past(distance: f64, bound: f64) -> Option<i64> {
    if bound == 0.0 {
        return None;
    }
    Some((distance / bound * 100.0).round() as i64)
}

/// Alerts for the latest reading of every test, grouped by category in table
/// order with `Other` last. Empty categories are omitted.
pub fn compute_alerts(
    history: &[MetricRecord],
    today: NaiveDate,
    policy: &StalenessPolicy,
) -> Vec<AlertGroup> {
    let mut grouped = HashMap::<&'static str, Vec<AlertEntry>>::new();

    for (test_name, point) in latest_points(history) {
        let Some((status, deviation_percent)) =
            classify_reading(point.value, point.bounds.min, point.bounds.max)
        else {
            continue;
        };

        let entry = AlertEntry {
            staleness: policy.classify(point.parsed_date, today),
            test_name: test_name.to_string(),
            value: point.value,
            unit: point.unit,
            reference_range: point.reference_range,
            report_date: point.report_date,
            status,
            deviation_percent,
        };
        grouped.entry(category_for(test_name)).or_default().push(entry);
    }

    category_names()
        .filter_map(|category| {
            let mut alerts = grouped.remove(category)?;
            alerts.sort_by(compare_alerts);
            Some(AlertGroup {
                category: category.to_string(),
                alerts,
            })
        })
        .collect()
}

/// Latest qualifying point per canonical test: latest parsed date, or the last
/// one in input order when no date parses. Output is ordered by test name.
fn latest_points(history: &[MetricRecord]) -> Vec<(&str, SeriesPoint)> {
    let mut latest = HashMap::<&str, SeriesPoint>::new();

    for record in history {
        if record.canonical_test_name.is_empty() {
            continue;
        }
        let Some(point) = qualifying_point(record) else {
            continue;
        };

        let replace = match latest.get(record.canonical_test_name.as_str()) {
            None => true,
            Some(current) => match (current.parsed_date, point.parsed_date) {
                (Some(current), Some(candidate)) => candidate >= current,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => true,
            },
        };
        if replace {
            latest.insert(record.canonical_test_name.as_str(), point);
        }
    }

    let mut points = latest.into_iter().collect::<Vec<(&str, SeriesPoint)>>();
    points.sort_by(|left, right| left.0.cmp(right.0));
    points
}

fn compare_alerts(left: &AlertEntry, right: &AlertEntry) -> Ordering {
    let by_deviation = match (left.deviation_percent, right.deviation_percent) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_deviation.then_with(|| left.test_name.cmp(&right.test_name))
}
