use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::dates::parse_report_date;
use crate::model::MetricRecord;
use crate::numbers::{NumberToken, scan_numbers};
use crate::util::{format_number, round_to};

const DASHES: [char; 3] = ['-', '\u{2013}', '\u{2014}'];
const EMPTY_RANGE_MARKERS: [&str; 6] = ["none", "null", "n/a", "na", "-", "--"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeShape {
    Interval { min: f64, max: f64 },
    Below { max: f64 },
    Above { min: f64 },
    Unparsed,
}

impl RangeShape {
    pub fn parse(text: &str) -> Self {
        let numbers = scan_numbers(text, false);

        for pair in numbers.windows(2) {
            if separated_by_dash(text, &pair[0], &pair[1]) {
                return Self::Interval {
                    min: pair[0].value,
                    max: pair[1].value,
                };
            }
        }

        if let Some(sign) = text.find(['<', '\u{2264}']) {
            if let Some(max) = first_number_after(&numbers, sign) {
                return Self::Below { max };
            }
        }

        if let Some(sign) = text.find(['>', '\u{2265}']) {
            if let Some(min) = first_number_after(&numbers, sign) {
                return Self::Above { min };
            }
        }

        Self::Unparsed
    }

    pub fn bounds(self) -> ReferenceBounds {
        match self {
            Self::Interval { min, max } => ReferenceBounds {
                min: Some(min),
                max: Some(max),
            },
            Self::Below { max } => ReferenceBounds {
                min: Some(0.0),
                max: Some(max),
            },
            Self::Above { min } => ReferenceBounds {
                min: Some(min),
                max: None,
            },
            Self::Unparsed => ReferenceBounds {
                min: None,
                max: None,
            },
        }
    }

    pub fn scaled(self, factor: f64, decimals: u32) -> Self {
        let scale = |value: f64| round_to(value * factor, decimals);
        match self {
            Self::Interval { min, max } => Self::Interval {
                min: scale(min),
                max: scale(max),
            },
            Self::Below { max } => Self::Below { max: scale(max) },
            Self::Above { min } => Self::Above { min: scale(min) },
            Self::Unparsed => Self::Unparsed,
        }
    }

    pub fn render(self) -> Option<String> {
        match self {
            Self::Interval { min, max } => {
                Some(format!("{}-{}", format_number(min), format_number(max)))
            }
            Self::Below { max } => Some(format!("<{}", format_number(max))),
            Self::Above { min } => Some(format!(">{}", format_number(min))),
            Self::Unparsed => None,
        }
    }
}

/// Blank text or a marker such as `None` or `N/A` standing in for no range.
pub(super) fn is_placeholder_range(raw: &str) -> bool {
    let collapsed = raw.split_whitespace().collect::<Vec<&str>>().join(" ");
    collapsed.is_empty() || EMPTY_RANGE_MARKERS.contains(&collapsed.to_lowercase().as_str())
}

pub fn parse_reference_range(text: &str) -> ReferenceBounds {
    RangeShape::parse(text).bounds()
}

fn separated_by_dash(text: &str, left: &NumberToken, right: &NumberToken) -> bool {
    let between = text[left.end..right.start].trim();
    let mut characters = between.chars();
    matches!(
        (characters.next(), characters.next()),
        (Some(dash), None) if DASHES.contains(&dash)
    )
}

fn first_number_after(numbers: &[NumberToken], offset: usize) -> Option<f64> {
    numbers
        .iter()
        .find(|token| token.start > offset)
        .map(|token| token.value)
}

/// Textual cleanup of reference ranges. Never depends on whether the numbers parse.
#[derive(Debug)]
pub struct RangeCleaner {
    qualifier_label: Regex,
    trailing_unit: Regex,
    decimal: Regex,
    dash_spacing: Regex,
    comparator_spacing: Regex,
}

impl RangeCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            qualifier_label: Regex::new(
                r"(?i)^(?:optimal|desirable|normal|reference(?:\s+range)?|ref\.?\s*range)\s*:\s*",
            )
            .context("failed to compile qualifier label regex")?,
            // Shortest head ending in a digit, then unit words that never start
            // with a digit, so units such as `mL/min/1.73m2` go in one pass.
            trailing_unit: Regex::new(
                r"^(?P<head>.*?\d)\s*(?:10\^\d+\s*/\s*)?[A-Za-zµμ%][A-Za-z0-9µμ%/^.]*(?:\s+[A-Za-zµμ%/][A-Za-z0-9µμ%/^.]*)*$",
            )
            .context("failed to compile trailing unit regex")?,
            decimal: Regex::new(r"\d+\.\d+").context("failed to compile decimal regex")?,
            dash_spacing: Regex::new(r"(\d)\s*[-\x{2013}\x{2014}]\s*(\d)")
                .context("failed to compile dash spacing regex")?,
            comparator_spacing: Regex::new(r"([<>\x{2264}\x{2265}])\s+")
                .context("failed to compile comparator spacing regex")?,
        })
    }

    /// `"<200.00 mg/dL"` -> `"<200"`. Placeholder text such as `None` becomes `None`.
    pub fn clean(&self, raw: &str) -> Option<String> {
        if is_placeholder_range(raw) {
            return None;
        }
        let collapsed = raw.split_whitespace().collect::<Vec<&str>>().join(" ");

        let unlabeled = self.qualifier_label.replace(&collapsed, "").into_owned();
        let without_unit = match self.trailing_unit.captures(&unlabeled) {
            Some(captures) => captures
                .name("head")
                .map(|head| head.as_str().to_string())
                .unwrap_or_else(|| unlabeled.clone()),
            None => unlabeled.clone(),
        };
        let decimals = self
            .decimal
            .replace_all(&without_unit, |captures: &regex::Captures| {
                captures[0]
                    .trim_end_matches('0')
                    .trim_end_matches('.')
                    .to_string()
            })
            .into_owned();
        let dashes = self.dash_spacing.replace_all(&decimals, "${1}-${2}");
        let cleaned = self.comparator_spacing.replace_all(&dashes, "${1}");

        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }
        Some(cleaned.to_string())
    }
}

/// Copies the range of the most recent strictly earlier record of the same
/// canonical test. Returns whether a range was filled in.
pub fn autofill_reference_range(record: &mut MetricRecord, history: &[MetricRecord]) -> bool {
    if record.reference_range.is_some() {
        return false;
    }

    let Some(record_date) = record.report_date.as_deref().and_then(parse_report_date) else {
        return false;
    };

    let source = history
        .iter()
        .filter(|prior| prior.canonical_test_name == record.canonical_test_name)
        .filter_map(|prior| {
            let range = prior.reference_range.as_deref()?;
            let date = prior.report_date.as_deref().and_then(parse_report_date)?;
            (!range.trim().is_empty() && date < record_date).then_some((date, range))
        })
        .max_by_key(|(date, _)| *date);

    match source {
        Some((_, range)) => {
            record.reference_range = Some(range.to_string());
            true
        }
        None => false,
    }
}
