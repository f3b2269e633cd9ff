use std::collections::HashMap;

use tracing::debug;

use crate::model::{AppliedConversion, MetricRecord, MetricValue};
use crate::util::round_to;

use super::ranges::{RangeShape, is_placeholder_range};

/// Spelling variants (matched case-insensitively) -> canonical spelling.
const UNIT_SPELLINGS: &[(&str, &str)] = &[
    ("mg/dl", "mg/dL"),
    ("mg%", "mg/dL"),
    ("u/l", "U/L"),
    ("iu/l", "IU/L"),
    ("gm/dl", "g/dL"),
    ("g/dl", "g/dL"),
    ("gms/dl", "g/dL"),
    ("g/l", "g/L"),
    ("mm/hr", "mm/h"),
    ("mm/1sthour", "mm/h"),
    ("mm/1st hr", "mm/h"),
    ("mm/h", "mm/h"),
    ("ng/ml", "ng/mL"),
    ("ng/dl", "ng/dL"),
    ("pg/ml", "pg/mL"),
    ("ug/dl", "µg/dL"),
    ("mcg/dl", "µg/dL"),
    ("µg/dl", "µg/dL"),
    ("µiu/ml", "µIU/mL"),
    ("uiu/ml", "µIU/mL"),
    ("miu/l", "mIU/L"),
    ("mmol/l", "mmol/L"),
    ("umol/l", "µmol/L"),
    ("µmol/l", "µmol/L"),
    ("meq/l", "mEq/L"),
    ("fl", "fL"),
    ("kg/m^2", "kg/m²"),
    ("kg/m2", "kg/m²"),
    ("10^3/ul", "10^3/µL"),
    ("10^3/µl", "10^3/µL"),
    ("10^6/ul", "10^6/µL"),
    ("10^6/µl", "10^6/µL"),
    ("cells/cumm", "cells/cumm"),
    ("cells/cu.mm", "cells/cumm"),
    ("/cumm", "cells/cumm"),
];

/// Cross-system conversion for one canonical test. The factor is kept on the
/// record after conversion so the original reading can be recovered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionRule {
    pub from_unit: &'static str,
    pub to_unit: &'static str,
    pub factor: f64,
    pub decimals: u32,
}

const CHOLESTEROL_MMOL: ConversionRule = ConversionRule {
    from_unit: "mmol/L",
    to_unit: "mg/dL",
    factor: 38.67,
    decimals: 1,
};

const TRIGLYCERIDES_MMOL: ConversionRule = ConversionRule {
    from_unit: "mmol/L",
    to_unit: "mg/dL",
    factor: 88.57,
    decimals: 1,
};

const GLUCOSE_MMOL: ConversionRule = ConversionRule {
    from_unit: "mmol/L",
    to_unit: "mg/dL",
    factor: 18.02,
    decimals: 1,
};

const CELL_COUNT_CUMM: ConversionRule = ConversionRule {
    from_unit: "cells/cumm",
    to_unit: "10^3/µL",
    factor: 0.001,
    decimals: 2,
};

const UNIT_CONVERSIONS: &[(&str, ConversionRule)] = &[
    ("Total Cholesterol", CHOLESTEROL_MMOL),
    ("LDL Cholesterol", CHOLESTEROL_MMOL),
    ("HDL Cholesterol", CHOLESTEROL_MMOL),
    ("VLDL Cholesterol", CHOLESTEROL_MMOL),
    ("Non-HDL Cholesterol", CHOLESTEROL_MMOL),
    ("Triglycerides", TRIGLYCERIDES_MMOL),
    ("Fasting Glucose", GLUCOSE_MMOL),
    ("Glucose", GLUCOSE_MMOL),
    ("WBC Count", CELL_COUNT_CUMM),
    ("Platelet Count", CELL_COUNT_CUMM),
];

#[derive(Debug, Clone)]
pub struct UnitNormalizer {
    spellings: HashMap<String, &'static str>,
    conversions: HashMap<&'static str, ConversionRule>,
}

impl UnitNormalizer {
    pub fn new() -> Self {
        let mut spellings = HashMap::new();
        for (variant, canonical) in UNIT_SPELLINGS {
            spellings.insert(variant.to_lowercase(), *canonical);
            spellings.insert(canonical.to_lowercase(), *canonical);
        }

        Self {
            spellings,
            conversions: UNIT_CONVERSIONS.iter().copied().collect(),
        }
    }

    /// Canonical spelling when known, otherwise the tidied input. Empty units become `None`.
    pub fn normalize_spelling(&self, unit: &str) -> Option<String> {
        let tidy = tidy_unit(unit);
        if tidy.is_empty() {
            return None;
        }

        let canonical = self
            .spellings
            .get(&tidy.to_lowercase())
            .map(|canonical| canonical.to_string())
            .unwrap_or(tidy);
        Some(canonical)
    }

    pub fn conversion_for(&self, canonical_test_name: &str) -> Option<ConversionRule> {
        self.conversions.get(canonical_test_name).copied()
    }

    /// Rewrites unit spelling and, when the test has a known conversion from the
    /// record's unit, value + unit + reference range together. A range that is
    /// present but has no parseable bounds blocks the conversion. Returns whether
    /// a conversion fired.
    pub fn apply(&self, record: &mut MetricRecord) -> bool {
        record.unit = record
            .unit
            .as_deref()
            .and_then(|unit| self.normalize_spelling(unit));

        let Some(rule) = self.conversion_for(&record.canonical_test_name) else {
            return false;
        };
        let Some(unit) = record.unit.as_deref() else {
            return false;
        };
        if !unit.eq_ignore_ascii_case(rule.from_unit) {
            return false;
        }
        let Some(number) = record.value.as_number() else {
            return false;
        };

        let scaled_range = match record.reference_range.as_deref() {
            Some(range) if !is_placeholder_range(range) => {
                let shape = RangeShape::parse(range).scaled(rule.factor, rule.decimals);
                let Some(rendered) = shape.render() else {
                    debug!(
                        test_name = %record.canonical_test_name,
                        "range not convertible, keeping source units"
                    );
                    return false;
                };
                Some(rendered)
            }
            _ => None,
        };

        let from_unit = unit.to_string();
        record.value = MetricValue::Numeric(round_to(number * rule.factor, rule.decimals));
        record.unit = Some(rule.to_unit.to_string());
        if scaled_range.is_some() {
            record.reference_range = scaled_range;
        }
        record.conversion = Some(AppliedConversion {
            from_unit,
            to_unit: rule.to_unit.to_string(),
            factor: rule.factor,
        });

        true
    }
}

impl Default for UnitNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn tidy_unit(unit: &str) -> String {
    unit.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .replace(" /", "/")
        .replace("/ ", "/")
        .replace('\u{3bc}', "\u{b5}")
}
