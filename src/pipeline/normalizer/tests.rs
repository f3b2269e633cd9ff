use std::collections::BTreeMap;

use super::names::builtin_canonical_names;
use super::*;
use crate::model::{MetricRecord, MetricValue};

fn record(test_name: &str, value: MetricValue, unit: Option<&str>) -> MetricRecord {
    MetricRecord {
        test_name: test_name.to_string(),
        canonical_test_name: test_name.to_string(),
        value,
        unit: unit.map(str::to_string),
        reference_range: None,
        report_date: None,
        source_file: None,
        conversion: None,
    }
}

fn dated(canonical: &str, range: Option<&str>, date: &str) -> MetricRecord {
    let mut prior = record(canonical, MetricValue::Numeric(1.0), None);
    prior.reference_range = range.map(str::to_string);
    prior.report_date = Some(date.to_string());
    prior
}

fn default_normalizer() -> Normalizer {
    Normalizer::new(&PipelineConfig::default()).expect("normalizer should build")
}

#[test]
fn canonicalize_name_is_case_and_word_order_independent() {
    let normalizer = default_normalizer();
    assert_eq!(normalizer.canonicalize_name("Cholesterol, Total"), "Total Cholesterol");
    assert_eq!(normalizer.canonicalize_name("total  CHOLESTEROL"), "Total Cholesterol");
    assert_eq!(normalizer.canonicalize_name("Glucose-Fasting"), "Fasting Glucose");
    assert_eq!(normalizer.canonicalize_name("fasting glucose"), "Fasting Glucose");
}

#[test]
fn canonicalize_name_applies_keyword_rules_and_passes_unknown_names_through() {
    let normalizer = default_normalizer();
    assert_eq!(normalizer.canonicalize_name("Vitamin D, 25-Hydroxy"), "Vitamin D");
    assert_eq!(normalizer.canonicalize_name("HbA1c (Glycated)"), "HbA1c");
    assert_eq!(normalizer.canonicalize_name("Calcium (Total), Serum"), "Calcium Total");
    assert_eq!(normalizer.canonicalize_name("  Serum Ferritin "), "Serum Ferritin");
    assert_eq!(normalizer.canonicalize_name("   "), "");
}

#[test]
fn canonical_names_map_to_themselves() {
    let normalizer = default_normalizer();
    for canonical in builtin_canonical_names() {
        assert_eq!(normalizer.canonicalize_name(canonical), canonical);
    }
}

#[test]
fn configured_aliases_override_builtin_entries() {
    let mut config = PipelineConfig::default();
    config.aliases = BTreeMap::from([
        ("Hb".to_string(), "Haemoglobin Mass".to_string()),
        ("S. Ferritin".to_string(), "Ferritin".to_string()),
    ]);
    let normalizer = Normalizer::new(&config).expect("normalizer should build");

    assert_eq!(normalizer.canonicalize_name("HB"), "Haemoglobin Mass");
    assert_eq!(normalizer.canonicalize_name("Ferritin S"), "Ferritin");
    assert_eq!(normalizer.canonicalize_name("Haemoglobin"), "Hemoglobin");
}

#[test]
fn unit_spelling_table_is_case_and_spacing_insensitive() {
    let units = UnitNormalizer::new();
    assert_eq!(units.normalize_spelling("mg/dl").as_deref(), Some("mg/dL"));
    assert_eq!(units.normalize_spelling("gm / dl").as_deref(), Some("g/dL"));
    assert_eq!(units.normalize_spelling("mm/hr").as_deref(), Some("mm/h"));
    assert_eq!(units.normalize_spelling("KG/M2").as_deref(), Some("kg/m²"));
    assert_eq!(units.normalize_spelling("μIU/mL").as_deref(), Some("µIU/mL"));
    assert_eq!(units.normalize_spelling("furlongs").as_deref(), Some("furlongs"));
    assert_eq!(units.normalize_spelling("  "), None);
}

#[test]
fn unit_conversion_rewrites_value_unit_and_range_together() {
    let normalizer = default_normalizer();
    let mut converted = record("Cholesterol", MetricValue::Numeric(5.2), Some("mmol/l"));
    converted.reference_range = Some("< 5.2".to_string());

    assert!(normalizer.normalize(&mut converted));
    assert_eq!(converted.canonical_test_name, "Total Cholesterol");
    assert_eq!(converted.value, MetricValue::Numeric(201.1));
    assert_eq!(converted.unit.as_deref(), Some("mg/dL"));
    assert_eq!(converted.reference_range.as_deref(), Some("<201.1"));

    let conversion = converted.conversion.expect("conversion recorded");
    assert_eq!(conversion.from_unit, "mmol/L");
    assert_eq!(conversion.to_unit, "mg/dL");
    assert_eq!(conversion.factor, 38.67);
}

#[test]
fn cell_counts_convert_to_thousands_per_microlitre() {
    let normalizer = default_normalizer();
    let mut wbc = record(
        "Total Leucocyte Count",
        MetricValue::Numeric(7500.0),
        Some("cells/cu.mm"),
    );
    wbc.reference_range = Some("4000 - 11000".to_string());

    assert!(normalizer.normalize(&mut wbc));
    assert_eq!(wbc.value, MetricValue::Numeric(7.5));
    assert_eq!(wbc.unit.as_deref(), Some("10^3/µL"));
    assert_eq!(wbc.reference_range.as_deref(), Some("4-11"));
}

#[test]
fn unit_conversion_skips_categorical_values_and_unknown_tests() {
    let normalizer = default_normalizer();

    let mut categorical = record(
        "Triglycerides",
        MetricValue::Text("negative".to_string()),
        Some("mmol/L"),
    );
    assert!(!normalizer.normalize(&mut categorical));
    assert_eq!(categorical.value, MetricValue::Text("negative".to_string()));
    assert_eq!(categorical.unit.as_deref(), Some("mmol/L"));
    assert!(categorical.conversion.is_none());

    let mut sodium = record("Sodium", MetricValue::Numeric(140.0), Some("mmol/l"));
    assert!(!normalizer.normalize(&mut sodium));
    assert_eq!(sodium.value, MetricValue::Numeric(140.0));
    assert_eq!(sodium.unit.as_deref(), Some("mmol/L"));
}

#[test]
fn unit_conversion_is_skipped_when_the_range_cannot_be_rescaled() {
    let normalizer = default_normalizer();
    let mut reading = record("Cholesterol", MetricValue::Numeric(5.2), Some("mmol/L"));
    reading.reference_range = Some("3.0 to 5.2 mmol/L".to_string());

    assert!(!normalizer.normalize(&mut reading));
    assert_eq!(reading.value, MetricValue::Numeric(5.2));
    assert_eq!(reading.unit.as_deref(), Some("mmol/L"));
    assert_eq!(reading.reference_range.as_deref(), Some("3 to 5.2"));
    assert!(reading.conversion.is_none());

    let mut again = reading.clone();
    assert!(!normalizer.normalize(&mut again));
    assert_eq!(again, reading);
}

#[test]
fn unit_conversion_treats_placeholder_ranges_as_absent() {
    let normalizer = default_normalizer();
    let mut reading = record("Cholesterol", MetricValue::Numeric(5.2), Some("mmol/L"));
    reading.reference_range = Some("N/A".to_string());

    assert!(normalizer.normalize(&mut reading));
    assert_eq!(reading.value, MetricValue::Numeric(201.1));
    assert_eq!(reading.unit.as_deref(), Some("mg/dL"));
    assert_eq!(reading.reference_range, None);
}

#[test]
fn parse_reference_range_reads_interval_and_open_bounds() {
    assert_eq!(
        parse_reference_range("13.5-17.5"),
        ReferenceBounds {
            min: Some(13.5),
            max: Some(17.5)
        }
    );
    assert_eq!(
        parse_reference_range("< 200"),
        ReferenceBounds {
            min: Some(0.0),
            max: Some(200.0)
        }
    );
    assert_eq!(
        parse_reference_range("> 50"),
        ReferenceBounds {
            min: Some(50.0),
            max: None
        }
    );
    assert_eq!(
        parse_reference_range("abnormal"),
        ReferenceBounds {
            min: None,
            max: None
        }
    );
}

#[test]
fn parse_reference_range_handles_units_grouping_and_unicode_signs() {
    assert_eq!(
        parse_reference_range("30 – 100 ng/mL"),
        ReferenceBounds {
            min: Some(30.0),
            max: Some(100.0)
        }
    );
    assert_eq!(
        parse_reference_range("1,50,000 - 4,10,000"),
        ReferenceBounds {
            min: Some(150000.0),
            max: Some(410000.0)
        }
    );
    assert_eq!(
        parse_reference_range("≤ 5.7"),
        ReferenceBounds {
            min: Some(0.0),
            max: Some(5.7)
        }
    );
}

#[test]
fn clean_range_strips_units_labels_and_decimal_zeros() {
    let normalizer = default_normalizer();
    assert_eq!(
        normalizer.clean_range(Some("<200.00 mg/dL")).as_deref(),
        Some("<200")
    );
    assert_eq!(
        normalizer.clean_range(Some("Optimal : < 100.0 mg/dL")).as_deref(),
        Some("<100")
    );
    assert_eq!(
        normalizer.clean_range(Some("13.5 - 17.5 g/dL")).as_deref(),
        Some("13.5-17.5")
    );
    assert_eq!(normalizer.clean_range(Some("<5.7%")).as_deref(), Some("<5.7"));
    assert_eq!(normalizer.clean_range(Some("Negative")).as_deref(), Some("Negative"));
}

#[test]
fn clean_range_treats_placeholders_as_absent() {
    let normalizer = default_normalizer();
    for placeholder in ["None", "null", "N/A", "-", "  ", ""] {
        assert_eq!(normalizer.clean_range(Some(placeholder)), None, "{placeholder:?}");
    }
    assert_eq!(normalizer.clean_range(None), None);
}

#[test]
fn clean_range_strips_units_containing_digits_in_one_pass() {
    let normalizer = default_normalizer();
    let cases = [
        ("> 60 mL/min/1.73m2", ">60"),
        ("90 - 120 mL/min/1.73 m2", "90-120"),
        ("4.0 - 11.0 10^3/µL", "4-11"),
        ("3.5 to 5.2 mmol/L", "3.5 to 5.2"),
    ];

    for (raw, expected) in cases {
        let once = normalizer.clean_range(Some(raw));
        assert_eq!(once.as_deref(), Some(expected), "{raw:?}");
        assert_eq!(normalizer.clean_range(once.as_deref()), once, "{raw:?}");
    }
}

#[test]
fn normalize_is_idempotent() {
    let normalizer = default_normalizer();
    let mut first = record("Serum Triglycerides", MetricValue::Numeric(1.7), Some("mmol / L"));
    first.reference_range = Some("Desirable: < 1.70 mmol/L".to_string());
    first.report_date = Some("01/Jun/2022".to_string());

    normalizer.normalize(&mut first);
    let mut second = first.clone();
    assert!(!normalizer.normalize(&mut second));

    assert_eq!(second, first);
    assert_eq!(first.report_date.as_deref(), Some("2022-06-01"));
    assert_eq!(first.unit.as_deref(), Some("mg/dL"));
}

#[test]
fn date_normalization_can_be_switched_off() {
    let config = PipelineConfig {
        normalize_dates: false,
        ..PipelineConfig::default()
    };
    let normalizer = Normalizer::new(&config).expect("normalizer should build");
    assert_eq!(
        normalizer.normalize_date(Some(" 01/Jun/2022 ")).as_deref(),
        Some("01/Jun/2022")
    );
    assert_eq!(normalizer.normalize_date(Some("")), None);
}

#[test]
fn autofill_copies_most_recent_strictly_earlier_range() {
    let history = vec![
        dated("Vitamin D", Some("30-100"), "2021-01-01"),
        dated("Vitamin D", Some("20-100"), "2021-06-01"),
        dated("Vitamin D", Some("10-50"), "2023-01-01"),
        dated("Vitamin D", Some("0-1"), "2022-06-01"),
        dated("Vitamin B12", Some("200-900"), "2022-01-01"),
    ];
    let normalizer = default_normalizer();
    let mut current = dated("Vitamin D", None, "2022-06-01");

    assert!(normalizer.autofill_range(&mut current, &history));
    assert_eq!(current.reference_range.as_deref(), Some("20-100"));
}

#[test]
fn autofill_never_fabricates_a_range() {
    let normalizer = default_normalizer();
    let history = vec![
        dated("Vitamin D", Some("30-100"), "2023-01-01"),
        dated("Vitamin D", None, "2020-01-01"),
        dated("Vitamin B12", Some("200-900"), "2019-01-01"),
    ];

    let mut without_prior = dated("Vitamin D", None, "2022-06-01");
    assert!(!normalizer.autofill_range(&mut without_prior, &history));
    assert_eq!(without_prior.reference_range, None);

    let mut undated = dated("Vitamin D", None, "last visit");
    assert!(!normalizer.autofill_range(&mut undated, &history));
    assert_eq!(undated.reference_range, None);

    let mut already_set = dated("Vitamin D", Some("25-80"), "2024-01-01");
    assert!(!normalizer.autofill_range(&mut already_set, &history));
    assert_eq!(already_set.reference_range.as_deref(), Some("25-80"));
}
