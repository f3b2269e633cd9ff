use std::collections::{BTreeMap, HashMap};

/// Variant spelling -> canonical name. Lookup keys are built with [`alias_key`],
/// so case, punctuation and word order do not matter.
const TEST_NAME_ALIASES: &[(&str, &str)] = &[
    ("Cholesterol", "Total Cholesterol"),
    ("Cholesterol, Total", "Total Cholesterol"),
    ("Serum Cholesterol", "Total Cholesterol"),
    ("LDL Cholesterol,Direct", "LDL Cholesterol"),
    ("LDL, Direct", "LDL Cholesterol"),
    ("LDL", "LDL Cholesterol"),
    ("HDL", "HDL Cholesterol"),
    ("HDL Cholesterol, Direct", "HDL Cholesterol"),
    ("VLDL", "VLDL Cholesterol"),
    ("Non HDL", "Non-HDL Cholesterol"),
    ("Triglyceride", "Triglycerides"),
    ("Serum Triglycerides", "Triglycerides"),
    ("ERYTHROCYTE SEDIMENTATION RATE (ESR)", "ESR"),
    ("Erythrocyte Sedimentation Rate (Modified Westergren)", "ESR"),
    ("Erythrocyte Sedimentation Rate", "ESR"),
    ("GLUCOSE, FASTING (F), PLASMA", "Fasting Glucose"),
    ("Glucose-Fasting", "Fasting Glucose"),
    ("Fasting Blood Sugar", "Fasting Glucose"),
    ("Fasting Plasma Glucose", "Fasting Glucose"),
    ("FBS", "Fasting Glucose"),
    ("Bilirubin - Direct", "Direct Bilirubin"),
    ("Bilirubin-Total", "Total Bilirubin"),
    ("Serum SGPT/ALT", "SGPT/ALT"),
    ("SGPT", "SGPT/ALT"),
    ("ALT", "SGPT/ALT"),
    ("Alanine Aminotransferase", "SGPT/ALT"),
    ("Serum SGOT/AST", "SGOT/AST"),
    ("SGOT", "SGOT/AST"),
    ("AST", "SGOT/AST"),
    ("Aspartate Aminotransferase", "SGOT/AST"),
    ("Serum Uric Acid", "Uric Acid"),
    ("Serium URIC ACID", "Uric Acid"),
    ("Serum Albumin", "Albumin"),
    ("Serum Globulin", "Globulin"),
    ("Serum Creatinine", "Creatinine"),
    ("VITAMIN B-12", "Vitamin B12"),
    ("Vitamin B 12", "Vitamin B12"),
    ("Cyanocobalamin", "Vitamin B12"),
    ("VITAMIN D", "Vitamin D"),
    ("Vitamin D Total-25 Hydroxy", "Vitamin D"),
    ("25-OH Vitamin D (Total)", "Vitamin D"),
    ("Glycated Hemoglobin", "HbA1c"),
    ("Glycosylated Haemoglobin", "HbA1c"),
    ("Haemoglobin", "Hemoglobin"),
    ("Hb", "Hemoglobin"),
    ("Thyroid Stimulating Hormone", "TSH"),
    ("Total Leucocyte Count", "WBC Count"),
    ("Total WBC Count", "WBC Count"),
    ("White Blood Cell Count", "WBC Count"),
    ("TLC", "WBC Count"),
    ("Platelets", "Platelet Count"),
];

/// Token rules for families with too many spellings to enumerate.
struct KeywordRule {
    all_of: &'static [&'static str],
    any_of: &'static [&'static str],
    canonical: &'static str,
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        all_of: &["vitamin", "d"],
        any_of: &["total", "25", "hydroxy", "oh"],
        canonical: "Vitamin D",
    },
    KeywordRule {
        all_of: &["hba1c"],
        any_of: &[],
        canonical: "HbA1c",
    },
    KeywordRule {
        all_of: &["calcium", "total"],
        any_of: &[],
        canonical: "Calcium Total",
    },
];

#[derive(Debug, Clone)]
pub struct NameCanonicalizer {
    aliases: HashMap<String, String>,
}

impl NameCanonicalizer {
    /// `extra` entries are applied after the built-in table and win on conflict.
    pub fn new(extra: &BTreeMap<String, String>) -> Self {
        let mut aliases = HashMap::new();

        let builtin = TEST_NAME_ALIASES
            .iter()
            .map(|(variant, canonical)| (variant.to_string(), canonical.to_string()));
        let configured = extra
            .iter()
            .map(|(variant, canonical)| (variant.clone(), canonical.trim().to_string()));

        for (variant, canonical) in builtin.chain(configured) {
            let key = alias_key(&variant);
            if !key.is_empty() && !canonical.is_empty() {
                aliases.insert(key, canonical);
            }
        }

        Self { aliases }
    }

    pub fn canonicalize(&self, test_name: &str) -> String {
        let trimmed = test_name.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let tokens = name_tokens(trimmed);
        if let Some(canonical) = self.aliases.get(&tokens.join(" ")) {
            return canonical.clone();
        }

        let has = |wanted: &str| tokens.iter().any(|token| token == wanted);
        for rule in KEYWORD_RULES {
            let all_present = rule.all_of.iter().all(|token| has(*token));
            let any_present = rule.any_of.is_empty() || rule.any_of.iter().any(|token| has(*token));
            if all_present && any_present {
                return rule.canonical.to_string();
            }
        }

        trimmed.to_string()
    }
}

/// Sorted lower-case alphanumeric tokens, e.g. `"Cholesterol, Total"` -> `"cholesterol total"`.
fn alias_key(name: &str) -> String {
    name_tokens(name).join(" ")
}

fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = name
        .split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<String>>();
    tokens.sort();
    tokens
}

#[cfg(test)]
pub(super) fn builtin_canonical_names() -> Vec<&'static str> {
    TEST_NAME_ALIASES
        .iter()
        .map(|(_, canonical)| *canonical)
        .chain(KEYWORD_RULES.iter().map(|rule| rule.canonical))
        .collect()
}
