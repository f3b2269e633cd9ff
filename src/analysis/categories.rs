pub const OTHER_CATEGORY: &str = "Other";

/// Checked in order; the first category with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Lipid Profile",
        &["cholesterol", "ldl", "hdl", "vldl", "triglyceride", "lipoprotein"],
    ),
    (
        "Diabetes",
        &["glucose", "hba1c", "insulin", "blood sugar"],
    ),
    (
        "Liver Function",
        &[
            "bilirubin",
            "sgpt",
            "sgot",
            "aminotransferase",
            "alkaline phosphatase",
            "ggt",
            "albumin",
            "globulin",
        ],
    ),
    (
        "Kidney Function",
        &["creatinine", "urea", "bun", "uric acid", "egfr"],
    ),
    ("Thyroid", &["tsh", "t3", "t4", "thyroid"]),
    (
        "Vitamins & Minerals",
        &["vitamin", "calcium", "iron", "ferritin", "magnesium", "zinc", "folate"],
    ),
    ("Electrolytes", &["sodium", "potassium", "chloride", "bicarbonate"]),
    (
        "Blood Count",
        &[
            "hemoglobin",
            "haemoglobin",
            "wbc",
            "rbc",
            "platelet",
            "hematocrit",
            "mcv",
            "mchc",
            "neutrophil",
            "lymphocyte",
            "monocyte",
            "eosinophil",
            "basophil",
            "esr",
        ],
    ),
];

pub fn category_names() -> impl Iterator<Item = &'static str> {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, _)| *category)
        .chain(std::iter::once(OTHER_CATEGORY))
}

/// Case-insensitive substring match in either direction.
pub fn category_for(test_name: &str) -> &'static str {
    let folded = test_name.trim().to_lowercase();
    if folded.is_empty() {
        return OTHER_CATEGORY;
    }

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| folded.contains(keyword) || keyword.contains(folded.as_str()))
        })
        .map(|(category, _)| *category)
        .unwrap_or(OTHER_CATEGORY)
}
