use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::analysis::{SeriesPoint, TrendCandidate, build_series, trend_candidates};
use crate::cli::TrendArgs;
use crate::commands::{load_history, load_pipeline_config};
use crate::pipeline::normalizer::Normalizer;
use crate::util::format_number;

#[derive(Debug, Serialize)]
struct SeriesResponse {
    requested: String,
    canonical_test_name: String,
    returned: usize,
    points: Vec<SeriesPoint>,
}

#[derive(Debug, Serialize)]
struct CandidatesResponse {
    returned: usize,
    candidates: Vec<TrendCandidate>,
}

pub fn run(args: TrendArgs) -> Result<()> {
    let db_path = args.store.resolved_db_path();
    let history = load_history(&db_path)?;

    info!(
        path = %db_path.display(),
        records = history.len(),
        test = args.test.as_deref().unwrap_or_default(),
        "trend requested"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());

    match args.test.as_deref() {
        Some(requested) => {
            let normalizer = Normalizer::new(&load_pipeline_config(&args.store)?)?;
            let canonical_test_name = normalizer.canonicalize_name(requested);
            let points = build_series(&history, &canonical_test_name);
            let response = SeriesResponse {
                requested: requested.to_string(),
                canonical_test_name,
                returned: points.len(),
                points,
            };

            if args.json {
                serde_json::to_writer_pretty(&mut output, &response)
                    .context("failed to serialize trend json output")?;
                writeln!(output)?;
            } else {
                write_series_text(&mut output, &response)?;
            }
        }
        None => {
            let candidates = trend_candidates(&history);
            let response = CandidatesResponse {
                returned: candidates.len(),
                candidates,
            };

            if args.json {
                serde_json::to_writer_pretty(&mut output, &response)
                    .context("failed to serialize trend json output")?;
                writeln!(output)?;
            } else {
                write_candidates_text(&mut output, &response.candidates)?;
            }
        }
    }

    output.flush()?;
    Ok(())
}

fn write_series_text<W: Write>(output: &mut W, response: &SeriesResponse) -> Result<()> {
    writeln!(output, "Test: {}", response.canonical_test_name)?;
    writeln!(output, "Points: {}", response.returned)?;

    for point in &response.points {
        writeln!(
            output,
            "{}\t{}\t{}\trange {}\t{}",
            point.report_date,
            format_number(point.value),
            point.unit.as_deref().unwrap_or("-"),
            point.reference_range.as_deref().unwrap_or("-"),
            point.source_file.as_deref().unwrap_or("-"),
        )?;
    }

    Ok(())
}

fn write_candidates_text<W: Write>(output: &mut W, candidates: &[TrendCandidate]) -> Result<()> {
    if candidates.is_empty() {
        writeln!(output, "No test has enough dated readings to trend.")?;
        return Ok(());
    }

    writeln!(output, "Trendable tests: {}", candidates.len())?;
    for candidate in candidates {
        writeln!(
            output,
            "{}\t{} points",
            candidate.canonical_test_name, candidate.points
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricRecord, MetricValue};

    fn reading(canonical: &str, value: f64, date: &str) -> MetricRecord {
        MetricRecord {
            test_name: canonical.to_string(),
            canonical_test_name: canonical.to_string(),
            value: MetricValue::Numeric(value),
            unit: Some("mg/dL".to_string()),
            reference_range: Some("<200".to_string()),
            report_date: Some(date.to_string()),
            source_file: None,
            conversion: None,
        }
    }

    #[test]
    fn series_text_lists_points_in_date_order() {
        let history = vec![
            reading("Total Cholesterol", 190.0, "2023-03-01"),
            reading("Total Cholesterol", 210.5, "2022-01-15"),
        ];
        let points = build_series(&history, "Total Cholesterol");
        let response = SeriesResponse {
            requested: "cholesterol".to_string(),
            canonical_test_name: "Total Cholesterol".to_string(),
            returned: points.len(),
            points,
        };

        let mut rendered = Vec::new();
        write_series_text(&mut rendered, &response).expect("render");
        let rendered = String::from_utf8(rendered).expect("utf8");

        let lines = rendered.lines().collect::<Vec<&str>>();
        assert_eq!(lines[0], "Test: Total Cholesterol");
        assert_eq!(lines[1], "Points: 2");
        assert_eq!(lines[2], "2022-01-15\t210.5\tmg/dL\trange <200\t-");
        assert_eq!(lines[3], "2023-03-01\t190\tmg/dL\trange <200\t-");
    }

    #[test]
    fn candidates_text_reports_when_nothing_is_trendable() {
        let mut rendered = Vec::new();
        write_candidates_text(&mut rendered, &[]).expect("render");
        assert_eq!(
            String::from_utf8(rendered).expect("utf8"),
            "No test has enough dated readings to trend.\n"
        );
    }
}
