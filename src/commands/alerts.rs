use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::analysis::{AlertGroup, StalenessPolicy, compute_alerts};
use crate::cli::AlertsArgs;
use crate::commands::{load_history, load_pipeline_config};
use crate::util::format_number;

#[derive(Debug, Serialize)]
struct AlertsResponse {
    today: String,
    stale_after_months: u32,
    very_stale_after_months: u32,
    alert_count: usize,
    groups: Vec<AlertGroup>,
}

pub fn run(args: AlertsArgs) -> Result<()> {
    let config = load_pipeline_config(&args.store)?;
    let policy = StalenessPolicy::from_config(&config);
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let db_path = args.store.resolved_db_path();
    let history = load_history(&db_path)?;
    let groups = compute_alerts(&history, today, &policy);
    let alert_count = groups.iter().map(|group| group.alerts.len()).sum::<usize>();

    info!(
        path = %db_path.display(),
        records = history.len(),
        today = %today,
        groups = groups.len(),
        alerts = alert_count,
        "alerts computed"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        let response = AlertsResponse {
            today: today.format("%Y-%m-%d").to_string(),
            stale_after_months: policy.stale_after_months,
            very_stale_after_months: policy.very_stale_after_months,
            alert_count,
            groups,
        };
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize alerts json output")?;
        writeln!(output)?;
    } else {
        write_alerts_text(&mut output, today, &groups)?;
    }
    output.flush()?;

    Ok(())
}

fn write_alerts_text<W: Write>(
    output: &mut W,
    today: NaiveDate,
    groups: &[AlertGroup],
) -> Result<()> {
    if groups.is_empty() {
        writeln!(output, "No out-of-range readings as of {today}.")?;
        return Ok(());
    }

    writeln!(output, "Out-of-range readings as of {today}:")?;
    for group in groups {
        writeln!(output)?;
        writeln!(output, "{} ({})", group.category, group.alerts.len())?;
        for alert in &group.alerts {
            let deviation = match alert.deviation_percent {
                Some(percent) => format!("{percent}%"),
                None => "n/a".to_string(),
            };
            writeln!(
                output,
                "\t{}\t{} {}\t{}\t{} by {}\trange {}\t{}",
                alert.test_name,
                format_number(alert.value),
                alert.unit.as_deref().unwrap_or(""),
                alert.report_date,
                alert.status.as_str(),
                deviation,
                alert.reference_range.as_deref().unwrap_or("-"),
                alert.staleness.as_str(),
            )?;
        }
    }

    Ok(())
}
