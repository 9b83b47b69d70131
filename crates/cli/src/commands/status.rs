//! Read-only guardrail commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, MetricsResponse, MonitoringSummary, StatusResponse};
use crate::output::{
    color_score, color_status, format_optional_timestamp, format_score, format_timestamp,
    print_json, print_warning, OutputFormat,
};

/// Row for samples table
#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Grounding")]
    grounding: String,
    #[tabled(rename = "Relevance")]
    relevance: String,
    #[tabled(rename = "Error")]
    error: String,
    #[tabled(rename = "Resp. Time")]
    response_time: String,
}

/// Show monitor and flag status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusResponse = client.get("api/guardrail/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Guardrail Status".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Flag:                   {} ({}/{})",
                status.flag_key.cyan(),
                status.project,
                status.environment
            );
            let state = if status.flag_enabled { "enabled" } else { "disabled" };
            println!("State:                  {}", color_status(state));
            if !status.api_client_enabled {
                print_warning("Flag API client has no token, auto-disable cannot act");
            }
            println!();
            print_monitoring(&status.monitoring);
        }
    }

    Ok(())
}

fn print_monitoring(summary: &MonitoringSummary) {
    println!("{}", "Monitoring".bold());
    println!("{}", "-".repeat(50));
    println!("Window:                 {}", color_status(&summary.status));
    println!(
        "Evaluation Window:      {:.1} min",
        summary.evaluation_window_minutes
    );

    if let Some(total) = summary.total_requests {
        println!("Requests:               {}", total);
        println!(
            "Errors:                 {} ({:.1}%)",
            summary.error_count.unwrap_or_default(),
            summary.error_rate.unwrap_or_default() * 100.0
        );
        println!("Avg Accuracy:           {}", format_score(summary.avg_accuracy));
        println!("Min Accuracy:           {}", format_score(summary.min_accuracy));
        println!("Avg Grounding:          {}", format_score(summary.avg_grounding));
        println!("Avg Relevance:          {}", format_score(summary.avg_relevance));
    }

    println!();
    println!("{}", "Cooldowns".bold());
    println!("{}", "-".repeat(50));
    println!(
        "Last Trigger:           {}",
        format_optional_timestamp(summary.last_trigger.as_deref())
    );
    println!(
        "Last Disable:           {}",
        format_optional_timestamp(summary.last_disable.as_deref())
    );

    if let Some(detection) = &summary.last_detection {
        println!();
        println!(
            "{} {} at {}",
            "Last Detection:".bold(),
            color_status(&detection.severity),
            format_timestamp(&detection.detected_at)
        );
        for violation in &detection.violations {
            println!("  - {}", violation);
        }
    }
}

/// Show the most recent samples
pub async fn show_samples(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let path = format!("api/guardrail/metrics?limit={}", limit);
    let result: MetricsResponse = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.metrics.is_empty() {
                print_warning("No samples retained");
                return Ok(());
            }

            let threshold = |key: &str, fallback: f64| {
                result
                    .thresholds
                    .get(key)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(fallback)
            };
            let accuracy_bands = (
                threshold("min_accuracy_critical", 0.3),
                threshold("min_accuracy_warning", 0.5),
            );
            let grounding_bands = (
                threshold("min_grounding_critical", 0.6),
                threshold("min_grounding_warning", 0.8),
            );
            let relevance_bands = (
                threshold("min_relevance_critical", 0.5),
                threshold("min_relevance_warning", 0.7),
            );

            let rows: Vec<SampleRow> = result
                .metrics
                .iter()
                .map(|s| SampleRow {
                    timestamp: format_timestamp(&s.timestamp),
                    accuracy: color_score(s.accuracy_score, accuracy_bands.0, accuracy_bands.1),
                    grounding: color_score(s.grounding_score, grounding_bands.0, grounding_bands.1),
                    relevance: color_score(s.relevance_score, relevance_bands.0, relevance_bands.1),
                    error: if s.error_occurred {
                        "yes".red().to_string()
                    } else {
                        "no".to_string()
                    },
                    response_time: s
                        .response_time
                        .map_or_else(|| "-".to_string(), |t| format!("{:.2}s", t)),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} samples", result.metrics.len());
        }
    }

    Ok(())
}
