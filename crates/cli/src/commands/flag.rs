//! Operator actions on the guardrail flag

use anyhow::Result;
use colored::Colorize;

use crate::client::{
    ApiClient, FlagActionResponse, MitigationReport, ReasonRequest, ResetCooldownsResponse,
    SampleRequest,
};
use crate::output::{color_status, print_info, print_json, print_success, print_warning, OutputFormat};

/// Disable the flag by hand, ignoring cooldowns
pub async fn disable(client: &ApiClient, reason: Option<String>, format: OutputFormat) -> Result<()> {
    let result: FlagActionResponse = client
        .post("api/guardrail/manual-disable", &ReasonRequest { reason })
        .await?;
    print_flag_action(&result, format)
}

/// Re-enable the flag
pub async fn recover(client: &ApiClient, reason: Option<String>, format: OutputFormat) -> Result<()> {
    let result: FlagActionResponse = client
        .post("api/guardrail/recovery", &ReasonRequest { reason })
        .await?;
    print_flag_action(&result, format)
}

fn print_flag_action(result: &FlagActionResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Table => {
            let message = result.message.as_deref().unwrap_or("Flag updated");
            match result.flag_version {
                Some(version) => print_success(&format!("{} (version {})", message, version)),
                None => print_success(message),
            }
        }
    }
    Ok(())
}

/// Clear both cooldown timers
pub async fn reset_cooldowns(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: ResetCooldownsResponse = client
        .post("api/guardrail/reset-cooldowns", &serde_json::json!({}))
        .await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&result.message);
            println!(
                "Mode: {}, trigger cooldown {:.2} min, disable cooldown {:.2} min",
                result.mode.cyan(),
                result.trigger_cooldown_minutes,
                result.disable_cooldown_minutes
            );
        }
    }

    Ok(())
}

/// Post one sample and show the guardrail's reaction
pub async fn submit(client: &ApiClient, sample: SampleRequest, format: OutputFormat) -> Result<()> {
    let report: MitigationReport = client.post("api/guardrail/samples", &sample).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            match &report.severity {
                Some(severity) => println!("Severity: {}", color_status(severity)),
                None => print_info("No violations in the evaluation window"),
            }

            if report.flag_disabled {
                let version = report
                    .flag_version
                    .map(|v| format!(" (version {})", v))
                    .unwrap_or_default();
                print_success(&format!("Flag disabled: {}{}", report.decision.reason, version));
            } else if let Some(error) = &report.flag_error {
                print_warning(&format!(
                    "Disable requested but failed: {} ({})",
                    report.decision.reason, error
                ));
            } else {
                print_info(&format!("Flag left on: {}", report.decision.reason));
            }
        }
    }

    Ok(())
}
