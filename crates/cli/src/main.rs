//! Guardrail CLI
//!
//! A command-line tool for inspecting the guardrail agent and switching
//! the protected feature flag by hand.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::SampleRequest;
use commands::{flag, status};

/// Guardrail CLI
#[derive(Parser)]
#[command(name = "gctl")]
#[command(author, version, about = "CLI for the AI feature guardrail", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via GCTL_API_URL env var)
    #[arg(long, env = "GCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show monitoring window, cooldown timers and flag state
    Status,

    /// List the most recent quality samples
    Samples {
        /// Number of samples to show
        #[arg(long, short, default_value_t = 50)]
        limit: usize,
    },

    /// Disable the flag immediately, ignoring cooldowns
    Disable {
        /// Reason recorded in the flag audit log
        #[arg(long, short)]
        reason: Option<String>,
    },

    /// Re-enable the flag after an incident
    Recover {
        /// Reason recorded in the flag audit log
        #[arg(long, short)]
        reason: Option<String>,
    },

    /// Clear the trigger and disable cooldowns
    ResetCooldowns,

    /// Submit a quality sample by hand
    Submit {
        /// Accuracy score (0-1)
        #[arg(long)]
        accuracy: Option<f64>,

        /// Grounding score (0-1)
        #[arg(long)]
        grounding: Option<f64>,

        /// Relevance score (0-1)
        #[arg(long)]
        relevance: Option<f64>,

        /// Mark the request as failed
        #[arg(long)]
        error: bool,

        /// End-to-end response time in seconds
        #[arg(long)]
        response_time: Option<f64>,

        /// Bypass reason code for inputs flagged as adversarial
        #[arg(long)]
        bypass: Option<String>,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Samples { limit } => status::show_samples(&client, limit, cli.format).await?,
        Commands::Disable { reason } => flag::disable(&client, reason, cli.format).await?,
        Commands::Recover { reason } => flag::recover(&client, reason, cli.format).await?,
        Commands::ResetCooldowns => flag::reset_cooldowns(&client, cli.format).await?,
        Commands::Submit {
            accuracy,
            grounding,
            relevance,
            error,
            response_time,
            bypass,
        } => {
            let sample = SampleRequest {
                accuracy_score: accuracy,
                grounding_score: grounding,
                relevance_score: relevance,
                error_occurred: error,
                response_time,
                bypass_reason: bypass,
            };
            flag::submit(&client, sample, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
