//! API client for communicating with the guardrail agent

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the guardrail agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("API error ({}): {}", status, detail);
    }

    response.json().await.context("Failed to parse response")
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub monitoring: MonitoringSummary,
    pub flag_enabled: bool,
    pub flag_key: String,
    pub environment: String,
    pub project: String,
    pub api_client_enabled: bool,
}

/// Window statistics plus cooldown timers; stats are absent without recent data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSummary {
    pub status: String,
    pub evaluation_window_minutes: f64,
    #[serde(default)]
    pub total_requests: Option<u64>,
    #[serde(default)]
    pub error_count: Option<u64>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub avg_accuracy: Option<f64>,
    #[serde(default)]
    pub avg_grounding: Option<f64>,
    #[serde(default)]
    pub avg_relevance: Option<f64>,
    #[serde(default)]
    pub min_accuracy: Option<f64>,
    #[serde(default)]
    pub last_trigger: Option<String>,
    #[serde(default)]
    pub last_disable: Option<String>,
    #[serde(default)]
    pub last_detection: Option<Detection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub severity: String,
    pub violations: Vec<String>,
    pub detected_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: String,
    pub accuracy_score: Option<f64>,
    pub grounding_score: Option<f64>,
    pub relevance_score: Option<f64>,
    pub error_occurred: bool,
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Vec<Sample>,
    pub summary: MonitoringSummary,
    pub thresholds: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub flag_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetCooldownsResponse {
    pub success: bool,
    pub message: String,
    pub mode: String,
    pub trigger_cooldown_minutes: f64,
    pub disable_cooldown_minutes: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    pub error_occurred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub should_disable: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationReport {
    pub severity: Option<String>,
    pub decision: Decision,
    pub flag_disabled: bool,
    #[serde(default)]
    pub flag_version: Option<i64>,
    #[serde(default)]
    pub flag_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
