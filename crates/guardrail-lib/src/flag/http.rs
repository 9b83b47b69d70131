//! REST client for a LaunchDarkly-style flag control plane
//!
//! Flag changes are sent as semantic patches:
//!
//! ```text
//! PATCH {base}/flags/{project}/{flag}
//! Content-Type: application/json; domain-model=launchdarkly.semanticpatch
//! {"comment": "...", "environmentKey": "...", "instructions": [{"kind": "turnFlagOff"}]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

use super::{FlagChange, FlagController, FlagError, FlagTarget};

const API_VERSION: &str = "20240415";
const SEMANTIC_PATCH_CONTENT_TYPE: &str = "application/json; domain-model=launchdarkly.semanticpatch";

/// Connection settings for the flag control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagApiConfig {
    pub base_url: String,
    /// API access token; without one the client is reported as unconfigured
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub project_key: String,
    pub environment_key: String,
    pub flag_key: String,
    pub request_timeout_secs: u64,
}

impl Default for FlagApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.launchdarkly.com/api/v2".to_string(),
            api_token: None,
            project_key: "togglebank".to_string(),
            environment_key: "production".to_string(),
            flag_key: "toggle-bank-rag".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// HTTP implementation of [`FlagController`]
pub struct HttpFlagController {
    client: Client,
    flag_url: Url,
    config: FlagApiConfig,
}

impl HttpFlagController {
    pub fn new(config: FlagApiConfig) -> Result<Self, FlagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let mut flag_url = Url::parse(&config.base_url)
            .map_err(|e| FlagError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        flag_url
            .path_segments_mut()
            .map_err(|_| FlagError::InvalidUrl(format!("{} cannot carry a path", config.base_url)))?
            .pop_if_empty()
            .extend(["flags", config.project_key.as_str(), config.flag_key.as_str()]);

        if config.api_token.is_none() {
            warn!(
                flag_key = %config.flag_key,
                "No flag API token configured, flag auto-disable will not work"
            );
        }

        Ok(Self {
            client,
            flag_url,
            config,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_token.is_some()
    }

    fn token(&self) -> Result<&str, FlagError> {
        self.config
            .api_token
            .as_deref()
            .ok_or(FlagError::NotConfigured)
    }

    async fn semantic_patch(&self, kind: &str, comment: &str) -> Result<FlagChange, FlagError> {
        let token = self.token()?;

        let body = json!({
            "comment": format!("{} - {}", comment, Utc::now().to_rfc3339()),
            "environmentKey": self.config.environment_key,
            "instructions": [{ "kind": kind }],
        });

        let response = self
            .client
            .patch(self.flag_url.clone())
            .header(header::AUTHORIZATION, token)
            .header(header::CONTENT_TYPE, SEMANTIC_PATCH_CONTENT_TYPE)
            .header("LD-API-Version", API_VERSION)
            .body(body.to_string())
            .send()
            .await?;

        let payload = read_json(response).await?;
        Ok(FlagChange {
            version: flag_version(&payload),
            payload,
        })
    }

    async fn fetch_flag(&self) -> Result<serde_json::Value, FlagError> {
        let token = self.token()?;

        let response = self
            .client
            .get(self.flag_url.clone())
            .header(header::AUTHORIZATION, token)
            .header("LD-API-Version", API_VERSION)
            .send()
            .await?;

        read_json(response).await
    }
}

#[async_trait]
impl FlagController for HttpFlagController {
    async fn disable(&self, comment: &str) -> Result<FlagChange, FlagError> {
        match self.semantic_patch("turnFlagOff", comment).await {
            Ok(change) => {
                info!(
                    flag_key = %self.config.flag_key,
                    environment = %self.config.environment_key,
                    version = ?change.version,
                    "Flag turned off"
                );
                Ok(change)
            }
            Err(e) => {
                error!(flag_key = %self.config.flag_key, error = %e, "Failed to turn flag off");
                Err(e)
            }
        }
    }

    async fn enable(&self, comment: &str) -> Result<FlagChange, FlagError> {
        match self.semantic_patch("turnFlagOn", comment).await {
            Ok(change) => {
                info!(
                    flag_key = %self.config.flag_key,
                    environment = %self.config.environment_key,
                    version = ?change.version,
                    "Flag turned on"
                );
                Ok(change)
            }
            Err(e) => {
                error!(flag_key = %self.config.flag_key, error = %e, "Failed to turn flag on");
                Err(e)
            }
        }
    }

    async fn is_enabled(&self) -> bool {
        if !self.is_configured() {
            return true;
        }

        match self.fetch_flag().await {
            Ok(flag) => flag
                .get("environments")
                .and_then(|envs| envs.get(&self.config.environment_key))
                .and_then(|env| env.get("on"))
                .and_then(|on| on.as_bool())
                .unwrap_or(true),
            Err(e) => {
                // Fail open
                warn!(error = %e, "Failed to read flag status, assuming enabled");
                true
            }
        }
    }

    fn target(&self) -> FlagTarget {
        FlagTarget {
            project: self.config.project_key.clone(),
            environment: self.config.environment_key.clone(),
            flag_key: self.config.flag_key.clone(),
            configured: self.is_configured(),
        }
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, FlagError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FlagError::Status {
            status: status.as_u16(),
            body,
        });
    }

    if status == StatusCode::NO_CONTENT {
        return Ok(serde_json::Value::Null);
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| FlagError::Decode(e.to_string()))
}

fn flag_version(payload: &serde_json::Value) -> Option<i64> {
    payload
        .get("_version")
        .or_else(|| payload.get("version"))
        .and_then(|v| v.as_i64())
}
