//! Feature-flag control plane
//!
//! The guardrail monitor acts on its decisions by switching a remote feature
//! flag off (and, for manual recovery, back on). The control plane is an
//! external collaborator reached through the [`FlagController`] trait.

mod http;
mod memory;

pub use http::{FlagApiConfig, HttpFlagController};
pub use memory::InMemoryFlagController;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors raised at the control-plane boundary
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("flag control plane client is not configured")]
    NotConfigured,

    #[error("invalid flag control plane URL: {0}")]
    InvalidUrl(String),

    #[error("flag control plane request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("flag control plane returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode flag control plane response: {0}")]
    Decode(String),
}

/// Opaque success payload of a flag change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagChange {
    /// Flag version after the change, when the control plane reports one
    pub version: Option<i64>,
    /// Full response body
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Which flag a controller acts on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagTarget {
    pub project: String,
    pub environment: String,
    pub flag_key: String,
    /// False when the client lacks credentials and every change will fail
    pub configured: bool,
}

/// Remote switch for the AI feature
#[async_trait]
pub trait FlagController: Send + Sync {
    /// Turn the flag off, recording `comment` in the audit log
    ///
    /// Does not check the current state first.
    async fn disable(&self, comment: &str) -> Result<FlagChange, FlagError>;

    /// Turn the flag on, recording `comment` in the audit log
    async fn enable(&self, comment: &str) -> Result<FlagChange, FlagError>;

    /// Best-effort status read; implementations return `true` on any error
    async fn is_enabled(&self) -> bool;

    fn target(&self) -> FlagTarget;
}
