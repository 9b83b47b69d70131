//! In-process flag controller for local runs and tests

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{FlagChange, FlagController, FlagError, FlagTarget};

/// Flag controller that keeps the switch in memory
///
/// Failures can be injected to exercise the control-plane error path.
#[derive(Debug)]
pub struct InMemoryFlagController {
    enabled: AtomicBool,
    version: AtomicI64,
    fail_changes: AtomicBool,
    comments: Mutex<Vec<String>>,
    target: FlagTarget,
}

impl InMemoryFlagController {
    pub fn new(flag_key: impl Into<String>) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            version: AtomicI64::new(1),
            fail_changes: AtomicBool::new(false),
            comments: Mutex::new(Vec::new()),
            target: FlagTarget {
                project: "local".to_string(),
                environment: "local".to_string(),
                flag_key: flag_key.into(),
                configured: true,
            },
        }
    }

    /// Make every subsequent disable/enable fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.fail_changes.store(failing, Ordering::SeqCst);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Audit comments of every successful change, oldest first
    pub fn comments(&self) -> Vec<String> {
        self.comments
            .lock()
            .map(|comments| comments.clone())
            .unwrap_or_default()
    }

    fn apply(&self, on: bool, comment: &str) -> Result<FlagChange, FlagError> {
        if self.fail_changes.load(Ordering::SeqCst) {
            return Err(FlagError::Status {
                status: 503,
                body: "control plane unavailable".to_string(),
            });
        }

        self.enabled.store(on, Ordering::SeqCst);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut comments) = self.comments.lock() {
            comments.push(comment.to_string());
        }

        Ok(FlagChange {
            version: Some(version),
            payload: json!({ "key": self.target.flag_key, "on": on, "_version": version }),
        })
    }
}

#[async_trait]
impl FlagController for InMemoryFlagController {
    async fn disable(&self, comment: &str) -> Result<FlagChange, FlagError> {
        self.apply(false, comment)
    }

    async fn enable(&self, comment: &str) -> Result<FlagChange, FlagError> {
        self.apply(true, comment)
    }

    async fn is_enabled(&self) -> bool {
        self.enabled()
    }

    fn target(&self) -> FlagTarget {
        self.target.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_toggle_and_versions() {
        let flags = InMemoryFlagController::new("rag-bot");
        assert!(flags.is_enabled().await);

        let change = flags.disable("off").await.unwrap();
        assert_eq!(change.version, Some(2));
        assert!(!flags.is_enabled().await);

        let change = flags.enable("on").await.unwrap();
        assert_eq!(change.version, Some(3));
        assert!(flags.is_enabled().await);
        assert_eq!(flags.comments(), vec!["off".to_string(), "on".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_state_alone() {
        let flags = InMemoryFlagController::new("rag-bot");
        flags.set_failing(true);

        assert!(flags.disable("off").await.is_err());
        assert!(flags.enabled());
        assert!(flags.comments().is_empty());
    }
}
