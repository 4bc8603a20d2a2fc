//! Operator notification for run-halting conditions
//!
//! Notifications are best effort: a failure to deliver is logged and never
//! interrupts the run's own error handling.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, warn};

/// Payload handed to notification backends.
#[derive(Debug, Serialize)]
pub struct Notification {
    pub consecutive_errors: u32,
    pub summary: String,
    pub raised_at: String,
}

impl Notification {
    pub fn new(consecutive_errors: u32, summary: &str) -> Self {
        Notification {
            consecutive_errors,
            summary: summary.to_string(),
            raised_at: crate::models::timestamp_now(),
        }
    }
}

/// Delivery seam for operator alerts.
#[async_trait]
pub trait Notifier: Send {
    /// The run halted after too many consecutive client failures.
    async fn critical_error(&mut self, consecutive_errors: u32, summary: &str);
}

/// Default notifier that raises alerts through the log stream.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn critical_error(&mut self, consecutive_errors: u32, summary: &str) {
        let notification = Notification::new(consecutive_errors, summary);
        match serde_json::to_string(&notification) {
            Ok(payload) => error!(
                "CRITICAL: run halted, operator attention required: {}",
                payload
            ),
            Err(e) => {
                warn!("Could not serialize notification payload: {}", e);
                error!(
                    consecutive_errors,
                    "CRITICAL: run halted, operator attention required: {}", summary
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_payload_shape() {
        let payload =
            serde_json::to_value(Notification::new(10, "10 clients failed in a row")).unwrap();
        assert_eq!(payload["consecutive_errors"], 10);
        assert_eq!(payload["summary"], "10 clients failed in a row");
        assert!(payload["raised_at"].is_string());
    }

    #[tokio::test]
    async fn test_log_notifier_does_not_panic() {
        let mut notifier = LogNotifier;
        notifier.critical_error(10, "10 clients failed in a row").await;
    }
}
