//! Message envelope and type vocabulary

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Priority;
use patternstore::now_ms;

/// The closed vocabulary of bus events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Task lifecycle
    TaskCreated,
    TaskUpdated,
    TaskCompleted,
    TaskFailed,

    // Issues
    IssueFound,
    IssueResolved,

    // Objectives
    ObjectiveAdded,
    ObjectiveCompleted,

    // Phase lifecycle
    PhaseStarted,
    PhaseCompleted,
    PhaseError,

    // System
    SystemAlert,
    SystemWarning,
    ShutdownRequested,

    // Files
    FileCreated,
    FileModified,

    // Analytics
    PatternDetected,
    CorrelationFound,
    MetricsUpdated,

    // Request/response plumbing
    Request,
    Response,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::IssueFound => "issue_found",
            Self::IssueResolved => "issue_resolved",
            Self::ObjectiveAdded => "objective_added",
            Self::ObjectiveCompleted => "objective_completed",
            Self::PhaseStarted => "phase_started",
            Self::PhaseCompleted => "phase_completed",
            Self::PhaseError => "phase_error",
            Self::SystemAlert => "system_alert",
            Self::SystemWarning => "system_warning",
            Self::ShutdownRequested => "shutdown_requested",
            Self::FileCreated => "file_created",
            Self::FileModified => "file_modified",
            Self::PatternDetected => "pattern_detected",
            Self::CorrelationFound => "correlation_found",
            Self::MetricsUpdated => "metrics_updated",
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed event on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub priority: Priority,

    /// Name of the publishing component (phase name or `coordinator`)
    pub sender: String,

    /// Target recipient; `None` means broadcast
    pub recipient: Option<String>,

    pub broadcast: bool,

    pub payload: serde_json::Value,

    /// Links a response to its request
    pub correlation_id: Option<String>,

    pub created_at: i64,

    /// Past this instant the message is dropped at delivery time
    pub expires_at: Option<i64>,
}

impl Message {
    /// Create a broadcast message
    pub fn broadcast(message_type: MessageType, sender: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            message_type,
            priority: Priority::Normal,
            sender: sender.into(),
            recipient: None,
            broadcast: true,
            payload,
            correlation_id: None,
            created_at: now_ms(),
            expires_at: None,
        }
    }

    /// Create a message addressed to one recipient
    pub fn to(
        recipient: impl Into<String>,
        message_type: MessageType,
        sender: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let mut msg = Self::broadcast(message_type, sender, payload);
        msg.recipient = Some(recipient.into());
        msg.broadcast = false;
        msg
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Expire the message after the given duration
    pub fn expires_in(mut self, duration: std::time::Duration) -> Self {
        self.expires_at = Some(now_ms() + duration.as_millis() as i64);
        self
    }

    /// True when the message has passed its expiry
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_message() {
        let msg = Message::broadcast(MessageType::TaskCreated, "planning", json!({"task": "t-1"}));
        assert!(msg.broadcast);
        assert!(msg.recipient.is_none());
        assert_eq!(msg.priority, Priority::Normal);
    }

    #[test]
    fn test_addressed_message() {
        let msg = Message::to("qa", MessageType::TaskCompleted, "coding", json!({}));
        assert!(!msg.broadcast);
        assert_eq!(msg.recipient.as_deref(), Some("qa"));
    }

    #[test]
    fn test_expiry() {
        let msg = Message::broadcast(MessageType::SystemAlert, "x", json!({}))
            .expires_in(std::time::Duration::from_millis(100));
        let now = msg.created_at;
        assert!(!msg.is_expired(now));
        assert!(msg.is_expired(now + 101));
    }

    #[test]
    fn test_no_expiry_by_default() {
        let msg = Message::broadcast(MessageType::SystemAlert, "x", json!({}));
        assert!(!msg.is_expired(i64::MAX));
    }

    #[test]
    fn test_message_serde_snake_case_type() {
        let msg = Message::broadcast(MessageType::IssueFound, "qa", json!({}));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"issue_found\""));
    }
}
