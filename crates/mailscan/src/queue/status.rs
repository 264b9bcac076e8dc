use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-package queue state. `Unknown` is the answer for ids that were never
/// enqueued (or were dequeued).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PackageStatus {
    Queued,
    Processing,
    ReadyForSurvey,
    Failed,
    #[default]
    Unknown,
}

impl PackageStatus {
    /// Terminal states end a package's trip through the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageStatus::ReadyForSurvey | PackageStatus::Failed)
    }
}

/// Published on the queue's broadcast channel for every observable state
/// change. All mutations are serialized through the queue, so subscribers
/// see a consistent, ordered log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub package_id: String,
    pub status: PackageStatus,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PackageStatus::ReadyForSurvey.is_terminal());
        assert!(PackageStatus::Failed.is_terminal());
        assert!(!PackageStatus::Queued.is_terminal());
        assert!(!PackageStatus::Processing.is_terminal());
        assert!(!PackageStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&PackageStatus::ReadyForSurvey).unwrap(),
            "\"readyForSurvey\""
        );
        assert_eq!(
            serde_json::to_string(&PackageStatus::Queued).unwrap(),
            "\"queued\""
        );
    }
}
