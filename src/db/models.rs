use chrono::{DateTime, Utc};

use crate::model::TargetKind;

/// One persisted pass/fail observation.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CheckResult {
    pub test_id: String,
    pub target_kind: String,
    pub target_name: String,
    pub check_name: Option<String>,
    pub passed: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(
        kind: TargetKind,
        test_id: String,
        target_name: &str,
        check_name: Option<&str>,
        failures: &[String],
    ) -> Self {
        Self {
            test_id,
            target_kind: kind.as_str().to_string(),
            target_name: target_name.to_string(),
            check_name: check_name.map(str::to_string),
            passed: failures.is_empty(),
            message: failures.join(", "),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Proof that an alert was attempted. Only ever used for resend throttling.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AlertRecord {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(alert_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            alert_id: alert_id.to_string(),
            timestamp,
        }
    }
}

/// Audit entry for an automated remedial command.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct InterventionRecord {
    pub test_id: String,
    pub command: String,
    pub succeeded: bool,
    pub timestamp: DateTime<Utc>,
}
