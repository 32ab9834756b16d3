//! Backjob application domain model - the dispute attached to an appointment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::BackjobStatus;

/// A customer complaint filed against a finished appointment while its
/// warranty window is open. At most one open application exists per
/// appointment at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackjobApplication {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub status: BackjobStatus,
    pub reason: String,
    /// Opaque evidence payload supplied by the customer
    pub evidence: Option<serde_json::Value>,
    pub provider_dispute_reason: Option<String>,
    pub provider_dispute_evidence: Option<serde_json::Value>,
    pub admin_notes: Option<String>,
    pub filed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackjobApplication {
    pub fn new(
        appointment_id: Uuid,
        customer_id: Uuid,
        provider_id: Uuid,
        reason: String,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            customer_id,
            provider_id,
            status: BackjobStatus::Pending,
            reason,
            evidence,
            provider_dispute_reason: None,
            provider_dispute_evidence: None,
            admin_notes: None,
            filed_at: now,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Admin resolution outcome. Only the two admin-reachable terminal states
/// are valid here; customer cancellation goes through its own operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackjobOutcome {
    Approved,
    CancelledByAdmin,
}

impl BackjobOutcome {
    pub fn as_status(&self) -> BackjobStatus {
        match self {
            BackjobOutcome::Approved => BackjobStatus::Approved,
            BackjobOutcome::CancelledByAdmin => BackjobStatus::CancelledByAdmin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_backjob_new() {
        let appointment_id = Uuid::new_v4();
        let app = BackjobApplication::new(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Paint peeled within a week".to_string(),
            Some(serde_json::json!({"photos": ["a.jpg"]})),
            at("2025-01-06T00:00:00Z"),
        );

        assert_eq!(app.appointment_id, appointment_id);
        assert_eq!(app.status, BackjobStatus::Pending);
        assert!(app.is_open());
        assert!(app.provider_dispute_reason.is_none());
        assert!(app.resolved_at.is_none());
    }

    #[test]
    fn test_outcome_as_status() {
        assert_eq!(BackjobOutcome::Approved.as_status(), BackjobStatus::Approved);
        assert_eq!(
            BackjobOutcome::CancelledByAdmin.as_status(),
            BackjobStatus::CancelledByAdmin
        );
    }

    #[test]
    fn test_backjob_serialization() {
        let app = BackjobApplication::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "reason".to_string(),
            None,
            at("2025-01-06T00:00:00Z"),
        );
        let json = serde_json::to_value(&app).unwrap();

        assert!(json.get("appointmentId").is_some());
        assert!(json.get("providerDisputeReason").is_some());
        assert!(json.get("appointment_id").is_none());
    }
}
