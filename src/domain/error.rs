//! Error taxonomy for the warranty core

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::status::{AppointmentStatus, BackjobStatus, BackjobTrigger};

#[derive(Debug, Error)]
pub enum WarrantyError {
    /// Mutation attempted from a disallowed appointment status. Rejected,
    /// not retried.
    #[error("invalid transition: cannot {operation} from {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        operation: &'static str,
    },

    /// Backjob trigger fired from a state that does not accept it
    #[error("invalid backjob transition from {from} with trigger {trigger}")]
    InvalidBackjobTransition {
        from: BackjobStatus,
        trigger: BackjobTrigger,
    },

    /// Re-entrant pause while a pause is already recorded
    #[error("warranty is already paused")]
    AlreadyPaused,

    /// Backjob filed after the warranty window closed
    #[error("warranty expired at {expired_at}")]
    WarrantyExpired { expired_at: DateTime<Utc> },

    /// A second filing while an open application exists
    #[error("an open backjob application already exists for appointment {appointment_id}")]
    DuplicateBackjob { appointment_id: Uuid },

    /// Conditional update lost a race; the caller should re-read current
    /// state and retry, not blindly reapply
    #[error("record was modified concurrently")]
    ConcurrentModification,

    /// A record the core cannot repair without a business decision, e.g.
    /// in-warranty with a null expiry. Surfaced to the operator queue.
    #[error("data integrity defect on appointment {appointment_id}: {detail}")]
    DataIntegrityDefect {
        appointment_id: Uuid,
        detail: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WarrantyError {
    /// Whether the caller may retry after re-reading state
    pub fn is_retryable(&self) -> bool {
        matches!(self, WarrantyError::ConcurrentModification)
    }

    /// Whether this is a business-rule rejection safe to show to end users
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            WarrantyError::InvalidTransition { .. }
                | WarrantyError::InvalidBackjobTransition { .. }
                | WarrantyError::AlreadyPaused
                | WarrantyError::WarrantyExpired { .. }
                | WarrantyError::DuplicateBackjob { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(WarrantyError::ConcurrentModification.is_retryable());
        assert!(!WarrantyError::AlreadyPaused.is_retryable());
        assert!(!WarrantyError::NotFound("appointment".to_string()).is_retryable());
    }

    #[test]
    fn test_user_visible() {
        assert!(WarrantyError::AlreadyPaused.is_user_visible());
        assert!(WarrantyError::DuplicateBackjob {
            appointment_id: Uuid::new_v4()
        }
        .is_user_visible());
        assert!(!WarrantyError::ConcurrentModification.is_user_visible());
        assert!(!WarrantyError::DataIntegrityDefect {
            appointment_id: Uuid::new_v4(),
            detail: "null expiry".to_string()
        }
        .is_user_visible());
    }

    #[test]
    fn test_display() {
        let err = WarrantyError::InvalidTransition {
            from: AppointmentStatus::Completed,
            operation: "mark_finished",
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot mark_finished from completed"
        );
    }
}
