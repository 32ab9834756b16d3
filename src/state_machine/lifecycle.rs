//! Appointment warranty lifecycle - the only sanctioned mutators
//!
//! These functions own the status field and its warranty-timing companions.
//! They mutate the in-memory record; persisting the result with a
//! conditional write is the service layer's job. Time is always injected.

use chrono::{DateTime, Utc};

use crate::clock;
use crate::domain::{Appointment, AppointmentStatus, WarrantyError};

/// Mark a service as finished and open its warranty window.
///
/// Allowed from `in_progress` or `confirmed`. Sets `finished_at` (once,
/// immutable), stores the warranty-day count, computes the expiry and moves
/// the appointment to `in_warranty`.
pub fn mark_finished(
    appointment: &mut Appointment,
    finished_at: DateTime<Utc>,
    warranty_days: i64,
) -> Result<(), WarrantyError> {
    if appointment.finished_at.is_some()
        || !matches!(
            appointment.status,
            AppointmentStatus::InProgress | AppointmentStatus::Confirmed
        )
    {
        return Err(WarrantyError::InvalidTransition {
            from: appointment.status,
            operation: "mark_finished",
        });
    }

    let warranty_days = warranty_days.max(0);
    appointment.finished_at = Some(finished_at);
    appointment.warranty_days = Some(warranty_days);
    appointment.warranty_expires_at = Some(clock::compute_expiry(finished_at, warranty_days));
    appointment.status = AppointmentStatus::InWarranty;
    appointment.updated_at = finished_at;

    Ok(())
}

/// Suspend the warranty countdown while a dispute is open.
///
/// Freezes `warranty_expires_at` and records the remaining whole days so the
/// window can be restored on resolution.
pub fn pause_warranty(
    appointment: &mut Appointment,
    now: DateTime<Utc>,
) -> Result<(), WarrantyError> {
    if appointment.warranty_paused() {
        return Err(WarrantyError::AlreadyPaused);
    }
    if appointment.status != AppointmentStatus::InWarranty {
        return Err(WarrantyError::InvalidTransition {
            from: appointment.status,
            operation: "pause_warranty",
        });
    }
    let expires_at = appointment.warranty_expires_at.ok_or_else(|| {
        WarrantyError::DataIntegrityDefect {
            appointment_id: appointment.id,
            detail: "in_warranty appointment has no warranty_expires_at".to_string(),
        }
    })?;

    appointment.warranty_paused_at = Some(now);
    appointment.warranty_remaining_days = Some(clock::remaining_days(now, expires_at));
    appointment.status = AppointmentStatus::Backjob;
    appointment.updated_at = now;

    Ok(())
}

/// Restore the warranty countdown after a dispute reaches a terminal state.
///
/// When pause data is present the expiry is recomputed from `now` plus the
/// banked remaining days and the pause fields are cleared. The status is set
/// to `in_warranty` even when pause data is missing, so a record with
/// corrupt pause fields cannot stay stuck in `backjob`. Never fails.
pub fn resume_warranty(appointment: &mut Appointment, now: DateTime<Utc>) {
    if let (Some(_), Some(remaining)) = (
        appointment.warranty_paused_at,
        appointment.warranty_remaining_days,
    ) {
        appointment.warranty_expires_at = Some(clock::compute_expiry(now, remaining));
        appointment.warranty_paused_at = None;
        appointment.warranty_remaining_days = None;
    }

    appointment.status = AppointmentStatus::InWarranty;
    appointment.updated_at = now;
}

/// Close a warranty whose window has elapsed.
///
/// Returns true if the appointment transitioned to `completed`. A no-op
/// (not an error) when preconditions are unmet; the sweep relies on this
/// being safe to retry.
pub fn expire_naturally(appointment: &mut Appointment, now: DateTime<Utc>) -> bool {
    if appointment.status != AppointmentStatus::InWarranty || appointment.warranty_paused() {
        return false;
    }
    let Some(expires_at) = appointment.warranty_expires_at else {
        return false;
    };
    if !clock::is_expired(now, expires_at) {
        return false;
    }

    appointment.status = AppointmentStatus::Completed;
    appointment.updated_at = now;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn in_progress_appointment() -> Appointment {
        let mut a = Appointment::new(Uuid::new_v4(), Uuid::new_v4(), at("2024-12-20T00:00:00Z"));
        a.status = AppointmentStatus::InProgress;
        a
    }

    #[test]
    fn test_mark_finished_opens_warranty() {
        let mut a = in_progress_appointment();

        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();

        assert_eq!(a.status, AppointmentStatus::InWarranty);
        assert_eq!(a.finished_at, Some(at("2025-01-01T00:00:00Z")));
        assert_eq!(a.warranty_days, Some(15));
        assert_eq!(a.warranty_expires_at, Some(at("2025-01-16T00:00:00Z")));
    }

    #[test]
    fn test_mark_finished_from_confirmed() {
        let mut a = in_progress_appointment();
        a.status = AppointmentStatus::Confirmed;

        assert!(mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 7).is_ok());
        assert_eq!(a.status, AppointmentStatus::InWarranty);
    }

    #[test]
    fn test_mark_finished_twice_rejected() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();

        let err = mark_finished(&mut a, at("2025-01-02T00:00:00Z"), 15).unwrap_err();
        assert!(matches!(err, WarrantyError::InvalidTransition { .. }));
        // First finish time is immutable
        assert_eq!(a.finished_at, Some(at("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn test_mark_finished_from_disallowed_status() {
        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            let mut a = in_progress_appointment();
            a.status = status;
            let err = mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap_err();
            assert!(matches!(err, WarrantyError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_pause_banks_remaining_days() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();

        pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap();

        assert_eq!(a.status, AppointmentStatus::Backjob);
        assert_eq!(a.warranty_paused_at, Some(at("2025-01-06T00:00:00Z")));
        assert_eq!(a.warranty_remaining_days, Some(10));
        // Frozen, not cleared
        assert_eq!(a.warranty_expires_at, Some(at("2025-01-16T00:00:00Z")));
    }

    #[test]
    fn test_pause_twice_rejected() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();
        pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap();

        let err = pause_warranty(&mut a, at("2025-01-07T00:00:00Z")).unwrap_err();
        assert!(matches!(err, WarrantyError::AlreadyPaused));
    }

    #[test]
    fn test_pause_outside_warranty_rejected() {
        let mut a = in_progress_appointment();
        let err = pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap_err();
        assert!(matches!(err, WarrantyError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pause_with_null_expiry_is_defect() {
        let mut a = in_progress_appointment();
        a.status = AppointmentStatus::InWarranty;

        let err = pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap_err();
        assert!(matches!(err, WarrantyError::DataIntegrityDefect { .. }));
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();
        pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap();

        resume_warranty(&mut a, at("2025-01-09T00:00:00Z"));

        assert_eq!(a.status, AppointmentStatus::InWarranty);
        assert_eq!(a.warranty_expires_at, Some(at("2025-01-19T00:00:00Z")));
        assert!(a.warranty_paused_at.is_none());
        assert!(a.warranty_remaining_days.is_none());
    }

    #[test]
    fn test_resume_without_pause_data_unsticks_status() {
        // Regression: missing pause data must not leave the record in backjob
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();
        a.status = AppointmentStatus::Backjob;
        a.warranty_paused_at = None;
        a.warranty_remaining_days = None;

        resume_warranty(&mut a, at("2025-01-09T00:00:00Z"));

        assert_eq!(a.status, AppointmentStatus::InWarranty);
        // Stale expiry is left alone for the sweep/operator path to judge
        assert_eq!(a.warranty_expires_at, Some(at("2025-01-16T00:00:00Z")));
    }

    #[test]
    fn test_resume_with_partial_pause_data() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();
        a.status = AppointmentStatus::Backjob;
        a.warranty_paused_at = Some(at("2025-01-06T00:00:00Z"));
        a.warranty_remaining_days = None;

        resume_warranty(&mut a, at("2025-01-09T00:00:00Z"));

        assert_eq!(a.status, AppointmentStatus::InWarranty);
        // Half a pause record is not enough to recompute the window
        assert_eq!(a.warranty_expires_at, Some(at("2025-01-16T00:00:00Z")));
        assert_eq!(a.warranty_paused_at, Some(at("2025-01-06T00:00:00Z")));
    }

    #[test]
    fn test_expire_naturally() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();

        assert!(!expire_naturally(&mut a, at("2025-01-10T00:00:00Z")));
        assert_eq!(a.status, AppointmentStatus::InWarranty);

        assert!(expire_naturally(&mut a, at("2025-01-20T00:00:00Z")));
        assert_eq!(a.status, AppointmentStatus::Completed);
    }

    #[test]
    fn test_expire_naturally_skips_paused() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();
        pause_warranty(&mut a, at("2025-01-06T00:00:00Z")).unwrap();

        assert!(!expire_naturally(&mut a, at("2025-02-01T00:00:00Z")));
        assert_eq!(a.status, AppointmentStatus::Backjob);
    }

    #[test]
    fn test_expire_naturally_is_retry_safe() {
        let mut a = in_progress_appointment();
        mark_finished(&mut a, at("2025-01-01T00:00:00Z"), 15).unwrap();

        assert!(expire_naturally(&mut a, at("2025-01-20T00:00:00Z")));
        // Second pass is a no-op, not an error
        assert!(!expire_naturally(&mut a, at("2025-01-20T00:05:00Z")));
        assert_eq!(a.status, AppointmentStatus::Completed);
    }

    #[test]
    fn test_expire_naturally_null_expiry_noop() {
        let mut a = in_progress_appointment();
        a.status = AppointmentStatus::InWarranty;

        assert!(!expire_naturally(&mut a, at("2025-02-01T00:00:00Z")));
        assert_eq!(a.status, AppointmentStatus::InWarranty);
    }
}
