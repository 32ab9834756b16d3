//! Inbound operations over the warranty core
//!
//! The API layer hands these functions already-validated inputs. Each
//! operation loads current state, runs the pure state machine, then applies
//! a conditional write keyed on the status it observed; a lost race surfaces
//! as `ConcurrentModification` and the caller re-reads and retries rather
//! than reapplying blindly.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::domain::{
    Appointment, AppointmentStatus, BackjobApplication, BackjobOutcome, BackjobTrigger,
    WarrantyError,
};
use crate::events::{Event, EventBus};
use crate::state_machine::{lifecycle, BackjobMachine};
use crate::sync;

/// Default attempt bound for `with_retries`
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Re-run an operation that lost a conditional-update race. Each attempt
/// re-reads state from scratch, so only `ConcurrentModification` is retried.
pub async fn with_retries<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, WarrantyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WarrantyError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::debug!("Retrying after concurrent modification (attempt {})", attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// The warranty service owns all sanctioned mutations of appointments,
/// backjob applications, and (indirectly) conversations
pub struct WarrantyService {
    pool: SqlitePool,
    event_bus: EventBus,
    machine: BackjobMachine,
}

impl WarrantyService {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            pool,
            event_bus,
            machine: BackjobMachine::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_appointment(&self, id: &Uuid) -> Result<Appointment, WarrantyError> {
        db::get_appointment(&self.pool, id)
            .await?
            .ok_or_else(|| WarrantyError::NotFound(format!("appointment {}", id)))
    }

    async fn load_backjob(&self, id: &Uuid) -> Result<BackjobApplication, WarrantyError> {
        db::get_backjob(&self.pool, id)
            .await?
            .ok_or_else(|| WarrantyError::NotFound(format!("backjob application {}", id)))
    }

    async fn sync_pair(
        &self,
        customer_id: &Uuid,
        provider_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), WarrantyError> {
        sync::sync_conversation(&self.pool, &self.event_bus, customer_id, provider_id, now)
            .await?;
        Ok(())
    }

    /// Finish a service and open its warranty window
    pub async fn mark_finished(
        &self,
        appointment_id: &Uuid,
        finished_at: DateTime<Utc>,
        warranty_days: i64,
    ) -> Result<Appointment, WarrantyError> {
        let mut appointment = self.load_appointment(appointment_id).await?;
        let observed = appointment.status;

        lifecycle::mark_finished(&mut appointment, finished_at, warranty_days)?;

        if !db::persist_transition(&self.pool, &appointment, observed, "mark_finished").await? {
            return Err(WarrantyError::ConcurrentModification);
        }

        self.sync_pair(&appointment.customer_id, &appointment.provider_id, finished_at)
            .await?;

        self.event_bus.publish(Event::WarrantyStarted {
            appointment_id: appointment.id,
            customer_id: appointment.customer_id,
            provider_id: appointment.provider_id,
            // mark_finished always sets the expiry
            expires_at: appointment.warranty_expires_at.unwrap_or(finished_at),
            timestamp: finished_at,
        });

        Ok(appointment)
    }

    /// File a backjob complaint against an in-warranty appointment,
    /// suspending its countdown
    pub async fn file_backjob(
        &self,
        appointment_id: &Uuid,
        customer_id: &Uuid,
        reason: String,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<BackjobApplication, WarrantyError> {
        let mut appointment = self.load_appointment(appointment_id).await?;
        let observed = appointment.status;

        // Checked before the status guard: a second filing surfaces as a
        // duplicate, not as a bad transition out of backjob
        if db::get_open_backjob(&self.pool, appointment_id).await?.is_some() {
            return Err(WarrantyError::DuplicateBackjob {
                appointment_id: *appointment_id,
            });
        }

        if appointment.status != AppointmentStatus::InWarranty {
            return Err(WarrantyError::InvalidTransition {
                from: appointment.status,
                operation: "file_backjob",
            });
        }

        let expires_at = appointment.warranty_expires_at.ok_or_else(|| {
            WarrantyError::DataIntegrityDefect {
                appointment_id: *appointment_id,
                detail: "in_warranty appointment has no warranty_expires_at".to_string(),
            }
        })?;
        if now >= expires_at {
            return Err(WarrantyError::WarrantyExpired {
                expired_at: expires_at,
            });
        }

        let app = BackjobApplication::new(
            *appointment_id,
            *customer_id,
            appointment.provider_id,
            reason,
            evidence,
            now,
        );

        lifecycle::pause_warranty(&mut appointment, now)?;

        if !db::file_backjob_txn(&self.pool, &app, &appointment, observed).await? {
            return Err(WarrantyError::ConcurrentModification);
        }

        self.sync_pair(&appointment.customer_id, &appointment.provider_id, now)
            .await?;

        self.event_bus.publish(Event::BackjobFiled {
            appointment_id: appointment.id,
            backjob_id: app.id,
            timestamp: now,
        });
        self.event_bus.publish(Event::WarrantyPaused {
            appointment_id: appointment.id,
            backjob_id: app.id,
            remaining_days: appointment.warranty_remaining_days.unwrap_or(0),
            timestamp: now,
        });

        Ok(app)
    }

    /// Provider contests a pending application
    pub async fn dispute_backjob(
        &self,
        backjob_id: &Uuid,
        provider_id: &Uuid,
        reason: String,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<BackjobApplication, WarrantyError> {
        let mut app = self.load_backjob(backjob_id).await?;
        if app.provider_id != *provider_id {
            return Err(WarrantyError::NotFound(format!(
                "backjob application {}",
                backjob_id
            )));
        }
        let observed = app.status;

        self.machine
            .transition(&mut app, BackjobTrigger::ProviderDispute, now)?;
        app.provider_dispute_reason = Some(reason);
        app.provider_dispute_evidence = evidence;

        if !db::persist_backjob(&self.pool, &app, observed).await? {
            return Err(WarrantyError::ConcurrentModification);
        }

        self.event_bus.publish(Event::BackjobDisputed {
            appointment_id: app.appointment_id,
            backjob_id: app.id,
            timestamp: now,
        });

        Ok(app)
    }

    /// Admin resolves a pending or disputed application into a terminal
    /// outcome; the parent warranty resumes in the same transaction
    pub async fn resolve_backjob(
        &self,
        backjob_id: &Uuid,
        admin_id: &Uuid,
        outcome: BackjobOutcome,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BackjobApplication, WarrantyError> {
        let app = self.load_backjob(backjob_id).await?;
        let trigger = match outcome {
            BackjobOutcome::Approved => BackjobTrigger::AdminApprove,
            BackjobOutcome::CancelledByAdmin => BackjobTrigger::AdminCancel,
        };

        tracing::info!(
            "Admin {} resolving backjob {} as {}",
            admin_id,
            backjob_id,
            outcome.as_status()
        );

        self.close_backjob(app, trigger, notes, now).await
    }

    /// Customer withdraws their own pending application
    pub async fn cancel_backjob_by_customer(
        &self,
        backjob_id: &Uuid,
        customer_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<BackjobApplication, WarrantyError> {
        let app = self.load_backjob(backjob_id).await?;
        if app.customer_id != *customer_id {
            return Err(WarrantyError::NotFound(format!(
                "backjob application {}",
                backjob_id
            )));
        }

        self.close_backjob(app, BackjobTrigger::CustomerCancel, None, now)
            .await
    }

    /// Shared terminal path: transition the application, resume the parent
    /// warranty exactly once, resync the pair
    async fn close_backjob(
        &self,
        mut app: BackjobApplication,
        trigger: BackjobTrigger,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BackjobApplication, WarrantyError> {
        let observed_app = app.status;

        self.machine.transition(&mut app, trigger, now)?;
        if notes.is_some() {
            app.admin_notes = notes;
        }

        let mut appointment = self.load_appointment(&app.appointment_id).await?;
        let observed_appointment = appointment.status;

        lifecycle::resume_warranty(&mut appointment, now);

        if !db::close_backjob_txn(
            &self.pool,
            &app,
            observed_app,
            &appointment,
            observed_appointment,
            "resume_warranty",
        )
        .await?
        {
            return Err(WarrantyError::ConcurrentModification);
        }

        self.sync_pair(&appointment.customer_id, &appointment.provider_id, now)
            .await?;

        self.event_bus.publish(Event::BackjobClosed {
            appointment_id: app.appointment_id,
            backjob_id: app.id,
            status: app.status,
            timestamp: now,
        });
        self.event_bus.publish(Event::WarrantyResumed {
            appointment_id: appointment.id,
            backjob_id: app.id,
            expires_at: appointment.warranty_expires_at,
            timestamp: now,
        });

        Ok(app)
    }

    /// Close a warranty whose window has elapsed. Safe to retry; returns
    /// false when the preconditions no longer hold. Used by the sweep.
    pub async fn expire_naturally(
        &self,
        appointment_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, WarrantyError> {
        let mut appointment = self.load_appointment(appointment_id).await?;
        let observed = appointment.status;

        if !lifecycle::expire_naturally(&mut appointment, now) {
            return Ok(false);
        }

        if !db::persist_transition(&self.pool, &appointment, observed, "expire_naturally").await? {
            return Err(WarrantyError::ConcurrentModification);
        }

        self.sync_pair(&appointment.customer_id, &appointment.provider_id, now)
            .await?;

        self.event_bus.publish(Event::WarrantyExpired {
            appointment_id: appointment.id,
            timestamp: now,
        });

        Ok(true)
    }
}
