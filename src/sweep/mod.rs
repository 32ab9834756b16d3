//! Reconciliation sweep
//!
//! A scheduled, idempotent pass that repairs drift the synchronous path
//! missed: warranties that expired while nobody was looking, conversations
//! out of step with their appointments, and records the core cannot fix
//! without an operator. A run never fails on a single bad record; failures
//! are isolated, logged, and counted into the report.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::domain::{Appointment, AppointmentStatus};
use crate::events::{Event, EventBus};
use crate::service::WarrantyService;
use crate::sync;

/// Configuration for the reconciliation sweeper
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval between passes
    pub interval: Duration,
    /// Maximum appointments examined per pass
    pub batch_size: i32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

/// Structured result of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub id: Uuid,
    /// Appointments selected for examination
    pub examined: usize,
    /// Warranties transitioned to completed this pass
    pub expired: usize,
    /// Pair syncs that actually changed a stored conversation
    pub conversations_repaired: usize,
    /// In-warranty records with a null expiry, surfaced but not repaired
    pub integrity_defects: usize,
    /// Records skipped because they could not be read or written
    pub record_failures: usize,
    /// Passes skipped since the last report because a run was in flight
    pub skipped_runs: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Background reconciliation worker. One logical instance runs per
/// deployment; overlapping passes are skipped, never queued.
pub struct Sweeper {
    pool: SqlitePool,
    event_bus: EventBus,
    service: WarrantyService,
    config: SweepConfig,
    running: AtomicBool,
    skipped_runs: AtomicU64,
}

impl Sweeper {
    pub fn new(pool: SqlitePool, event_bus: EventBus, config: SweepConfig) -> Self {
        let service = WarrantyService::new(pool.clone(), event_bus.clone());
        Self {
            pool,
            event_bus,
            service,
            config,
            running: AtomicBool::new(false),
            skipped_runs: AtomicU64::new(0),
        }
    }

    /// Start the periodic sweep loop
    pub async fn start(self: Arc<Self>) {
        tracing::info!(
            "Starting reconciliation sweeper (interval {:?})",
            self.config.interval
        );

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.config.interval);
            loop {
                interval.tick().await;

                match sweeper.try_run(Utc::now()).await {
                    Ok(Some(report)) => {
                        tracing::info!(
                            "Sweep complete: {} examined, {} expired, {} conversations repaired",
                            report.examined,
                            report.expired,
                            report.conversations_repaired
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("Sweep pass failed: {}", e);
                    }
                }
            }
        });
    }

    /// Run one pass unless another is still in flight; an overlapping
    /// invocation is counted and skipped
    pub async fn try_run(&self, now: DateTime<Utc>) -> Result<Option<SweepReport>, sqlx::Error> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.skipped_runs.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("Sweep already in flight, skipping this run");
            return Ok(None);
        }

        let result = self.run_once(now).await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    /// One reconciliation pass at the injected instant
    async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, sqlx::Error> {
        let started_at = now;
        let mut expired = 0usize;
        let mut conversations_repaired = 0usize;
        let mut integrity_defects = 0usize;
        let mut record_failures = 0usize;
        let mut pairs: HashSet<(Uuid, Uuid)> = HashSet::new();

        let rows = db::list_rows_by_status(
            &self.pool,
            &[
                AppointmentStatus::InWarranty.as_str(),
                AppointmentStatus::Backjob.as_str(),
            ],
            self.config.batch_size,
        )
        .await?;
        let examined = rows.len();

        for row in rows {
            let appointment = match row.to_appointment() {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("Sweep skipping unparseable appointment {}: {}", row.id, e);
                    record_failures += 1;
                    continue;
                }
            };
            pairs.insert((appointment.customer_id, appointment.provider_id));

            match self.reconcile_appointment(&appointment, now).await {
                Ok(outcome) => {
                    if outcome.expired {
                        expired += 1;
                    }
                    if outcome.defect {
                        integrity_defects += 1;
                    }
                    if outcome.failed {
                        record_failures += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Sweep failed to reconcile appointment {}: {}",
                        appointment.id,
                        e
                    );
                    record_failures += 1;
                }
            }
        }

        // Resync every touched pair even when nothing expired, catching
        // drift this sweep did not cause
        for (customer_id, provider_id) in &pairs {
            match sync::sync_conversation(&self.pool, &self.event_bus, customer_id, provider_id, now)
                .await
            {
                Ok(outcome) if outcome.changed => conversations_repaired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Sweep failed to sync conversation {}/{}: {}",
                        customer_id,
                        provider_id,
                        e
                    );
                    record_failures += 1;
                }
            }
        }

        let report = SweepReport {
            id: Uuid::new_v4(),
            examined,
            expired,
            conversations_repaired,
            integrity_defects,
            record_failures,
            skipped_runs: self.skipped_runs.swap(0, Ordering::SeqCst),
            started_at,
            finished_at: now,
        };

        if let Err(e) = record_report(&self.pool, &report).await {
            tracing::warn!("Failed to persist sweep report: {}", e);
        }

        self.event_bus.publish(Event::SweepCompleted {
            examined: report.examined,
            expired: report.expired,
            conversations_synced: report.conversations_repaired,
            integrity_defects: report.integrity_defects,
            timestamp: now,
        });

        Ok(report)
    }

    async fn reconcile_appointment(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut outcome = RecordOutcome::default();

        // Paused disputes are left alone; only running warranties can drift
        if appointment.status != AppointmentStatus::InWarranty
            || appointment.warranty_paused_at.is_some()
        {
            return Ok(outcome);
        }

        let Some(expires_at) = appointment.warranty_expires_at else {
            // Cannot be self-healed: the correct expiry is unknowable here
            let detail = "in_warranty appointment has no warranty_expires_at";
            if db::record_defect(&self.pool, &appointment.id, detail, now).await? {
                self.event_bus.publish(Event::IntegrityDefectFound {
                    appointment_id: appointment.id,
                    detail: detail.to_string(),
                    timestamp: now,
                });
            }
            outcome.defect = true;
            return Ok(outcome);
        };

        if now < expires_at {
            return Ok(outcome);
        }

        match self.service.expire_naturally(&appointment.id, now).await {
            Ok(true) => {
                outcome.expired = true;
                // expire_naturally already synced the pair; the per-pair
                // pass afterwards confirms it settled
            }
            Ok(false) => {}
            Err(e) => {
                // A lost race means another writer already advanced this
                // record; anything else is a real per-record failure
                if !e.is_retryable() {
                    tracing::warn!("Sweep could not expire appointment {}: {}", appointment.id, e);
                    outcome.failed = true;
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Default)]
struct RecordOutcome {
    expired: bool,
    defect: bool,
    failed: bool,
}

/// Persist a completed report for operational history
async fn record_report(pool: &SqlitePool, report: &SweepReport) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sweep_reports (id, examined, expired, conversations_synced, integrity_defects, record_failures, skipped_runs, started_at, finished_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.id.to_string())
    .bind(report.examined as i64)
    .bind(report.expired as i64)
    .bind(report.conversations_repaired as i64)
    .bind(report.integrity_defects as i64)
    .bind(report.record_failures as i64)
    .bind(report.skipped_runs as i64)
    .bind(report.started_at.to_rfc3339())
    .bind(report.finished_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
