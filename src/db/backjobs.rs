//! Backjob application database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{BackjobApplication, BackjobStatus};

/// Row type for the backjob_applications table
#[derive(Debug, sqlx::FromRow)]
pub struct BackjobRow {
    pub id: String,
    pub appointment_id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub status: String,
    pub reason: String,
    pub evidence: Option<String>,
    pub provider_dispute_reason: Option<String>,
    pub provider_dispute_evidence: Option<String>,
    pub admin_notes: Option<String>,
    pub filed_at: String,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", s, e))
}

impl BackjobRow {
    pub fn to_backjob(&self) -> Result<BackjobApplication, String> {
        Ok(BackjobApplication {
            id: Uuid::parse_str(&self.id).map_err(|e| e.to_string())?,
            appointment_id: Uuid::parse_str(&self.appointment_id).map_err(|e| e.to_string())?,
            customer_id: Uuid::parse_str(&self.customer_id).map_err(|e| e.to_string())?,
            provider_id: Uuid::parse_str(&self.provider_id).map_err(|e| e.to_string())?,
            status: self.status.parse()?,
            reason: self.reason.clone(),
            evidence: self
                .evidence
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            provider_dispute_reason: self.provider_dispute_reason.clone(),
            provider_dispute_evidence: self
                .provider_dispute_evidence
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            admin_notes: self.admin_notes.clone(),
            filed_at: parse_instant(&self.filed_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_instant).transpose()?,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
        })
    }
}

/// Create a new backjob application
pub async fn create_backjob(
    pool: &SqlitePool,
    app: &BackjobApplication,
) -> Result<(), sqlx::Error> {
    let evidence_json = app.evidence.as_ref().and_then(|v| serde_json::to_string(v).ok());

    sqlx::query(
        r#"
        INSERT INTO backjob_applications (id, appointment_id, customer_id, provider_id, status, reason, evidence, filed_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(app.id.to_string())
    .bind(app.appointment_id.to_string())
    .bind(app.customer_id.to_string())
    .bind(app.provider_id.to_string())
    .bind(app.status.as_str())
    .bind(&app.reason)
    .bind(&evidence_json)
    .bind(app.filed_at.to_rfc3339())
    .bind(app.created_at.to_rfc3339())
    .bind(app.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a backjob application by ID
pub async fn get_backjob(
    pool: &SqlitePool,
    id: &Uuid,
) -> Result<Option<BackjobApplication>, sqlx::Error> {
    let row =
        sqlx::query_as::<_, BackjobRow>("SELECT * FROM backjob_applications WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;

    match row {
        Some(r) => match r.to_backjob() {
            Ok(b) => Ok(Some(b)),
            Err(e) => {
                tracing::warn!("Unparseable backjob row {}: {}", r.id, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Find the open (pending or disputed) application for an appointment, if
/// one exists. At most one is ever open.
pub async fn get_open_backjob(
    pool: &SqlitePool,
    appointment_id: &Uuid,
) -> Result<Option<BackjobApplication>, sqlx::Error> {
    let row = sqlx::query_as::<_, BackjobRow>(
        r#"
        SELECT * FROM backjob_applications
        WHERE appointment_id = ? AND status IN ('pending', 'disputed')
        ORDER BY filed_at DESC LIMIT 1
        "#,
    )
    .bind(appointment_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => match r.to_backjob() {
            Ok(b) => Ok(Some(b)),
            Err(e) => {
                tracing::warn!("Unparseable backjob row {}: {}", r.id, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Conditional application write on an open connection. Returns false when
/// a concurrent writer won the race.
pub(crate) async fn apply_backjob_update(
    conn: &mut sqlx::SqliteConnection,
    app: &BackjobApplication,
    expected_status: BackjobStatus,
) -> Result<bool, sqlx::Error> {
    let dispute_evidence_json = app
        .provider_dispute_evidence
        .as_ref()
        .and_then(|v| serde_json::to_string(v).ok());

    let result = sqlx::query(
        r#"
        UPDATE backjob_applications
        SET status = ?, provider_dispute_reason = ?, provider_dispute_evidence = ?,
            admin_notes = ?, resolved_at = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(app.status.as_str())
    .bind(&app.provider_dispute_reason)
    .bind(&dispute_evidence_json)
    .bind(&app.admin_notes)
    .bind(app.resolved_at.map(|t| t.to_rfc3339()))
    .bind(app.updated_at.to_rfc3339())
    .bind(app.id.to_string())
    .bind(expected_status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persist an already-mutated application, conditional on the status the
/// caller observed
pub async fn persist_backjob(
    pool: &SqlitePool,
    app: &BackjobApplication,
    expected_status: BackjobStatus,
) -> Result<bool, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    apply_backjob_update(&mut *conn, app, expected_status).await
}

/// Atomically pause the appointment warranty and create the application.
/// The appointment update is conditional on the observed status; when it
/// loses the race nothing is written.
pub async fn file_backjob_txn(
    pool: &SqlitePool,
    app: &BackjobApplication,
    appointment: &crate::domain::Appointment,
    expected_status: crate::domain::AppointmentStatus,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if !super::appointments::apply_transition(&mut *tx, appointment, expected_status, "file_backjob")
        .await?
    {
        tx.rollback().await?;
        return Ok(false);
    }

    let evidence_json = app.evidence.as_ref().and_then(|v| serde_json::to_string(v).ok());
    sqlx::query(
        r#"
        INSERT INTO backjob_applications (id, appointment_id, customer_id, provider_id, status, reason, evidence, filed_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(app.id.to_string())
    .bind(app.appointment_id.to_string())
    .bind(app.customer_id.to_string())
    .bind(app.provider_id.to_string())
    .bind(app.status.as_str())
    .bind(&app.reason)
    .bind(&evidence_json)
    .bind(app.filed_at.to_rfc3339())
    .bind(app.created_at.to_rfc3339())
    .bind(app.updated_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Atomically move the application to a terminal status and resume the
/// parent warranty. Both writes are conditional; either losing its race
/// rolls back the whole resolution so resume happens exactly once.
pub async fn close_backjob_txn(
    pool: &SqlitePool,
    app: &BackjobApplication,
    expected_app_status: BackjobStatus,
    appointment: &crate::domain::Appointment,
    expected_appointment_status: crate::domain::AppointmentStatus,
    trigger: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if !apply_backjob_update(&mut *tx, app, expected_app_status).await? {
        tx.rollback().await?;
        return Ok(false);
    }

    if !super::appointments::apply_transition(
        &mut tx,
        appointment,
        expected_appointment_status,
        trigger,
    )
    .await?
    {
        tx.rollback().await?;
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}
