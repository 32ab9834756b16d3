//! Appointment database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{Appointment, AppointmentStatus};

/// Row type for the appointments table
#[derive(Debug, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub status: String,
    pub warranty_days: Option<i64>,
    pub finished_at: Option<String>,
    pub warranty_expires_at: Option<String>,
    pub warranty_paused_at: Option<String>,
    pub warranty_remaining_days: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", s, e))
}

impl AppointmentRow {
    /// Convert to the domain model. Fails rather than guessing when a row
    /// is unparseable, so the sweep can count it as a record failure.
    pub fn to_appointment(&self) -> Result<Appointment, String> {
        Ok(Appointment {
            id: Uuid::parse_str(&self.id).map_err(|e| e.to_string())?,
            customer_id: Uuid::parse_str(&self.customer_id).map_err(|e| e.to_string())?,
            provider_id: Uuid::parse_str(&self.provider_id).map_err(|e| e.to_string())?,
            status: self.status.parse()?,
            warranty_days: self.warranty_days,
            finished_at: self.finished_at.as_deref().map(parse_instant).transpose()?,
            warranty_expires_at: self
                .warranty_expires_at
                .as_deref()
                .map(parse_instant)
                .transpose()?,
            warranty_paused_at: self
                .warranty_paused_at
                .as_deref()
                .map(parse_instant)
                .transpose()?,
            warranty_remaining_days: self.warranty_remaining_days,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
        })
    }
}

/// Get an appointment by ID
pub async fn get_appointment(
    pool: &SqlitePool,
    id: &Uuid,
) -> Result<Option<Appointment>, sqlx::Error> {
    let row = sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => match r.to_appointment() {
            Ok(a) => Ok(Some(a)),
            Err(e) => {
                tracing::warn!("Unparseable appointment row {}: {}", r.id, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Insert an appointment handed over by the booking layer
pub async fn create_appointment(
    pool: &SqlitePool,
    appointment: &Appointment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO appointments (id, customer_id, provider_id, status, warranty_days, finished_at, warranty_expires_at, warranty_paused_at, warranty_remaining_days, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(appointment.id.to_string())
    .bind(appointment.customer_id.to_string())
    .bind(appointment.provider_id.to_string())
    .bind(appointment.status.as_str())
    .bind(appointment.warranty_days)
    .bind(appointment.finished_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_expires_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_paused_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_remaining_days)
    .bind(appointment.created_at.to_rfc3339())
    .bind(appointment.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// List raw rows with any of the given statuses. Rows are returned
/// unconverted so callers can isolate per-record conversion failures.
pub async fn list_rows_by_status(
    pool: &SqlitePool,
    statuses: &[&str],
    limit: i32,
) -> Result<Vec<AppointmentRow>, sqlx::Error> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<&str> = statuses.iter().map(|_| "?").collect();
    let query = format!(
        "SELECT * FROM appointments WHERE status IN ({}) ORDER BY updated_at LIMIT ?",
        placeholders.join(",")
    );

    let mut q = sqlx::query_as::<_, AppointmentRow>(&query);
    for status in statuses {
        q = q.bind(status.to_string());
    }
    q = q.bind(limit);

    q.fetch_all(pool).await
}

/// Load all appointments between a customer and a provider
pub async fn list_appointments_for_pair(
    pool: &SqlitePool,
    customer_id: &Uuid,
    provider_id: &Uuid,
) -> Result<Vec<Appointment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE customer_id = ? AND provider_id = ? ORDER BY created_at",
    )
    .bind(customer_id.to_string())
    .bind(provider_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| match r.to_appointment() {
            Ok(a) => Some(a),
            Err(e) => {
                tracing::warn!("Skipping unparseable appointment row {}: {}", r.id, e);
                None
            }
        })
        .collect())
}

/// Conditional appointment write plus audit row, on an open connection so
/// composite workflows can bundle it with other statements. Returns false
/// when the conditional update matched nothing, i.e. a concurrent writer
/// got there first.
pub(crate) async fn apply_transition(
    conn: &mut sqlx::SqliteConnection,
    appointment: &Appointment,
    expected_status: AppointmentStatus,
    trigger: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE appointments
        SET status = ?, warranty_days = ?, finished_at = ?, warranty_expires_at = ?,
            warranty_paused_at = ?, warranty_remaining_days = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(appointment.status.as_str())
    .bind(appointment.warranty_days)
    .bind(appointment.finished_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_expires_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_paused_at.map(|t| t.to_rfc3339()))
    .bind(appointment.warranty_remaining_days)
    .bind(appointment.updated_at.to_rfc3339())
    .bind(appointment.id.to_string())
    .bind(expected_status.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    let transition_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO status_transitions (id, appointment_id, from_status, to_status, trigger, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&transition_id)
    .bind(appointment.id.to_string())
    .bind(expected_status.as_str())
    .bind(appointment.status.as_str())
    .bind(trigger)
    .bind(appointment.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Persist an already-mutated appointment, conditional on the status the
/// caller observed before mutating. Writes the audit row in the same
/// transaction.
pub async fn persist_transition(
    pool: &SqlitePool,
    appointment: &Appointment,
    expected_status: AppointmentStatus,
    trigger: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if !apply_transition(&mut *tx, appointment, expected_status, trigger).await? {
        tx.rollback().await?;
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}

/// Count recorded status transitions for an appointment
pub async fn count_transitions(
    pool: &SqlitePool,
    appointment_id: &Uuid,
) -> Result<i64, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct CountRow {
        count: i64,
    }

    let row: CountRow = sqlx::query_as(
        "SELECT COUNT(*) as count FROM status_transitions WHERE appointment_id = ?",
    )
    .bind(appointment_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(row.count)
}
