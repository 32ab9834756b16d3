//! Operator queue for data-integrity defects
//!
//! The sweep records defects it cannot repair (the correct value is
//! unknowable without a business decision) and an operator works the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// A defect surfaced by the sweep, awaiting operator review
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityDefect {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct DefectRow {
    id: String,
    appointment_id: String,
    detail: String,
    detected_at: String,
    acknowledged: i64,
    acknowledged_at: Option<String>,
}

impl DefectRow {
    fn to_defect(&self) -> Result<IntegrityDefect, String> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("bad timestamp {:?}: {}", s, e))
        };
        Ok(IntegrityDefect {
            id: Uuid::parse_str(&self.id).map_err(|e| e.to_string())?,
            appointment_id: Uuid::parse_str(&self.appointment_id).map_err(|e| e.to_string())?,
            detail: self.detail.clone(),
            detected_at: parse(&self.detected_at)?,
            acknowledged: self.acknowledged != 0,
            acknowledged_at: self
                .acknowledged_at
                .as_deref()
                .map(parse)
                .transpose()?,
        })
    }
}

/// Record a defect unless an unacknowledged one already exists for the
/// appointment. Returns true when a new row was inserted.
pub async fn record_defect(
    pool: &SqlitePool,
    appointment_id: &Uuid,
    detail: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO integrity_defects (id, appointment_id, detail, detected_at)
        SELECT ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM integrity_defects
            WHERE appointment_id = ? AND acknowledged = 0
        )
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(appointment_id.to_string())
    .bind(detail)
    .bind(now.to_rfc3339())
    .bind(appointment_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// List unacknowledged defects, oldest first
pub async fn list_open_defects(pool: &SqlitePool) -> Result<Vec<IntegrityDefect>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DefectRow>(
        "SELECT * FROM integrity_defects WHERE acknowledged = 0 ORDER BY detected_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| match r.to_defect() {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!("Skipping unparseable defect row {}: {}", r.id, e);
                None
            }
        })
        .collect())
}

/// Mark a defect as handled by an operator
pub async fn acknowledge_defect(
    pool: &SqlitePool,
    defect_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE integrity_defects SET acknowledged = 1, acknowledged_at = ? WHERE id = ? AND acknowledged = 0",
    )
    .bind(now.to_rfc3339())
    .bind(defect_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let appointment_id = Uuid::new_v4();

        let inserted = record_defect(
            &pool,
            &appointment_id,
            "in_warranty appointment has no warranty_expires_at",
            at("2025-01-20T00:00:00Z"),
        )
        .await
        .unwrap();
        assert!(inserted);

        let open = list_open_defects(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].appointment_id, appointment_id);
        assert!(!open[0].acknowledged);
    }

    #[tokio::test]
    async fn test_record_dedupes_open_defects() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let appointment_id = Uuid::new_v4();

        assert!(record_defect(&pool, &appointment_id, "null expiry", at("2025-01-20T00:00:00Z"))
            .await
            .unwrap());
        // Second sweep finding the same broken record must not spam the queue
        assert!(!record_defect(&pool, &appointment_id, "null expiry", at("2025-01-20T00:05:00Z"))
            .await
            .unwrap());

        assert_eq!(list_open_defects(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_reopens_recording() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let appointment_id = Uuid::new_v4();

        record_defect(&pool, &appointment_id, "null expiry", at("2025-01-20T00:00:00Z"))
            .await
            .unwrap();
        let defect = &list_open_defects(&pool).await.unwrap()[0];

        assert!(acknowledge_defect(&pool, &defect.id, at("2025-01-21T00:00:00Z"))
            .await
            .unwrap());
        assert!(list_open_defects(&pool).await.unwrap().is_empty());

        // Still broken on the next sweep: a fresh row is allowed
        assert!(record_defect(&pool, &appointment_id, "null expiry", at("2025-01-22T00:00:00Z"))
            .await
            .unwrap());
    }
}
