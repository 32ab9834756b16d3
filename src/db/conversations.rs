//! Conversation database operations
//!
//! The conversation row is a derived aggregate; writes here are
//! last-writer-wins upserts performed by the synchronizer.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{Conversation, ConversationStatus};

/// Row type for the conversations table
#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub status: String,
    pub warranty_expires: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", s, e))
}

impl ConversationRow {
    pub fn to_conversation(&self) -> Result<Conversation, String> {
        Ok(Conversation {
            id: Uuid::parse_str(&self.id).map_err(|e| e.to_string())?,
            customer_id: Uuid::parse_str(&self.customer_id).map_err(|e| e.to_string())?,
            provider_id: Uuid::parse_str(&self.provider_id).map_err(|e| e.to_string())?,
            status: self.status.parse()?,
            warranty_expires: self
                .warranty_expires
                .as_deref()
                .map(parse_instant)
                .transpose()?,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
        })
    }
}

/// Get the conversation for a (customer, provider) pair
pub async fn get_conversation(
    pool: &SqlitePool,
    customer_id: &Uuid,
    provider_id: &Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    let row = sqlx::query_as::<_, ConversationRow>(
        "SELECT * FROM conversations WHERE customer_id = ? AND provider_id = ?",
    )
    .bind(customer_id.to_string())
    .bind(provider_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => match r.to_conversation() {
            Ok(c) => Ok(Some(c)),
            Err(e) => {
                tracing::warn!("Unparseable conversation row {}: {}", r.id, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Unconditionally write the recomputed aggregate for a pair, creating the
/// row on first contact
pub async fn upsert_conversation(
    pool: &SqlitePool,
    customer_id: &Uuid,
    provider_id: &Uuid,
    status: ConversationStatus,
    warranty_expires: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO conversations (id, customer_id, provider_id, status, warranty_expires, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(customer_id, provider_id)
        DO UPDATE SET status = excluded.status,
                      warranty_expires = excluded.warranty_expires,
                      updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(customer_id.to_string())
    .bind(provider_id.to_string())
    .bind(status.as_str())
    .bind(warranty_expires.map(|t| t.to_rfc3339()))
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
