//! Conversation domain model - the derived per-pair aggregate
//!
//! A conversation is a materialized view over the appointments between one
//! customer and one provider. Its warranty window and open/closed status are
//! recomputed from the appointments, never mutated independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::ConversationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub status: ConversationStatus,
    /// Latest active warranty expiry among the pair's appointments, or null
    /// when no warranty is running
    pub warranty_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(customer_id: Uuid, provider_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            provider_id,
            status: ConversationStatus::Active,
            warranty_expires: None,
            created_at: now,
            updated_at: now,
        }
    }
}
