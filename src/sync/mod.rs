//! Conversation synchronizer
//!
//! A conversation's warranty window and open/closed status are a pure
//! function of the pair's appointments. Every relevant mutation calls
//! `sync_conversation` as a side effect, and the reconciliation sweep calls
//! it again; the write is idempotent so out-of-order invocations
//! self-correct on the next pass.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{Appointment, ConversationStatus};
use crate::events::{Event, EventBus};

/// Result of one synchronization pass for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub status: ConversationStatus,
    pub warranty_expires: Option<DateTime<Utc>>,
    /// Whether the stored aggregate differed before this write
    pub changed: bool,
}

/// Compute the aggregate for a pair from its appointments
pub fn compute_aggregate(
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> (ConversationStatus, Option<DateTime<Utc>>) {
    let active: Vec<&Appointment> = appointments
        .iter()
        .filter(|a| a.warranty_active(now))
        .collect();

    if active.is_empty() {
        (ConversationStatus::Closed, None)
    } else {
        let latest = active.iter().filter_map(|a| a.warranty_expires_at).max();
        (ConversationStatus::Active, latest)
    }
}

/// Recompute and unconditionally write the conversation aggregate for a
/// (customer, provider) pair
pub async fn sync_conversation(
    pool: &SqlitePool,
    event_bus: &EventBus,
    customer_id: &Uuid,
    provider_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, sqlx::Error> {
    let appointments =
        crate::db::list_appointments_for_pair(pool, customer_id, provider_id).await?;
    let (status, warranty_expires) = compute_aggregate(&appointments, now);

    let previous = crate::db::get_conversation(pool, customer_id, provider_id).await?;
    let changed = match &previous {
        Some(c) => c.status != status || c.warranty_expires != warranty_expires,
        None => true,
    };

    crate::db::upsert_conversation(pool, customer_id, provider_id, status, warranty_expires, now)
        .await?;

    if changed {
        tracing::debug!(
            "Conversation {}/{} synced to {} (expires {:?})",
            customer_id,
            provider_id,
            status,
            warranty_expires
        );
    }

    event_bus.publish(Event::ConversationSynced {
        customer_id: *customer_id,
        provider_id: *provider_id,
        status,
        warranty_expires,
        timestamp: now,
    });

    Ok(SyncOutcome {
        status,
        warranty_expires,
        changed,
    })
}
