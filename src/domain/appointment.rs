//! Appointment domain model - the main entity in Fixhub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::AppointmentStatus;

/// An appointment between a customer and a provider, carrying the warranty
/// window opened when the service is finished
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub status: AppointmentStatus,
    pub warranty_days: Option<i64>,
    pub finished_at: Option<DateTime<Utc>>,
    pub warranty_expires_at: Option<DateTime<Utc>>,
    pub warranty_paused_at: Option<DateTime<Utc>>,
    pub warranty_remaining_days: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(customer_id: Uuid, provider_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            provider_id,
            status: AppointmentStatus::Scheduled,
            warranty_days: None,
            finished_at: None,
            warranty_expires_at: None,
            warranty_paused_at: None,
            warranty_remaining_days: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the warranty countdown is currently suspended
    pub fn warranty_paused(&self) -> bool {
        self.warranty_paused_at.is_some()
    }

    /// Whether this appointment contributes to its pair's active-warranty set:
    /// paused disputes always count, running warranties count until expiry
    pub fn warranty_active(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AppointmentStatus::Backjob => true,
            AppointmentStatus::InWarranty => self
                .warranty_expires_at
                .map(|e| now < e)
                .unwrap_or(false),
            _ => false,
        }
    }
}
