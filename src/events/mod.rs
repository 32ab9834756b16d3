//! Event bus for pub/sub communication between components
//!
//! Mutations publish here so observability consumers (notification relays,
//! operational dashboards) can follow the warranty lifecycle without the
//! core knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{BackjobStatus, ConversationStatus};

/// Event types that can be published
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Service finished, warranty window opened
    WarrantyStarted {
        appointment_id: Uuid,
        customer_id: Uuid,
        provider_id: Uuid,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Warranty countdown suspended by a backjob filing
    WarrantyPaused {
        appointment_id: Uuid,
        backjob_id: Uuid,
        remaining_days: i64,
        timestamp: DateTime<Utc>,
    },

    /// Warranty countdown restored after dispute resolution
    WarrantyResumed {
        appointment_id: Uuid,
        backjob_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// Warranty window elapsed, appointment completed
    WarrantyExpired {
        appointment_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Customer filed a backjob application
    BackjobFiled {
        appointment_id: Uuid,
        backjob_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Provider contested a pending application
    BackjobDisputed {
        appointment_id: Uuid,
        backjob_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Application reached a terminal status
    BackjobClosed {
        appointment_id: Uuid,
        backjob_id: Uuid,
        status: BackjobStatus,
        timestamp: DateTime<Utc>,
    },

    /// Conversation aggregate recomputed for a pair
    ConversationSynced {
        customer_id: Uuid,
        provider_id: Uuid,
        status: ConversationStatus,
        warranty_expires: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// Record the sweep cannot repair without a business decision
    IntegrityDefectFound {
        appointment_id: Uuid,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// Reconciliation pass finished
    SweepCompleted {
        examined: usize,
        expired: usize,
        conversations_synced: usize,
        integrity_defects: usize,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the appointment ID associated with this event, if any
    pub fn appointment_id(&self) -> Option<Uuid> {
        match self {
            Event::WarrantyStarted { appointment_id, .. } => Some(*appointment_id),
            Event::WarrantyPaused { appointment_id, .. } => Some(*appointment_id),
            Event::WarrantyResumed { appointment_id, .. } => Some(*appointment_id),
            Event::WarrantyExpired { appointment_id, .. } => Some(*appointment_id),
            Event::BackjobFiled { appointment_id, .. } => Some(*appointment_id),
            Event::BackjobDisputed { appointment_id, .. } => Some(*appointment_id),
            Event::BackjobClosed { appointment_id, .. } => Some(*appointment_id),
            Event::IntegrityDefectFound { appointment_id, .. } => Some(*appointment_id),
            Event::ConversationSynced { .. } | Event::SweepCompleted { .. } => None,
        }
    }
}

/// Event bus for pub/sub communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        // Ignore errors if there are no receivers
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
