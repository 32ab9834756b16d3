//! Status definitions for appointments, backjob applications, and
//! conversations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The service/warranty states an appointment moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    // Service phase
    Scheduled,
    Confirmed,
    InProgress,
    Finished,
    // Warranty phase
    InWarranty,
    Backjob,
    // Terminal states
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Returns whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }

    /// Returns whether this status carries warranty tracking
    pub fn tracks_warranty(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::InWarranty | AppointmentStatus::Backjob
        )
    }

    /// Returns the database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Finished => "finished",
            AppointmentStatus::InWarranty => "in_warranty",
            AppointmentStatus::Backjob => "backjob",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "in_progress" => Ok(AppointmentStatus::InProgress),
            "finished" => Ok(AppointmentStatus::Finished),
            "in_warranty" => Ok(AppointmentStatus::InWarranty),
            "backjob" => Ok(AppointmentStatus::Backjob),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            _ => Err(format!("Unknown appointment status: {}", s)),
        }
    }
}

/// The states a backjob application moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackjobStatus {
    Pending,
    Disputed,
    Approved,
    CancelledByAdmin,
    CancelledByUser,
}

impl BackjobStatus {
    /// Open applications block a second filing on the same appointment
    pub fn is_open(&self) -> bool {
        matches!(self, BackjobStatus::Pending | BackjobStatus::Disputed)
    }

    /// Returns whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Returns the database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BackjobStatus::Pending => "pending",
            BackjobStatus::Disputed => "disputed",
            BackjobStatus::Approved => "approved",
            BackjobStatus::CancelledByAdmin => "cancelled_by_admin",
            BackjobStatus::CancelledByUser => "cancelled_by_user",
        }
    }
}

impl fmt::Display for BackjobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackjobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BackjobStatus::Pending),
            "disputed" => Ok(BackjobStatus::Disputed),
            "approved" => Ok(BackjobStatus::Approved),
            "cancelled_by_admin" => Ok(BackjobStatus::CancelledByAdmin),
            "cancelled_by_user" => Ok(BackjobStatus::CancelledByUser),
            _ => Err(format!("Unknown backjob status: {}", s)),
        }
    }
}

/// Triggers that move a backjob application between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BackjobTrigger {
    ProviderDispute,
    AdminApprove,
    AdminCancel,
    CustomerCancel,
}

impl fmt::Display for BackjobTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackjobTrigger::ProviderDispute => write!(f, "ProviderDispute"),
            BackjobTrigger::AdminApprove => write!(f, "AdminApprove"),
            BackjobTrigger::AdminCancel => write!(f, "AdminCancel"),
            BackjobTrigger::CustomerCancel => write!(f, "CustomerCancel"),
        }
    }
}

impl FromStr for BackjobTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ProviderDispute" => Ok(BackjobTrigger::ProviderDispute),
            "AdminApprove" => Ok(BackjobTrigger::AdminApprove),
            "AdminCancel" => Ok(BackjobTrigger::AdminCancel),
            "CustomerCancel" => Ok(BackjobTrigger::CustomerCancel),
            _ => Err(format!("Unknown backjob trigger: {}", s)),
        }
    }
}

/// Conversation open/closed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "closed" => Ok(ConversationStatus::Closed),
            _ => Err(format!("Unknown conversation status: {}", s)),
        }
    }
}
