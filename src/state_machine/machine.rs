//! Backjob dispute state machine
//!
//! Table-driven transitions for the dispute workflow attached to an
//! appointment. Resuming the parent warranty on terminal outcomes is the
//! service layer's responsibility; this machine only owns the application's
//! status field.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{BackjobApplication, BackjobStatus, BackjobTrigger, WarrantyError};

/// Definition of a dispute transition
#[derive(Debug, Clone, Copy)]
pub struct TransitionDef {
    pub from: BackjobStatus,
    pub trigger: BackjobTrigger,
    pub to: BackjobStatus,
}

/// Build all dispute transition definitions
pub fn build_transitions() -> Vec<TransitionDef> {
    use BackjobStatus::*;
    use BackjobTrigger::*;

    vec![
        TransitionDef { from: Pending, trigger: ProviderDispute, to: Disputed },
        TransitionDef { from: Pending, trigger: AdminApprove, to: Approved },
        TransitionDef { from: Pending, trigger: CustomerCancel, to: CancelledByUser },
        TransitionDef { from: Pending, trigger: AdminCancel, to: CancelledByAdmin },
        TransitionDef { from: Disputed, trigger: AdminApprove, to: Approved },
        TransitionDef { from: Disputed, trigger: AdminCancel, to: CancelledByAdmin },
    ]
}

/// The backjob state machine handles all dispute status transitions
pub struct BackjobMachine {
    transitions: HashMap<(BackjobStatus, BackjobTrigger), BackjobStatus>,
}

impl Default for BackjobMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BackjobMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();
        for def in build_transitions() {
            transitions.insert((def.from, def.trigger), def.to);
        }
        Self { transitions }
    }

    /// Check if a transition is valid (without executing it)
    pub fn can_transition(
        &self,
        app: &BackjobApplication,
        trigger: BackjobTrigger,
    ) -> Result<BackjobStatus, WarrantyError> {
        self.transitions
            .get(&(app.status, trigger))
            .copied()
            .ok_or(WarrantyError::InvalidBackjobTransition {
                from: app.status,
                trigger,
            })
    }

    /// Execute a transition on an application. Terminal outcomes stamp
    /// `resolved_at`.
    pub fn transition(
        &self,
        app: &mut BackjobApplication,
        trigger: BackjobTrigger,
        now: DateTime<Utc>,
    ) -> Result<BackjobStatus, WarrantyError> {
        let to = self.can_transition(app, trigger)?;

        app.status = to;
        app.updated_at = now;
        if to.is_terminal() {
            app.resolved_at = Some(now);
        }

        Ok(to)
    }

    /// Get all valid triggers for an application in its current state
    pub fn valid_triggers(&self, app: &BackjobApplication) -> Vec<BackjobTrigger> {
        self.transitions
            .keys()
            .filter(|(from, _)| *from == app.status)
            .map(|(_, trigger)| *trigger)
            .collect()
    }
}
