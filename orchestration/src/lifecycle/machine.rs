//! Lifecycle state machine for concerns.
//!
//! Owns every legal status transition and the side effects each one
//! requires. All writes to `assigned_to`, `status`, and the escalation
//! fields go through this machine, never ad hoc, so chat, audit, and
//! notification effects cannot be skipped. Capability checks are
//! centralized here as explicit allow/deny decisions instead of scattered
//! role tests at the call sites.
//!
//! Every mutation is a compare-and-swap: read the concern, validate, write
//! back with the version that was read, and retry on conflict. Side effects
//! run only after a successful commit.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::assignment::SelectedHandler;
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ports::{AuditLog, ChatChannels, ChatMessage, Notifier};
use crate::state::{
    Actor, Concern, ConcernStatus, CrossAssignmentStatus, EscalationLevel, Priority, Role,
    SharedRepository, StoreError,
};

/// Explicit outcome of a capability check.
#[derive(Debug, Clone)]
pub struct CapabilityCheck {
    pub allowed: bool,
    pub reason: String,
}

impl CapabilityCheck {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }

    fn ensure(self, actor: &Actor, action: &str) -> OrchestratorResult<()> {
        if self.allowed {
            Ok(())
        } else {
            warn!(actor = %actor.id, action, reason = %self.reason, "capability denied");
            Err(OrchestratorError::unauthorized(&actor.id, action, self.reason))
        }
    }
}

/// The state machine plus its collaborator ports.
pub struct LifecycleMachine {
    repo: SharedRepository,
    notifier: Arc<dyn Notifier>,
    chat: Arc<dyn ChatChannels>,
    audit: Arc<dyn AuditLog>,
    clock: SharedClock,
    config: OrchestratorConfig,
}

impl LifecycleMachine {
    pub fn new(
        repo: SharedRepository,
        notifier: Arc<dyn Notifier>,
        chat: Arc<dyn ChatChannels>,
        audit: Arc<dyn AuditLog>,
        clock: SharedClock,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            chat,
            audit,
            clock,
            config,
        }
    }

    // =========================================================================
    // Capability checks
    // =========================================================================

    /// Departmental review (approve/reject): head of the owning department
    /// or an admin.
    pub fn can_review(&self, actor: &Actor, concern: &Concern) -> CapabilityCheck {
        match actor.role {
            Role::Admin => CapabilityCheck::allow(),
            Role::DepartmentHead if actor.department_id.as_deref()
                == Some(concern.department_id.as_str()) =>
            {
                CapabilityCheck::allow()
            }
            Role::DepartmentHead => {
                CapabilityCheck::deny("department head of a different department")
            }
            _ => CapabilityCheck::deny("requires department head or admin"),
        }
    }

    /// Plain status updates: staff-level actors with a relationship to the
    /// concern (its department, its current assignee, or an admin).
    /// Closing is admin-only; cancelling belongs to the owning student or
    /// an admin.
    pub fn can_update_status(
        &self,
        actor: &Actor,
        concern: &Concern,
        target: ConcernStatus,
    ) -> CapabilityCheck {
        match target {
            ConcernStatus::Cancelled => {
                if actor.role == Role::Admin
                    || (actor.role == Role::Student && actor.id == concern.student_id)
                {
                    CapabilityCheck::allow()
                } else {
                    CapabilityCheck::deny("cancellation belongs to the owning student or an admin")
                }
            }
            ConcernStatus::Closed => {
                if actor.role == Role::Admin {
                    CapabilityCheck::allow()
                } else {
                    CapabilityCheck::deny("closing is admin-only")
                }
            }
            _ => {
                if !actor.is_staff_level() {
                    return CapabilityCheck::deny("requires a staff-level role");
                }
                let related = actor.role == Role::Admin
                    || actor.department_id.as_deref() == Some(concern.department_id.as_str())
                    || Some(actor.id.as_str()) == concern.assigned_to.as_deref();
                if related {
                    CapabilityCheck::allow()
                } else {
                    CapabilityCheck::deny("no relationship to this concern")
                }
            }
        }
    }

    /// Resolution confirmation: only the owning student.
    pub fn can_confirm(&self, actor: &Actor, concern: &Concern) -> CapabilityCheck {
        if actor.role == Role::Student && actor.id == concern.student_id {
            CapabilityCheck::allow()
        } else {
            CapabilityCheck::deny("only the owning student may confirm")
        }
    }

    /// Resolution dispute: only the owning student.
    pub fn can_dispute(&self, actor: &Actor, concern: &Concern) -> CapabilityCheck {
        if actor.role == Role::Student && actor.id == concern.student_id {
            CapabilityCheck::allow()
        } else {
            CapabilityCheck::deny("only the owning student may dispute")
        }
    }

    /// Manual assignment: admin, or head of the owning department.
    pub fn can_assign(&self, actor: &Actor, concern: &Concern) -> CapabilityCheck {
        match actor.role {
            Role::Admin => CapabilityCheck::allow(),
            Role::DepartmentHead if actor.department_id.as_deref()
                == Some(concern.department_id.as_str()) =>
            {
                CapabilityCheck::allow()
            }
            _ => CapabilityCheck::deny("requires admin or the owning department's head"),
        }
    }

    /// Manual escalation: any staff-level actor.
    pub fn can_escalate(&self, actor: &Actor, _concern: &Concern) -> CapabilityCheck {
        if actor.is_staff_level() {
            CapabilityCheck::allow()
        } else {
            CapabilityCheck::deny("requires a staff-level role")
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `pending -> approved`. Opens the concern's chat channel with a system
    /// message authored by the assigned handler when present, else the
    /// approver.
    pub fn approve(&self, concern_id: &str, actor: &Actor) -> OrchestratorResult<Concern> {
        let now = self.clock.now();
        let (before, after) = self.mutate(concern_id, "approve", |current| {
            self.can_review(actor, current).ensure(actor, "approve")?;
            if current.status != ConcernStatus::Pending {
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    "approve",
                    current.status,
                ));
            }
            let mut updated = current.clone();
            updated.record_approval(actor.id.clone(), now);
            Ok(updated)
        })?;

        self.audit.record(
            &actor.id,
            "approve",
            Some(json!({ "status": before.status.to_string() })),
            Some(json!({ "status": after.status.to_string() })),
        );

        let author = after
            .assigned_to
            .clone()
            .unwrap_or_else(|| actor.id.clone());
        let mut participants = vec![after.student_id.clone(), author.clone()];
        participants.dedup();
        self.chat.open(
            &after,
            &participants,
            &ChatMessage {
                author,
                body: format!("Concern {} has been approved for handling.", after.reference),
            },
        );
        self.notifier.notify(
            &after.student_id,
            "Concern approved",
            &format!("Your concern {} was approved.", after.reference),
            json!({ "concern_id": after.id, "reference": after.reference }),
        );

        info!(concern = %after.reference, approver = %actor.id, "concern approved");
        Ok(after)
    }

    /// `pending -> rejected`. Requires a reason of at least the configured
    /// minimum length.
    pub fn reject(
        &self,
        concern_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        if reason.trim().len() < self.config.min_reason_len {
            return Err(OrchestratorError::Validation(format!(
                "rejection reason must be at least {} characters",
                self.config.min_reason_len
            )));
        }

        let now = self.clock.now();
        let (before, after) = self.mutate(concern_id, "reject", |current| {
            self.can_review(actor, current).ensure(actor, "reject")?;
            if current.status != ConcernStatus::Pending {
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    "reject",
                    current.status,
                ));
            }
            let mut updated = current.clone();
            updated.record_rejection(actor.id.clone(), reason.trim().to_string(), now);
            Ok(updated)
        })?;

        self.audit.record(
            &actor.id,
            "reject",
            Some(json!({ "status": before.status.to_string() })),
            Some(json!({ "status": after.status.to_string(), "reason": reason.trim() })),
        );
        self.notifier.notify(
            &after.student_id,
            "Concern rejected",
            &format!("Your concern {} was rejected: {}", after.reference, reason.trim()),
            json!({ "concern_id": after.id, "reference": after.reference }),
        );

        info!(concern = %after.reference, reviewer = %actor.id, "concern rejected");
        Ok(after)
    }

    /// Forward status movement by authorized roles.
    ///
    /// The student-reserved targets (`student_confirmed`, `disputed`) are
    /// rejected here regardless of role; terminal states admit no further
    /// movement.
    pub fn update_status(
        &self,
        concern_id: &str,
        actor: &Actor,
        target: ConcernStatus,
        note: Option<&str>,
    ) -> OrchestratorResult<Concern> {
        let now = self.clock.now();
        let (before, after) = self.mutate(concern_id, "update_status", |current| {
            self.can_update_status(actor, current, target)
                .ensure(actor, "update_status")?;
            if !Self::status_change_allowed(current.status, target) {
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    format!("update_status to {target}"),
                    current.status,
                ));
            }
            let mut updated = current.clone();
            updated.record_status(target, now);
            Ok(updated)
        })?;

        self.audit.record(
            &actor.id,
            "update_status",
            Some(json!({ "status": before.status.to_string() })),
            Some(json!({ "status": after.status.to_string(), "note": note })),
        );

        if after.status == ConcernStatus::Closed || after.status == ConcernStatus::Cancelled {
            self.chat.close(&after.id);
        }
        if after.status == ConcernStatus::StaffResolved {
            self.notifier.notify(
                &after.student_id,
                "Concern resolved",
                &format!(
                    "Concern {} was marked resolved. Please confirm or dispute.",
                    after.reference
                ),
                json!({ "concern_id": after.id, "reference": after.reference }),
            );
        }

        info!(concern = %after.reference, from = %before.status, to = %after.status, "status updated");
        Ok(after)
    }

    /// `staff_resolved -> student_confirmed`. Archives the concern and
    /// closes its chat channel.
    pub fn confirm_resolution(
        &self,
        concern_id: &str,
        actor: &Actor,
        notes: Option<&str>,
        rating: Option<u8>,
    ) -> OrchestratorResult<Concern> {
        let now = self.clock.now();
        let (before, after) = self.mutate(concern_id, "confirm_resolution", |current| {
            self.can_confirm(actor, current)
                .ensure(actor, "confirm_resolution")?;
            if current.status != ConcernStatus::StaffResolved {
                // The specific "not confirmable" signal: callers must not
                // coerce state to make a confirmation fit.
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    "confirm_resolution",
                    current.status,
                ));
            }
            let mut updated = current.clone();
            updated.record_confirmation(now);
            Ok(updated)
        })?;

        self.audit.record(
            &actor.id,
            "confirm_resolution",
            Some(json!({ "status": before.status.to_string() })),
            Some(json!({
                "status": after.status.to_string(),
                "notes": notes,
                "rating": rating,
            })),
        );
        self.chat.close(&after.id);
        if let Some(handler) = after.assigned_to.as_deref() {
            self.notifier.notify(
                handler,
                "Resolution confirmed",
                &format!("The student confirmed resolution of {}.", after.reference),
                json!({ "concern_id": after.id, "reference": after.reference }),
            );
        }

        // Any outstanding cross-department work on this concern is done now.
        for record in self.repo.list_cross_assignments()? {
            if record.concern_id == after.id && record.status == CrossAssignmentStatus::Active {
                self.repo.complete_cross_assignment(&record.id, now)?;
            }
        }

        info!(concern = %after.reference, "resolution confirmed and archived");
        Ok(after)
    }

    /// `staff_resolved -> disputed`. Reopens the chat channel and leaves
    /// assignment and escalation untouched: a human must act next.
    pub fn dispute_resolution(
        &self,
        concern_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        if reason.trim().len() < self.config.min_reason_len {
            return Err(OrchestratorError::Validation(format!(
                "dispute reason must be at least {} characters",
                self.config.min_reason_len
            )));
        }

        let now = self.clock.now();
        let (before, after) = self.mutate(concern_id, "dispute_resolution", |current| {
            self.can_dispute(actor, current)
                .ensure(actor, "dispute_resolution")?;
            if current.status != ConcernStatus::StaffResolved {
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    "dispute_resolution",
                    current.status,
                ));
            }
            let mut updated = current.clone();
            updated.record_dispute(reason.trim().to_string(), now);
            Ok(updated)
        })?;

        self.audit.record(
            &actor.id,
            "dispute_resolution",
            Some(json!({ "status": before.status.to_string() })),
            Some(json!({ "status": after.status.to_string(), "reason": reason.trim() })),
        );
        self.chat.reopen(&after.id);
        if let Some(handler) = after.assigned_to.as_deref() {
            self.notifier.notify(
                handler,
                "Resolution disputed",
                &format!("The student disputed the resolution of {}.", after.reference),
                json!({ "concern_id": after.id, "reference": after.reference }),
            );
        }

        info!(concern = %after.reference, "resolution disputed");
        Ok(after)
    }

    /// Manual assignment by an admin or the owning department's head.
    pub fn assign_manual(
        &self,
        concern_id: &str,
        actor: &Actor,
        handler_id: &str,
    ) -> OrchestratorResult<Concern> {
        let handler = self.repo.get_handler(handler_id)?;
        if !handler.active {
            return Err(OrchestratorError::Validation(format!(
                "handler {handler_id} is not active"
            )));
        }

        let current = self.repo.get_concern(concern_id)?;
        self.can_assign(actor, &current).ensure(actor, "assign")?;

        self.commit_assignment_with_effects(concern_id, handler_id, &actor.id)
    }

    /// Assignment chosen by the selector (submission-time auto assignment or
    /// an executed rebalance proposal).
    pub fn assign_selected(
        &self,
        concern_id: &str,
        selected: &SelectedHandler,
    ) -> OrchestratorResult<Concern> {
        self.commit_assignment_with_effects(concern_id, &selected.handler.id, "system")
    }

    /// Single-shot escalation commit: reassignment, level, reason, and
    /// status forced to `in_progress`, all in one store write.
    ///
    /// Deliberately not retried on version conflict: a conflict means the
    /// concern changed under the sweep, and the caller must re-evaluate the
    /// cooldown before trying again (the next sweep cycle does exactly
    /// that). A failure here leaves the concern un-escalated.
    pub fn commit_escalation(
        &self,
        concern_id: &str,
        target: &SelectedHandler,
        level: EscalationLevel,
        reason: &str,
        escalated_by: &str,
    ) -> OrchestratorResult<Concern> {
        let current = self.repo.get_concern(concern_id)?;
        if !current.is_open() {
            return Err(OrchestratorError::invalid_state(
                &current.reference,
                "escalate",
                current.status,
            ));
        }

        let previous_handler = current.assigned_to.clone();
        let mut updated = current.clone();
        updated.record_escalation(
            target.handler.id.clone(),
            level,
            reason.to_string(),
            self.clock.now(),
        );

        let after = self
            .repo
            .commit_assignment(updated, current.version, self.config.capacity_cap)?;

        self.audit.record(
            escalated_by,
            "escalate",
            Some(json!({
                "assigned_to": previous_handler,
                "escalation_level": current.escalation_level.to_string(),
            })),
            Some(json!({
                "assigned_to": after.assigned_to,
                "escalation_level": after.escalation_level.to_string(),
                "reason": reason,
            })),
        );
        self.notifier.notify(
            &target.handler.id,
            "Concern escalated to you",
            &format!("Concern {} was escalated: {}", after.reference, reason),
            json!({ "concern_id": after.id, "reference": after.reference }),
        );

        info!(
            concern = %after.reference,
            level = %level,
            handler = %target.handler.id,
            "concern escalated"
        );
        Ok(after)
    }

    /// Emergency commit: forced priority, reassignment to the emergency
    /// handler, and status forced to `in_progress`, in one store write.
    pub fn commit_emergency(
        &self,
        concern_id: &str,
        target: &SelectedHandler,
        priority: Priority,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        let current = self.repo.get_concern(concern_id)?;
        if !current.is_open() {
            return Err(OrchestratorError::invalid_state(
                &current.reference,
                "activate_emergency",
                current.status,
            ));
        }

        let previous_handler = current.assigned_to.clone();
        let mut updated = current.clone();
        updated.priority = priority;
        updated.record_assignment(target.handler.id.clone(), self.clock.now());
        updated.status = ConcernStatus::InProgress;

        let after = self
            .repo
            .commit_assignment(updated, current.version, self.config.capacity_cap)?;

        self.audit.record(
            "system",
            "activate_emergency",
            Some(json!({
                "assigned_to": previous_handler,
                "priority": current.priority.to_string(),
                "status": current.status.to_string(),
            })),
            Some(json!({
                "assigned_to": after.assigned_to,
                "priority": after.priority.to_string(),
                "status": after.status.to_string(),
                "reason": reason,
            })),
        );
        self.notifier.notify(
            &target.handler.id,
            "Emergency assignment",
            &format!("Emergency on concern {}: {}", after.reference, reason),
            json!({ "concern_id": after.id, "reference": after.reference }),
        );

        info!(concern = %after.reference, handler = %target.handler.id, "emergency committed");
        Ok(after)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn commit_assignment_with_effects(
        &self,
        concern_id: &str,
        handler_id: &str,
        assigned_by: &str,
    ) -> OrchestratorResult<Concern> {
        let now = self.clock.now();
        let cap = self.config.capacity_cap;

        let mut last_err: Option<StoreError> = None;
        for _ in 0..self.config.cas_retry_limit.max(1) {
            let current = self.repo.get_concern(concern_id)?;
            if current.status.is_terminal() || current.archived {
                return Err(OrchestratorError::invalid_state(
                    &current.reference,
                    "assign",
                    current.status,
                ));
            }

            let previous_handler = current.assigned_to.clone();
            let mut updated = current.clone();
            updated.record_assignment(handler_id.to_string(), now);

            match self.repo.commit_assignment(updated, current.version, cap) {
                Ok(after) => {
                    self.audit.record(
                        assigned_by,
                        "assign",
                        Some(json!({ "assigned_to": previous_handler })),
                        Some(json!({ "assigned_to": after.assigned_to })),
                    );
                    let mut participants = vec![after.student_id.clone(), handler_id.to_string()];
                    participants.dedup();
                    self.chat.open(
                        &after,
                        &participants,
                        &ChatMessage {
                            author: handler_id.to_string(),
                            body: format!(
                                "Hello! I've been assigned to your concern {} and will be in touch.",
                                after.reference
                            ),
                        },
                    );
                    self.notifier.notify(
                        handler_id,
                        "Concern assigned",
                        &format!("Concern {} has been assigned to you.", after.reference),
                        json!({ "concern_id": after.id, "reference": after.reference }),
                    );
                    info!(concern = %after.reference, handler = handler_id, "concern assigned");
                    return Ok(after);
                }
                Err(err @ StoreError::VersionConflict { .. }) => {
                    last_err = Some(err);
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(OrchestratorError::Store(last_err.unwrap_or(
            StoreError::NotFound(format!("concern {concern_id}")),
        )))
    }

    /// Read-validate-write with bounded retry on version conflicts.
    ///
    /// Returns the concern as read and as stored. Side effects belong after
    /// the commit, never inside the closure.
    fn mutate<F>(
        &self,
        concern_id: &str,
        action: &str,
        build: F,
    ) -> OrchestratorResult<(Concern, Concern)>
    where
        F: Fn(&Concern) -> OrchestratorResult<Concern>,
    {
        let mut last_err: Option<StoreError> = None;
        for _ in 0..self.config.cas_retry_limit.max(1) {
            let current = self.repo.get_concern(concern_id)?;
            let updated = build(&current)?;
            match self.repo.update_concern(updated, current.version) {
                Ok(stored) => return Ok((current, stored)),
                Err(err @ StoreError::VersionConflict { .. }) => {
                    tracing::debug!(concern_id, action, "version conflict, retrying");
                    last_err = Some(err);
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(OrchestratorError::Store(last_err.unwrap_or(
            StoreError::NotFound(format!("concern {concern_id}")),
        )))
    }

    fn status_change_allowed(current: ConcernStatus, target: ConcernStatus) -> bool {
        if current.is_terminal() || current == target {
            return false;
        }
        match target {
            // Student-reserved transitions never pass through update_status.
            ConcernStatus::StudentConfirmed | ConcernStatus::Disputed => false,
            ConcernStatus::Closed => true,
            ConcernStatus::Cancelled => current == ConcernStatus::Pending,
            ConcernStatus::InProgress if current == ConcernStatus::Disputed => true,
            _ => match (current.forward_rank(), target.forward_rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}
