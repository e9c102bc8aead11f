//! The orchestrator facade: one method per operation exposed to the API
//! collaborator.
//!
//! Wires the classifier, selector, lifecycle machine, escalation sweeper,
//! and balancer over shared ports. Submission classifies, persists, and
//! attempts an automatic assignment synchronously; everything else
//! delegates to the owning component.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assignment::{AssignmentSelector, SelectionOutcome};
use crate::balancer::{
    CrossDepartmentBalancer, DepartmentLoad, EmergencyActivation, RebalanceProposal,
};
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::escalation::{EscalationSweeper, SweepOutcome};
use crate::lifecycle::LifecycleMachine;
use crate::ports::{AuditLog, ChatChannels, Notifier};
use crate::state::{
    Actor, Concern, ConcernDraft, ConcernStatus, EscalationLevel, Priority, ReferenceGenerator,
    SharedRepository, StoreError,
};
use crate::triage::{PriorityClassifier, TriageAnalysis};
use crate::workload::WorkloadTracker;

/// Everything the API layer needs back from a submission.
///
/// An unassigned submission is still a success: `assignment` reports
/// `NoAssigneeAvailable` and the concern waits for manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub concern: Concern,
    pub analysis: TriageAnalysis,
    pub assignment: SelectionOutcome,
}

/// The concern assignment and escalation orchestrator.
pub struct ConcernOrchestrator {
    repo: SharedRepository,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    config: OrchestratorConfig,
    classifier: PriorityClassifier,
    references: ReferenceGenerator,
    tracker: Arc<WorkloadTracker>,
    selector: AssignmentSelector,
    machine: Arc<LifecycleMachine>,
    sweeper: Arc<EscalationSweeper>,
    balancer: CrossDepartmentBalancer,
}

impl ConcernOrchestrator {
    pub fn new(
        repo: SharedRepository,
        notifier: Arc<dyn Notifier>,
        chat: Arc<dyn ChatChannels>,
        audit: Arc<dyn AuditLog>,
        clock: SharedClock,
        config: OrchestratorConfig,
    ) -> Self {
        let machine = Arc::new(LifecycleMachine::new(
            repo.clone(),
            notifier.clone(),
            chat,
            audit,
            clock.clone(),
            config.clone(),
        ));
        let tracker = Arc::new(WorkloadTracker::new(repo.clone()));
        let sweeper = Arc::new(EscalationSweeper::new(
            repo.clone(),
            tracker.clone(),
            machine.clone(),
            notifier.clone(),
            clock.clone(),
            config.clone(),
        ));
        let balancer = CrossDepartmentBalancer::new(
            repo.clone(),
            tracker.clone(),
            machine.clone(),
            clock.clone(),
            config.clone(),
        );

        Self {
            repo,
            notifier,
            clock,
            selector: AssignmentSelector::new(config.capacity_cap),
            config,
            classifier: PriorityClassifier::new(),
            references: ReferenceGenerator::new(),
            tracker,
            machine,
            sweeper,
            balancer,
        }
    }

    /// Create a shared reference to this orchestrator.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The sweeper, for embedding in a `SweepRunner`.
    pub fn sweeper(&self) -> Arc<EscalationSweeper> {
        self.sweeper.clone()
    }

    /// The lifecycle machine, for direct capability queries.
    pub fn machine(&self) -> &LifecycleMachine {
        &self.machine
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Submit a new concern: classify, persist, and attempt an automatic
    /// assignment in the same call.
    pub fn submit(&self, draft: ConcernDraft) -> OrchestratorResult<SubmitOutcome> {
        if draft.subject.trim().is_empty() {
            return Err(OrchestratorError::Validation("subject must not be empty".into()));
        }
        if draft.description.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "description must not be empty".into(),
            ));
        }
        let department = self.repo.get_department(&draft.department_id)?;
        if !department.active {
            return Err(OrchestratorError::Validation(format!(
                "department {} is not accepting concerns",
                department.id
            )));
        }

        let analysis = self.classifier.classify(&draft.subject, &draft.description);
        let now = self.clock.now();
        let concern = Concern::new(
            draft,
            self.references.next(now),
            analysis.category,
            analysis.priority,
            now,
        );
        let concern_id = concern.id.clone();
        info!(concern = %concern.reference, "submitted: {}", analysis.summary());
        self.repo.insert_concern(concern)?;

        let assignment = self.auto_assign(&concern_id)?;
        if let SelectionOutcome::NoAssigneeAvailable = assignment {
            info!(concern_id = %concern_id, "no assignee available, awaiting manual review");
        }

        if analysis.auto_escalation {
            self.flag_auto_escalation(&concern_id)?;
        }

        Ok(SubmitOutcome {
            concern: self.repo.get_concern(&concern_id)?,
            analysis,
            assignment,
        })
    }

    /// `pending -> approved` by the owning department's head or an admin.
    pub fn approve(&self, concern_id: &str, actor: &Actor) -> OrchestratorResult<Concern> {
        self.machine.approve(concern_id, actor)
    }

    /// `pending -> rejected` with a mandatory reason.
    pub fn reject(
        &self,
        concern_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        self.machine.reject(concern_id, actor, reason)
    }

    /// Forward status movement by staff-level actors.
    pub fn update_status(
        &self,
        concern_id: &str,
        actor: &Actor,
        status: ConcernStatus,
        note: Option<&str>,
    ) -> OrchestratorResult<Concern> {
        self.machine.update_status(concern_id, actor, status, note)
    }

    /// `staff_resolved -> student_confirmed` by the owning student.
    pub fn confirm_resolution(
        &self,
        concern_id: &str,
        student: &Actor,
        notes: Option<&str>,
        rating: Option<u8>,
    ) -> OrchestratorResult<Concern> {
        self.machine
            .confirm_resolution(concern_id, student, notes, rating)
    }

    /// `staff_resolved -> disputed` by the owning student.
    pub fn dispute_resolution(
        &self,
        concern_id: &str,
        student: &Actor,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        self.machine.dispute_resolution(concern_id, student, reason)
    }

    /// Manual assignment by an admin or the owning department's head.
    pub fn assign(
        &self,
        concern_id: &str,
        actor: &Actor,
        handler_id: &str,
    ) -> OrchestratorResult<Concern> {
        self.machine.assign_manual(concern_id, actor, handler_id)
    }

    /// One escalation sweep cycle over all open concerns.
    pub fn run_escalation_sweep(&self) -> OrchestratorResult<SweepOutcome> {
        self.sweeper.run()
    }

    /// Manual escalation by a staff-level actor: raises the concern to the
    /// department head pool, or to the admin pool when it is already there.
    pub fn manual_escalate(
        &self,
        concern_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> OrchestratorResult<Concern> {
        if reason.trim().len() < self.config.min_reason_len {
            return Err(OrchestratorError::Validation(format!(
                "escalation reason must be at least {} characters",
                self.config.min_reason_len
            )));
        }

        let concern = self.repo.get_concern(concern_id)?;
        let check = self.machine.can_escalate(actor, &concern);
        if !check.allowed {
            return Err(OrchestratorError::unauthorized(
                &actor.id,
                "manual_escalate",
                check.reason,
            ));
        }
        if !concern.is_open() {
            return Err(OrchestratorError::invalid_state(
                &concern.reference,
                "manual_escalate",
                concern.status,
            ));
        }

        let level = if concern.escalation_level >= EscalationLevel::DepartmentHead {
            EscalationLevel::Admin
        } else {
            EscalationLevel::DepartmentHead
        };

        let candidates = self.tracker.snapshot_all_active()?;
        let selection = self.selector.select_escalation_target(
            &concern.department_id,
            concern.assigned_to.as_deref(),
            level,
            &candidates,
        );
        let target = match selection {
            SelectionOutcome::Selected(target) => target,
            SelectionOutcome::NoAssigneeAvailable => {
                return Err(OrchestratorError::Validation(format!(
                    "no eligible handler at {level} for manual escalation"
                )));
            }
        };

        self.machine.commit_escalation(
            concern_id,
            &target,
            level,
            &format!("manually escalated by {}: {}", actor.id, reason.trim()),
            &actor.id,
        )
    }

    /// Rebalance proposals for an overloaded department. Proposals are
    /// inert until executed.
    pub fn rebalance_workload(
        &self,
        department_id: &str,
    ) -> OrchestratorResult<Vec<RebalanceProposal>> {
        self.balancer.propose_rebalance(department_id)
    }

    /// Execute one rebalance proposal.
    pub fn execute_proposal(
        &self,
        actor: &Actor,
        proposal: &RebalanceProposal,
    ) -> OrchestratorResult<Concern> {
        self.balancer.execute_proposal(actor, proposal)
    }

    /// Emergency reassignment across departments with forced priority.
    pub fn activate_emergency(
        &self,
        concern_id: &str,
        reason: &str,
        priority: Option<Priority>,
    ) -> OrchestratorResult<EmergencyActivation> {
        self.balancer.activate_emergency(concern_id, reason, priority)
    }

    /// Per-department load report.
    pub fn department_loads(&self) -> OrchestratorResult<Vec<DepartmentLoad>> {
        self.balancer.department_loads()
    }

    /// Read one concern.
    pub fn concern(&self, concern_id: &str) -> OrchestratorResult<Concern> {
        Ok(self.repo.get_concern(concern_id)?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Select and commit a handler, refreshing the workload snapshot after
    /// every commit-time capacity rejection.
    ///
    /// Each rejection implies at least one concurrent commit landed between
    /// our snapshot and our write, and total commits are bounded by
    /// handlers x cap, so the loop terminates with either a successful
    /// assignment or a genuine `NoAssigneeAvailable`.
    fn auto_assign(&self, concern_id: &str) -> OrchestratorResult<SelectionOutcome> {
        let concern = self.repo.get_concern(concern_id)?;
        let attempts = self.repo.list_handlers()?.len() * self.config.capacity_cap + 1;

        for _ in 0..attempts {
            let candidates = self.tracker.snapshot_all_active()?;
            let selection = self
                .selector
                .select(&concern.department_id, &candidates, false);
            let target = match selection {
                SelectionOutcome::Selected(target) => target,
                SelectionOutcome::NoAssigneeAvailable => {
                    return Ok(SelectionOutcome::NoAssigneeAvailable);
                }
            };

            match self.machine.assign_selected(concern_id, &target) {
                Ok(_) => return Ok(SelectionOutcome::Selected(target)),
                Err(OrchestratorError::Store(StoreError::CapacityExceeded { handler, .. })) => {
                    // Lost a capacity race; the next snapshot sees the
                    // handler at cap and picks someone else.
                    warn!(handler, "capacity race lost, reselecting");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(SelectionOutcome::NoAssigneeAvailable)
    }

    /// An urgent, negative submission pages the department head.
    fn flag_auto_escalation(&self, concern_id: &str) -> OrchestratorResult<()> {
        let concern = self.repo.get_concern(concern_id)?;
        warn!(concern = %concern.reference, "auto-escalation signal on submission");

        let department = self.repo.get_department(&concern.department_id)?;
        if let Some(head) = department.head.as_deref() {
            self.notifier.notify(
                head,
                "Auto-escalation signal",
                &format!(
                    "Concern {} triaged as urgent with negative sentiment.",
                    concern.reference
                ),
                serde_json::json!({ "concern_id": concern.id, "reference": concern.reference }),
            );
        }
        Ok(())
    }
}
