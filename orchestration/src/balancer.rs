//! Cross-department load aggregation and rebalancing.
//!
//! The balancer reads per-department load, proposes moving queued concerns
//! to cross-capable handlers elsewhere, and executes proposals only on an
//! explicit call. The emergency entry point bypasses proposal review
//! entirely.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assignment::{AssignmentSelector, SelectionOutcome};
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::lifecycle::LifecycleMachine;
use crate::state::{
    Actor, AssignmentKind, Concern, CrossDepartmentAssignment, DepartmentId, Handler, Priority,
    Role, SharedRepository,
};
use crate::workload::{CandidateSnapshot, WorkloadTracker};

/// Load classification for a department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBand {
    /// Spare capacity; a rebalance target.
    Low,
    Normal,
    /// Overloaded; a rebalance source.
    High,
}

/// Open concerns against active staff for one department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentLoad {
    pub department_id: DepartmentId,
    pub open_concerns: usize,
    pub active_staff: usize,
    /// Open concerns per active staff member.
    pub ratio: f64,
    pub band: LoadBand,
}

/// A proposed cross-department move; nothing happens until executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceProposal {
    pub concern_id: String,
    pub reference: String,
    pub from_department: DepartmentId,
    pub handler_id: String,
    pub handler_department: DepartmentId,
    /// The handler's workload when the proposal was drawn up.
    pub handler_workload: usize,
}

/// Result of an emergency activation.
#[derive(Debug, Clone)]
pub struct EmergencyActivation {
    pub concern: Concern,
    pub handler: Handler,
    pub cross_assignment: CrossDepartmentAssignment,
}

/// Aggregates workload across departments and brokers cross-department
/// assignments.
pub struct CrossDepartmentBalancer {
    repo: SharedRepository,
    tracker: Arc<WorkloadTracker>,
    selector: AssignmentSelector,
    machine: Arc<LifecycleMachine>,
    clock: SharedClock,
    config: OrchestratorConfig,
}

impl CrossDepartmentBalancer {
    pub fn new(
        repo: SharedRepository,
        tracker: Arc<WorkloadTracker>,
        machine: Arc<LifecycleMachine>,
        clock: SharedClock,
        config: OrchestratorConfig,
    ) -> Self {
        let selector = AssignmentSelector::new(config.capacity_cap);
        Self {
            repo,
            tracker,
            selector,
            machine,
            clock,
            config,
        }
    }

    /// Per-department load report over active departments.
    pub fn department_loads(&self) -> OrchestratorResult<Vec<DepartmentLoad>> {
        let open_counts = self.tracker.department_open_counts()?;
        let handlers = self.repo.list_handlers()?;

        let mut staff_counts: HashMap<&str, usize> = HashMap::new();
        for handler in handlers
            .iter()
            .filter(|h| h.active && matches!(h.role, Role::Staff | Role::DepartmentHead))
        {
            *staff_counts.entry(handler.department_id.as_str()).or_insert(0) += 1;
        }

        let mut loads: Vec<DepartmentLoad> = self
            .repo
            .list_departments()?
            .into_iter()
            .filter(|d| d.active)
            .map(|d| {
                let open_concerns = open_counts.get(&d.id).copied().unwrap_or(0);
                let active_staff = staff_counts.get(d.id.as_str()).copied().unwrap_or(0);
                let ratio = open_concerns as f64 / active_staff.max(1) as f64;
                let band = if ratio >= self.config.high_load_ratio {
                    LoadBand::High
                } else if ratio <= self.config.low_load_ratio {
                    LoadBand::Low
                } else {
                    LoadBand::Normal
                };
                DepartmentLoad {
                    department_id: d.id,
                    open_concerns,
                    active_staff,
                    ratio,
                    band,
                }
            })
            .collect();

        loads.sort_by(|a, b| {
            b.ratio
                .partial_cmp(&a.ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.department_id.cmp(&b.department_id))
        });
        Ok(loads)
    }

    /// Draw up rebalance proposals for one overloaded department.
    ///
    /// Queued concerns (unassigned first, then oldest open) are paired with
    /// cross-capable handlers elsewhere that have spare capacity, lowest
    /// workload first. Each proposal accounts for the load the earlier
    /// proposals in the same batch would add.
    pub fn propose_rebalance(
        &self,
        department_id: &str,
    ) -> OrchestratorResult<Vec<RebalanceProposal>> {
        let mut queued: Vec<Concern> = self
            .repo
            .list_concerns()?
            .into_iter()
            .filter(|c| c.is_open() && c.department_id == department_id)
            .collect();
        queued.sort_by(|a, b| {
            a.assigned_to
                .is_some()
                .cmp(&b.assigned_to.is_some())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let snapshots = self.tracker.snapshot_all_active()?;
        let mut candidates: Vec<CandidateSnapshot> = snapshots
            .into_iter()
            .filter(|c| c.handler.cross_department)
            .filter(|c| c.handler.department_id != department_id)
            .filter(|c| c.workload < self.config.capacity_cap)
            .collect();

        let mut proposed_extra: HashMap<String, usize> = HashMap::new();
        let mut proposals = Vec::new();

        for concern in queued {
            candidates.sort_by(|a, b| {
                let load = |c: &CandidateSnapshot| {
                    c.workload + proposed_extra.get(&c.handler.id).copied().unwrap_or(0)
                };
                load(a).cmp(&load(b)).then(a.handler.id.cmp(&b.handler.id))
            });

            let Some(best) = candidates
                .iter()
                .find(|c| {
                    c.workload + proposed_extra.get(&c.handler.id).copied().unwrap_or(0)
                        < self.config.capacity_cap
                })
            else {
                break;
            };

            proposals.push(RebalanceProposal {
                concern_id: concern.id.clone(),
                reference: concern.reference.clone(),
                from_department: concern.department_id.clone(),
                handler_id: best.handler.id.clone(),
                handler_department: best.handler.department_id.clone(),
                handler_workload: best.workload
                    + proposed_extra.get(&best.handler.id).copied().unwrap_or(0),
            });
            *proposed_extra.entry(best.handler.id.clone()).or_insert(0) += 1;
        }

        info!(
            department = department_id,
            proposals = proposals.len(),
            "rebalance proposals drawn up"
        );
        Ok(proposals)
    }

    /// Execute one proposal: creates the cross-department assignment record
    /// and commits the handler through the lifecycle machine, exactly as a
    /// normal assignment would.
    pub fn execute_proposal(
        &self,
        actor: &Actor,
        proposal: &RebalanceProposal,
    ) -> OrchestratorResult<Concern> {
        let handler = self.repo.get_handler(&proposal.handler_id)?;
        if !handler.active || !handler.cross_department {
            return Err(OrchestratorError::Validation(format!(
                "handler {} is no longer eligible for cross-department work",
                proposal.handler_id
            )));
        }

        let concern = self.machine.assign_manual(&proposal.concern_id, actor, &handler.id)?;

        let record = CrossDepartmentAssignment::new(
            concern.id.clone(),
            proposal.from_department.clone(),
            handler.id.clone(),
            handler.department_id.clone(),
            AssignmentKind::Normal,
            self.config.rebalance_estimate_hours,
            self.clock.now(),
        );
        self.repo.insert_cross_assignment(record)?;

        info!(
            concern = %concern.reference,
            handler = %handler.id,
            "rebalance proposal executed"
        );
        Ok(concern)
    }

    /// Emergency entry point: immediately hands the concern to the
    /// lowest-workload cross-capable handler outside its department, forces
    /// the given priority (urgent by default) and `in_progress`, and records
    /// an emergency cross-department assignment with a fixed duration
    /// estimate.
    pub fn activate_emergency(
        &self,
        concern_id: &str,
        reason: &str,
        priority: Option<Priority>,
    ) -> OrchestratorResult<EmergencyActivation> {
        let concern = self.repo.get_concern(concern_id)?;
        if !concern.is_open() {
            return Err(OrchestratorError::invalid_state(
                &concern.reference,
                "activate_emergency",
                concern.status,
            ));
        }

        let candidates = self.tracker.snapshot_all_active()?;
        let selection = self
            .selector
            .select(&concern.department_id, &candidates, true);
        let target = match selection {
            SelectionOutcome::Selected(target) => target,
            SelectionOutcome::NoAssigneeAvailable => {
                return Err(OrchestratorError::EmergencyUnstaffed {
                    concern: concern.reference.clone(),
                });
            }
        };

        let forced_priority = priority.unwrap_or(Priority::Urgent);
        let updated =
            self.machine
                .commit_emergency(concern_id, &target, forced_priority, reason)?;

        let record = CrossDepartmentAssignment::new(
            updated.id.clone(),
            updated.department_id.clone(),
            target.handler.id.clone(),
            target.handler.department_id.clone(),
            AssignmentKind::Emergency,
            self.config.emergency_estimate_hours,
            self.clock.now(),
        );
        self.repo.insert_cross_assignment(record.clone())?;

        info!(
            concern = %updated.reference,
            handler = %target.handler.id,
            priority = %forced_priority,
            "emergency activated"
        );
        Ok(EmergencyActivation {
            concern: updated,
            handler: target.handler.clone(),
            cross_assignment: record,
        })
    }
}
