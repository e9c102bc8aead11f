//! Handler selection under workload and capacity constraints.
//!
//! Selection is pure: it ranks candidate snapshots and returns a choice (or
//! `NoAssigneeAvailable`), and the caller commits the result through the
//! lifecycle machine. Keeping the decision side-effect free makes it
//! testable independent of persistence.

use serde::{Deserialize, Serialize};

use crate::state::{DepartmentId, EscalationLevel, Handler, Role};
use crate::workload::CandidateSnapshot;

/// Which pool the chosen handler came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPool {
    InDepartment,
    CrossDepartment,
}

/// A committed-to candidate with the load figures it was chosen on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedHandler {
    pub handler: Handler,
    pub pool: SelectionPool,
    /// Workload at selection time (snapshot, may be slightly stale).
    pub workload: usize,
    pub avg_resolution_hours: Option<f64>,
}

/// Outcome of a selection attempt.
///
/// `NoAssigneeAvailable` is a valid result, not an error: the concern stays
/// unassigned and the caller may retry later or page an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SelectionOutcome {
    Selected(SelectedHandler),
    NoAssigneeAvailable,
}

impl SelectionOutcome {
    pub fn selected(&self) -> Option<&SelectedHandler> {
        match self {
            Self::Selected(choice) => Some(choice),
            Self::NoAssigneeAvailable => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Selected(_))
    }
}

/// Ranks candidates: in-department first, cross-department widening, then
/// lowest workload with deterministic tie-breaks.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentSelector {
    capacity_cap: usize,
}

impl AssignmentSelector {
    pub fn new(capacity_cap: usize) -> Self {
        Self { capacity_cap }
    }

    /// Select a handler for a concern owned by `department`.
    ///
    /// The in-department pool is active staff and department heads of the
    /// owning department. When that pool is empty, or `emergency` is set,
    /// the search widens to active cross-department-capable handlers from
    /// other departments.
    pub fn select(
        &self,
        department: &DepartmentId,
        candidates: &[CandidateSnapshot],
        emergency: bool,
    ) -> SelectionOutcome {
        let in_department: Vec<&CandidateSnapshot> = candidates
            .iter()
            .filter(|c| c.handler.active)
            .filter(|c| c.handler.department_id == *department)
            .filter(|c| matches!(c.handler.role, Role::Staff | Role::DepartmentHead))
            .collect();

        if !emergency && !in_department.is_empty() {
            if let outcome @ SelectionOutcome::Selected(_) =
                self.pick(in_department, SelectionPool::InDepartment)
            {
                return outcome;
            }
        }

        let cross: Vec<&CandidateSnapshot> = candidates
            .iter()
            .filter(|c| c.handler.active && c.handler.cross_department)
            .filter(|c| c.handler.department_id != *department)
            .collect();
        self.pick(cross, SelectionPool::CrossDepartment)
    }

    /// Select a handler for an escalation at `level`.
    ///
    /// Staff-level escalation stays in the department but excludes the
    /// current assignee; department-head escalation prefers the owning
    /// department's head over heads elsewhere; admin escalation draws from
    /// the admin pool.
    pub fn select_escalation_target(
        &self,
        department: &DepartmentId,
        current_assignee: Option<&str>,
        level: EscalationLevel,
        candidates: &[CandidateSnapshot],
    ) -> SelectionOutcome {
        let eligible: Vec<&CandidateSnapshot> = candidates
            .iter()
            .filter(|c| c.handler.active)
            .filter(|c| Some(c.handler.id.as_str()) != current_assignee)
            .filter(|c| match level {
                EscalationLevel::Staff => {
                    c.handler.department_id == *department
                        && matches!(c.handler.role, Role::Staff | Role::DepartmentHead)
                }
                EscalationLevel::DepartmentHead => c.handler.role == Role::DepartmentHead,
                EscalationLevel::Admin => c.handler.role == Role::Admin,
                EscalationLevel::None => false,
            })
            .collect();

        let pool = if level == EscalationLevel::Staff {
            SelectionPool::InDepartment
        } else {
            SelectionPool::CrossDepartment
        };
        self.pick_preferring_department(eligible, pool, department)
    }

    fn pick(&self, pool: Vec<&CandidateSnapshot>, kind: SelectionPool) -> SelectionOutcome {
        let mut under_cap: Vec<&CandidateSnapshot> = pool
            .into_iter()
            .filter(|c| c.workload < self.capacity_cap)
            .collect();

        Self::rank(&mut under_cap, None);

        match under_cap.first() {
            Some(best) => SelectionOutcome::Selected(SelectedHandler {
                handler: best.handler.clone(),
                pool: kind,
                workload: best.workload,
                avg_resolution_hours: best.avg_resolution_hours,
            }),
            None => SelectionOutcome::NoAssigneeAvailable,
        }
    }

    fn pick_preferring_department(
        &self,
        pool: Vec<&CandidateSnapshot>,
        kind: SelectionPool,
        department: &DepartmentId,
    ) -> SelectionOutcome {
        let mut under_cap: Vec<&CandidateSnapshot> = pool
            .into_iter()
            .filter(|c| c.workload < self.capacity_cap)
            .collect();

        Self::rank(&mut under_cap, Some(department));

        match under_cap.first() {
            Some(best) => SelectionOutcome::Selected(SelectedHandler {
                handler: best.handler.clone(),
                pool: kind,
                workload: best.workload,
                avg_resolution_hours: best.avg_resolution_hours,
            }),
            None => SelectionOutcome::NoAssigneeAvailable,
        }
    }

    /// Ordering: preferred department first (when given), then lowest
    /// workload, then lowest average resolution time with missing history
    /// last, then handler id for a stable final tie-break.
    fn rank(candidates: &mut [&CandidateSnapshot], prefer_department: Option<&DepartmentId>) {
        candidates.sort_by(|a, b| {
            let dept_key = |c: &CandidateSnapshot| match prefer_department {
                Some(dept) => c.handler.department_id != *dept,
                None => false,
            };
            dept_key(a)
                .cmp(&dept_key(b))
                .then(a.workload.cmp(&b.workload))
                .then_with(|| match (a.avg_resolution_hours, b.avg_resolution_hours) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.handler.id.cmp(&b.handler.id))
        });
    }
}
