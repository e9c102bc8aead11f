//! Read-only workload aggregates over the repository.
//!
//! Workload is always derived from concern records on demand; no separate
//! counter is maintained, so the numbers cannot drift. Snapshots may be
//! slightly stale under concurrency, which the selector tolerates; the hard
//! capacity invariant is enforced at commit time by the store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::{Concern, DepartmentId, Handler, SharedRepository, StoreResult};

/// A handler with its derived load figures, input to the selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub handler: Handler,
    /// Open, non-archived concerns currently assigned.
    pub workload: usize,
    /// Mean hours from assignment to staff resolution, when history exists.
    pub avg_resolution_hours: Option<f64>,
}

/// Derived, read-mostly view over handler workload.
pub struct WorkloadTracker {
    repo: SharedRepository,
}

impl WorkloadTracker {
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Create a shared reference to this tracker.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Open concern count for one handler.
    pub fn open_count(&self, handler_id: &str) -> StoreResult<usize> {
        Ok(self
            .repo
            .list_concerns()?
            .iter()
            .filter(|c| c.is_open() && c.assigned_to.as_deref() == Some(handler_id))
            .count())
    }

    /// Whether a handler has reached the capacity cap.
    pub fn is_overloaded(&self, handler_id: &str, cap: usize) -> StoreResult<bool> {
        Ok(self.open_count(handler_id)? >= cap)
    }

    /// Mean hours from assignment to staff resolution for one handler.
    pub fn average_resolution_hours(&self, handler_id: &str) -> StoreResult<Option<f64>> {
        let concerns = self.repo.list_concerns()?;
        Ok(Self::mean_resolution(&concerns, handler_id))
    }

    /// Snapshot every given handler in a single pass over the store.
    pub fn snapshot(&self, handlers: &[Handler]) -> StoreResult<Vec<CandidateSnapshot>> {
        let concerns = self.repo.list_concerns()?;

        let mut open_counts: HashMap<&str, usize> = HashMap::new();
        for concern in concerns.iter().filter(|c| c.is_open()) {
            if let Some(assignee) = concern.assigned_to.as_deref() {
                *open_counts.entry(assignee).or_insert(0) += 1;
            }
        }

        Ok(handlers
            .iter()
            .map(|handler| CandidateSnapshot {
                handler: handler.clone(),
                workload: open_counts.get(handler.id.as_str()).copied().unwrap_or(0),
                avg_resolution_hours: Self::mean_resolution(&concerns, &handler.id),
            })
            .collect())
    }

    /// Snapshot every active handler in the store.
    pub fn snapshot_all_active(&self) -> StoreResult<Vec<CandidateSnapshot>> {
        let handlers: Vec<Handler> = self
            .repo
            .list_handlers()?
            .into_iter()
            .filter(|h| h.active)
            .collect();
        self.snapshot(&handlers)
    }

    /// Open concern count per department.
    pub fn department_open_counts(&self) -> StoreResult<HashMap<DepartmentId, usize>> {
        let mut counts = HashMap::new();
        for concern in self.repo.list_concerns()? {
            if concern.is_open() {
                *counts.entry(concern.department_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn mean_resolution(concerns: &[Concern], handler_id: &str) -> Option<f64> {
        let durations: Vec<f64> = concerns
            .iter()
            .filter(|c| c.assigned_to.as_deref() == Some(handler_id))
            .filter_map(|c| match (c.assigned_at, c.resolved_at) {
                (Some(assigned), Some(resolved)) => {
                    Some((resolved - assigned).num_minutes().max(0) as f64 / 60.0)
                }
                _ => None,
            })
            .collect();

        if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        }
    }
}
