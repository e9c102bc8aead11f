//! Repository port for concern state, with an in-memory reference store.
//!
//! Persistence itself belongs to an external collaborator; the orchestrator
//! only depends on the `ConcernRepository` trait. `MemoryStore` is the
//! in-process implementation used by tests and embedders without a backing
//! database. Writes to concerns use optimistic versioning: every update
//! carries the version the caller read, and a mismatch is a
//! `VersionConflict` the caller retries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::types::{Concern, CrossDepartmentAssignment, Department, Handler};

/// Error type for repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("handler {handler} is at capacity ({cap} open concerns)")]
    CapacityExceeded { handler: String, cap: usize },

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a repository.
pub type SharedRepository = Arc<dyn ConcernRepository>;

/// Persist/read port for concerns, handlers, departments, and
/// cross-department assignments.
///
/// Implementations must make `update_concern` and `commit_assignment`
/// atomic: the version check (and for `commit_assignment` the capacity
/// check) happens in the same critical section as the write.
pub trait ConcernRepository: Send + Sync {
    fn insert_concern(&self, concern: Concern) -> StoreResult<()>;
    fn get_concern(&self, id: &str) -> StoreResult<Concern>;

    /// Replace a concern if its stored version equals `expected_version`.
    ///
    /// Bumps the version on success and returns the stored copy.
    fn update_concern(&self, updated: Concern, expected_version: u64) -> StoreResult<Concern>;

    /// Like `update_concern`, but additionally verifies that the target
    /// handler of `updated.assigned_to` stays under `cap` open concerns,
    /// counted in the same critical section as the write.
    fn commit_assignment(
        &self,
        updated: Concern,
        expected_version: u64,
        cap: usize,
    ) -> StoreResult<Concern>;

    fn list_concerns(&self) -> StoreResult<Vec<Concern>>;

    fn upsert_handler(&self, handler: Handler) -> StoreResult<()>;
    fn get_handler(&self, id: &str) -> StoreResult<Handler>;
    fn list_handlers(&self) -> StoreResult<Vec<Handler>>;

    fn upsert_department(&self, department: Department) -> StoreResult<()>;
    fn get_department(&self, id: &str) -> StoreResult<Department>;
    fn list_departments(&self) -> StoreResult<Vec<Department>>;

    fn insert_cross_assignment(&self, assignment: CrossDepartmentAssignment) -> StoreResult<()>;

    /// The single permitted mutation of a cross-department assignment.
    fn complete_cross_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CrossDepartmentAssignment>;

    fn list_cross_assignments(&self) -> StoreResult<Vec<CrossDepartmentAssignment>>;
}

#[derive(Default)]
struct Tables {
    concerns: HashMap<String, Concern>,
    handlers: HashMap<String, Handler>,
    departments: HashMap<String, Department>,
    cross_assignments: HashMap<String, CrossDepartmentAssignment>,
}

/// In-memory repository guarded by a single `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedRepository {
        Arc::new(self)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn check_version(stored: &Concern, expected: u64) -> StoreResult<()> {
        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                id: stored.id.clone(),
                expected,
                actual: stored.version,
            });
        }
        Ok(())
    }

    fn open_count(tables: &Tables, handler_id: &str, excluding: &str) -> usize {
        tables
            .concerns
            .values()
            .filter(|c| c.id != excluding)
            .filter(|c| c.assigned_to.as_deref() == Some(handler_id))
            .filter(|c| c.is_open())
            .count()
    }
}

impl ConcernRepository for MemoryStore {
    fn insert_concern(&self, concern: Concern) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.concerns.insert(concern.id.clone(), concern);
        Ok(())
    }

    fn get_concern(&self, id: &str) -> StoreResult<Concern> {
        self.read()?
            .concerns
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("concern {id}")))
    }

    fn update_concern(&self, mut updated: Concern, expected_version: u64) -> StoreResult<Concern> {
        let mut tables = self.write()?;
        let stored = tables
            .concerns
            .get(&updated.id)
            .ok_or_else(|| StoreError::NotFound(format!("concern {}", updated.id)))?;
        Self::check_version(stored, expected_version)?;

        updated.version = expected_version + 1;
        tables.concerns.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    fn commit_assignment(
        &self,
        mut updated: Concern,
        expected_version: u64,
        cap: usize,
    ) -> StoreResult<Concern> {
        let mut tables = self.write()?;
        let stored = tables
            .concerns
            .get(&updated.id)
            .ok_or_else(|| StoreError::NotFound(format!("concern {}", updated.id)))?;
        Self::check_version(stored, expected_version)?;

        if let Some(handler_id) = updated.assigned_to.as_deref() {
            let open = Self::open_count(&tables, handler_id, &updated.id);
            if open >= cap {
                return Err(StoreError::CapacityExceeded {
                    handler: handler_id.to_string(),
                    cap,
                });
            }
        }

        updated.version = expected_version + 1;
        tables.concerns.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    fn list_concerns(&self) -> StoreResult<Vec<Concern>> {
        let mut concerns: Vec<Concern> = self.read()?.concerns.values().cloned().collect();
        concerns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(concerns)
    }

    fn upsert_handler(&self, handler: Handler) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.handlers.insert(handler.id.clone(), handler);
        Ok(())
    }

    fn get_handler(&self, id: &str) -> StoreResult<Handler> {
        self.read()?
            .handlers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("handler {id}")))
    }

    fn list_handlers(&self) -> StoreResult<Vec<Handler>> {
        let mut handlers: Vec<Handler> = self.read()?.handlers.values().cloned().collect();
        handlers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(handlers)
    }

    fn upsert_department(&self, department: Department) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.departments.insert(department.id.clone(), department);
        Ok(())
    }

    fn get_department(&self, id: &str) -> StoreResult<Department> {
        self.read()?
            .departments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("department {id}")))
    }

    fn list_departments(&self) -> StoreResult<Vec<Department>> {
        let mut departments: Vec<Department> =
            self.read()?.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(departments)
    }

    fn insert_cross_assignment(&self, assignment: CrossDepartmentAssignment) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables
            .cross_assignments
            .insert(assignment.id.clone(), assignment);
        Ok(())
    }

    fn complete_cross_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CrossDepartmentAssignment> {
        let mut tables = self.write()?;
        let assignment = tables
            .cross_assignments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("cross assignment {id}")))?;
        assignment.complete(now);
        Ok(assignment.clone())
    }

    fn list_cross_assignments(&self) -> StoreResult<Vec<CrossDepartmentAssignment>> {
        let mut assignments: Vec<CrossDepartmentAssignment> =
            self.read()?.cross_assignments.values().cloned().collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{ConcernCategory, ConcernDraft, Priority, Role};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn concern(reference: &str) -> Concern {
        Concern::new(
            ConcernDraft {
                subject: "subject".into(),
                description: "description".into(),
                student_id: "student-1".into(),
                department_id: "facilities".into(),
                facility: None,
                attachments: vec![],
            },
            reference.into(),
            ConcernCategory::General,
            Priority::Medium,
            now(),
        )
    }

    #[test]
    fn test_concern_round_trip() {
        let store = MemoryStore::new();
        let c = concern("CNR2024050001");
        let id = c.id.clone();

        store.insert_concern(c).unwrap();
        let retrieved = store.get_concern(&id).unwrap();
        assert_eq!(retrieved.reference, "CNR2024050001");
        assert_eq!(retrieved.version, 0);
    }

    #[test]
    fn test_update_bumps_version() {
        let store = MemoryStore::new();
        let c = concern("CNR2024050001");
        let id = c.id.clone();
        store.insert_concern(c).unwrap();

        let mut read = store.get_concern(&id).unwrap();
        read.subject = "edited".into();
        let stored = store.update_concern(read, 0).unwrap();
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let c = concern("CNR2024050001");
        let id = c.id.clone();
        store.insert_concern(c).unwrap();

        let first = store.get_concern(&id).unwrap();
        let second = first.clone();
        store.update_concern(first, 0).unwrap();

        let err = store.update_concern(second, 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_commit_assignment_enforces_cap() {
        let store = MemoryStore::new();
        store
            .upsert_handler(Handler::new("h1", "Pat", "facilities", Role::Staff))
            .unwrap();

        // Fill the handler to the cap.
        for i in 0..2 {
            let mut c = concern(&format!("CNR20240500{i:02}"));
            c.record_assignment("h1".into(), now());
            store.insert_concern(c).unwrap();
        }

        let c = concern("CNR2024050099");
        let id = c.id.clone();
        store.insert_concern(c).unwrap();

        let mut read = store.get_concern(&id).unwrap();
        read.record_assignment("h1".into(), now());
        let err = store.commit_assignment(read, 0, 2).unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded { cap: 2, .. }));
    }

    #[test]
    fn test_commit_assignment_ignores_archived() {
        let store = MemoryStore::new();

        let mut resolved = concern("CNR2024050001");
        resolved.record_assignment("h1".into(), now());
        resolved.record_status(crate::state::types::ConcernStatus::StaffResolved, now());
        resolved.record_confirmation(now());
        store.insert_concern(resolved).unwrap();

        let c = concern("CNR2024050002");
        let id = c.id.clone();
        store.insert_concern(c).unwrap();

        let mut read = store.get_concern(&id).unwrap();
        read.record_assignment("h1".into(), now());
        // Cap of 1 still admits the write: the archived concern no longer counts.
        store.commit_assignment(read, 0, 1).unwrap();
    }

    #[test]
    fn test_missing_lookups() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_concern("nope"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get_handler("nope"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get_department("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_cross_assignment_completion() {
        let store = MemoryStore::new();
        let x = CrossDepartmentAssignment::new(
            "c1".into(),
            "facilities".into(),
            "h9".into(),
            "it-services".into(),
            crate::state::types::AssignmentKind::Normal,
            4,
            now(),
        );
        let id = x.id.clone();
        store.insert_cross_assignment(x).unwrap();

        let completed = store
            .complete_cross_assignment(&id, now() + chrono::Duration::hours(5))
            .unwrap();
        assert_eq!(completed.actual_hours, Some(5));
    }

    #[test]
    fn test_list_concerns_is_creation_ordered() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let mut c = concern(&format!("CNR202405000{i}"));
            c.created_at = now() + chrono::Duration::minutes(i);
            store.insert_concern(c).unwrap();
        }
        let listed = store.list_concerns().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
