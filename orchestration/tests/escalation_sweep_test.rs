//! Integration tests for the escalation sweep.
//!
//! Drives `run_escalation_sweep` with a pinned clock: the urgent 7-hour
//! reassignment scenario, cooldown idempotence, multi-threshold jumps, and
//! isolation of per-concern store failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use orchestration::{
    Actor, Clock, Concern, ConcernDraft, ConcernOrchestrator, ConcernRepository, ConcernStatus,
    CrossDepartmentAssignment, Department, EscalationLevel, FixedClock, Handler, MemoryStore,
    OrchestratorConfig, RecordingAudit, RecordingChat, RecordingNotifier, Role, SharedRepository,
    SkipReason, StoreError,
};

struct Desk {
    orchestrator: ConcernOrchestrator,
    repo: SharedRepository,
    clock: Arc<FixedClock>,
    notifier: Arc<RecordingNotifier>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
}

fn desk_with_repo(repo: SharedRepository) -> Desk {
    let clock = Arc::new(FixedClock::at(start()));
    let notifier = RecordingNotifier::shared();

    repo.upsert_department(Department::new("housing", "Student Housing"))
        .unwrap();
    repo.upsert_handler(Handler::new("s1", "Sasha", "housing", Role::Staff))
        .unwrap();
    repo.upsert_handler(Handler::new("s2", "Noor", "housing", Role::Staff))
        .unwrap();

    let orchestrator = ConcernOrchestrator::new(
        repo.clone(),
        notifier.clone(),
        RecordingChat::shared(),
        RecordingAudit::shared(),
        clock.clone(),
        OrchestratorConfig::default(),
    );

    Desk {
        orchestrator,
        repo,
        clock,
        notifier,
    }
}

fn desk() -> Desk {
    desk_with_repo(MemoryStore::new().shared())
}

fn submit_urgent(desk: &Desk, subject: &str) -> Concern {
    desk.orchestrator
        .submit(ConcernDraft {
            subject: format!("URGENT: {subject}"),
            description: "needs attention right away".into(),
            student_id: "student-1".into(),
            department_id: "housing".into(),
            facility: None,
            attachments: vec![],
        })
        .unwrap()
        .concern
}

/// The 7-hour urgent scenario: past the 6h threshold the sweep reassigns
/// to the lower-workload peer, sets level staff, stamps escalated_at, and
/// forces in_progress.
#[test]
fn test_seven_hour_urgent_reassignment() {
    let desk = desk();
    let concern = submit_urgent(&desk, "flooded hallway");
    assert_eq!(concern.assigned_to.as_deref(), Some("s1"));

    desk.clock.advance(Duration::hours(7));
    let outcome = desk.orchestrator.run_escalation_sweep().unwrap();

    assert_eq!(outcome.escalated.len(), 1);
    assert_eq!(outcome.escalated[0].level, EscalationLevel::Staff);
    assert!((outcome.escalated[0].elapsed_hours - 7.0).abs() < 0.01);

    let swept = desk.orchestrator.concern(&concern.id).unwrap();
    assert_eq!(swept.assigned_to.as_deref(), Some("s2"));
    assert_eq!(swept.escalation_level, EscalationLevel::Staff);
    assert_eq!(swept.status, ConcernStatus::InProgress);
    assert_eq!(swept.escalated_at, Some(desk.clock.now()));
    assert!(swept
        .escalation_reason
        .as_deref()
        .unwrap()
        .contains("6h threshold"));

    // The new handler heard about it.
    assert!(desk
        .notifier
        .sent()
        .iter()
        .any(|n| n.user == "s2" && n.title == "Concern escalated to you"));
}

/// Running the sweep twice inside the cooldown escalates at most once;
/// after the cooldown the concern moves to the next level.
#[test]
fn test_sweep_idempotence_and_next_level() {
    let desk = desk();
    desk.repo
        .upsert_handler(Handler::new("admin-1", "Ada", "central", Role::Admin))
        .unwrap();
    let concern = submit_urgent(&desk, "broken entrance door");

    desk.clock.advance(Duration::hours(7));
    let first = desk.orchestrator.run_escalation_sweep().unwrap();
    assert_eq!(first.escalated.len(), 1);

    // Immediately re-running changes nothing: the reassignment reset the
    // activity window, so the concern is simply not due.
    let rerun = desk.orchestrator.run_escalation_sweep().unwrap();
    assert!(rerun.escalated.is_empty());
    assert!(rerun.skipped.is_empty());

    // 6h later the escalate threshold is crossed again, but the 24h
    // cooldown guards against a second move.
    desk.clock.advance(Duration::hours(6));
    let within_cooldown = desk.orchestrator.run_escalation_sweep().unwrap();
    assert!(within_cooldown.escalated.is_empty());
    assert!(matches!(
        within_cooldown.skipped[0].reason,
        SkipReason::EscalationCooldown { .. }
    ));

    // Past the cooldown, with elapsed time now beyond the admin threshold,
    // the concern moves to the next level.
    desk.clock.advance(Duration::hours(19));
    let second = desk.orchestrator.run_escalation_sweep().unwrap();
    assert_eq!(second.escalated.len(), 1);
    assert_eq!(second.escalated[0].level, EscalationLevel::Admin);

    let swept = desk.orchestrator.concern(&concern.id).unwrap();
    assert_eq!(swept.escalation_level, EscalationLevel::Admin);
    assert_eq!(swept.assigned_to.as_deref(), Some("admin-1"));
}

/// A sweep that comes late finds several thresholds crossed at once and
/// jumps straight to the highest one.
#[test]
fn test_rare_sweep_jumps_to_highest_threshold() {
    let desk = desk();
    desk.repo
        .upsert_handler(Handler::new("admin-1", "Ada", "central", Role::Admin))
        .unwrap();
    let concern = submit_urgent(&desk, "persistent leak");

    desk.clock.advance(Duration::hours(30));
    let outcome = desk.orchestrator.run_escalation_sweep().unwrap();

    assert_eq!(outcome.escalated.len(), 1);
    assert_eq!(outcome.escalated[0].level, EscalationLevel::Admin);
    let swept = desk.orchestrator.concern(&concern.id).unwrap();
    assert_eq!(swept.escalation_level, EscalationLevel::Admin);
}

/// Reminders fire between the reminder and escalation thresholds, at most
/// once per cooldown window, and never reassign.
#[test]
fn test_reminder_window() {
    let desk = desk();
    let concern = submit_urgent(&desk, "noisy construction");

    desk.clock.advance(Duration::hours(3));
    let outcome = desk.orchestrator.run_escalation_sweep().unwrap();
    assert_eq!(outcome.reminded.len(), 1);
    assert_eq!(outcome.reminded[0].handler_id, "s1");

    let swept = desk.orchestrator.concern(&concern.id).unwrap();
    assert_eq!(swept.assigned_to.as_deref(), Some("s1"));
    assert_eq!(swept.last_reminder_sent, Some(desk.clock.now()));

    // Within the 12h reminder cooldown: skipped.
    desk.clock.advance(Duration::hours(2));
    let rerun = desk.orchestrator.run_escalation_sweep().unwrap();
    assert!(rerun.reminded.is_empty());
    assert!(matches!(
        rerun.skipped[0].reason,
        SkipReason::ReminderCooldown { .. }
    ));
}

/// A store that fails escalation commits for one marked concern, to prove
/// sweep failures stay isolated and un-escalated concerns retry next time.
struct FlakyStore {
    inner: MemoryStore,
    poisoned_concern: String,
    fail: AtomicBool,
}

impl FlakyStore {
    fn new(poisoned_concern: String) -> Self {
        Self {
            inner: MemoryStore::new(),
            poisoned_concern,
            fail: AtomicBool::new(false),
        }
    }
}

impl ConcernRepository for FlakyStore {
    fn insert_concern(&self, concern: Concern) -> Result<(), StoreError> {
        self.inner.insert_concern(concern)
    }
    fn get_concern(&self, id: &str) -> Result<Concern, StoreError> {
        self.inner.get_concern(id)
    }
    fn update_concern(&self, updated: Concern, expected: u64) -> Result<Concern, StoreError> {
        self.inner.update_concern(updated, expected)
    }
    fn commit_assignment(
        &self,
        updated: Concern,
        expected: u64,
        cap: usize,
    ) -> Result<Concern, StoreError> {
        if updated.reference == self.poisoned_concern && self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("simulated transient failure".into()));
        }
        self.inner.commit_assignment(updated, expected, cap)
    }
    fn list_concerns(&self) -> Result<Vec<Concern>, StoreError> {
        self.inner.list_concerns()
    }
    fn upsert_handler(&self, handler: Handler) -> Result<(), StoreError> {
        self.inner.upsert_handler(handler)
    }
    fn get_handler(&self, id: &str) -> Result<Handler, StoreError> {
        self.inner.get_handler(id)
    }
    fn list_handlers(&self) -> Result<Vec<Handler>, StoreError> {
        self.inner.list_handlers()
    }
    fn upsert_department(&self, department: Department) -> Result<(), StoreError> {
        self.inner.upsert_department(department)
    }
    fn get_department(&self, id: &str) -> Result<Department, StoreError> {
        self.inner.get_department(id)
    }
    fn list_departments(&self) -> Result<Vec<Department>, StoreError> {
        self.inner.list_departments()
    }
    fn insert_cross_assignment(
        &self,
        assignment: CrossDepartmentAssignment,
    ) -> Result<(), StoreError> {
        self.inner.insert_cross_assignment(assignment)
    }
    fn complete_cross_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<CrossDepartmentAssignment, StoreError> {
        self.inner.complete_cross_assignment(id, now)
    }
    fn list_cross_assignments(&self) -> Result<Vec<CrossDepartmentAssignment>, StoreError> {
        self.inner.list_cross_assignments()
    }
}

/// One concern's commit failure is reported and retried next cycle; the
/// rest of the batch still escalates.
#[test]
fn test_per_concern_failure_isolation() {
    let store = Arc::new(FlakyStore::new("CNR2024050001".into()));
    let repo: SharedRepository = store.clone();
    let desk = desk_with_repo(repo);

    let poisoned = submit_urgent(&desk, "first concern");
    let healthy = submit_urgent(&desk, "second concern");
    assert_eq!(poisoned.reference, "CNR2024050001");

    // Fault appears after submission, while the sweep tries to commit.
    store.fail.store(true, Ordering::SeqCst);
    desk.clock.advance(Duration::hours(7));
    let outcome = desk.orchestrator.run_escalation_sweep().unwrap();

    // The healthy concern escalated; the poisoned one is reported failed.
    assert_eq!(outcome.escalated.len(), 1);
    assert_eq!(outcome.escalated[0].concern_id, healthy.id);
    assert!(outcome
        .skipped
        .iter()
        .any(|s| s.concern_id == poisoned.id
            && matches!(s.reason, SkipReason::Failed { .. })));

    // The failed concern was left untouched: no cooldown was set, so the
    // next sweep (with the fault cleared) escalates it.
    let untouched = desk.orchestrator.concern(&poisoned.id).unwrap();
    assert!(untouched.escalated_at.is_none());
    assert_eq!(untouched.escalation_level, EscalationLevel::None);

    store.fail.store(false, Ordering::SeqCst);
    let retry = desk.orchestrator.run_escalation_sweep().unwrap();
    assert!(retry.escalated.iter().any(|e| e.concern_id == poisoned.id));
}

/// Manual escalation raises to the department head pool and shares the
/// sweep's commit path.
#[test]
fn test_manual_escalation_reaches_department_head() {
    let desk = desk();
    desk.repo
        .upsert_handler(Handler::new("head-1", "Dana", "housing", Role::DepartmentHead))
        .unwrap();
    let concern = submit_urgent(&desk, "stuck elevator");

    let escalated = desk
        .orchestrator
        .manual_escalate(
            &concern.id,
            &Actor::staff("s1", "housing"),
            "hazard needs sign-off from the head",
        )
        .unwrap();

    assert_eq!(escalated.escalation_level, EscalationLevel::DepartmentHead);
    assert_eq!(escalated.assigned_to.as_deref(), Some("head-1"));
    assert_eq!(escalated.status, ConcernStatus::InProgress);
}
