//! Periodic escalation sweep over open concerns.
//!
//! The sweep is an idempotent, resumable batch job keyed by concern id: the
//! escalation and reminder cooldown fields double as the idempotence guard,
//! so overlapping sweeps and retried jobs are safe by construction. A
//! failure for one concern is caught, logged, and reported in the outcome
//! without aborting the rest of the batch; because the cooldown is only set
//! by a successful commit, a failed escalation is retried on the next
//! cycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::ladder::{reminder_due, target_level, threshold_hours};
use crate::assignment::{AssignmentSelector, SelectionOutcome};
use crate::clock::SharedClock;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::lifecycle::LifecycleMachine;
use crate::ports::Notifier;
use crate::state::{Concern, EscalationLevel, SharedRepository, StoreError};
use crate::workload::WorkloadTracker;

/// Why the sweep left a concern alone this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    /// Escalated within the cooldown window.
    EscalationCooldown { hours_since_escalated: f64 },
    /// Reminded within the cooldown window.
    ReminderCooldown { hours_since_reminder: f64 },
    /// No eligible handler at the target level.
    NoCandidate { level: EscalationLevel },
    /// Isolated per-concern failure; retried next cycle.
    Failed { message: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EscalationCooldown {
                hours_since_escalated,
            } => write!(f, "escalated {hours_since_escalated:.1}h ago, cooldown active"),
            Self::ReminderCooldown {
                hours_since_reminder,
            } => write!(f, "reminded {hours_since_reminder:.1}h ago, cooldown active"),
            Self::NoCandidate { level } => write!(f, "no eligible handler at {level}"),
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// A concern escalated by this sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEscalation {
    pub concern_id: String,
    pub reference: String,
    pub level: EscalationLevel,
    pub handler_id: String,
    pub elapsed_hours: f64,
}

/// A reminder issued by this sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReminder {
    pub concern_id: String,
    pub reference: String,
    pub handler_id: String,
    pub elapsed_hours: f64,
}

/// A concern the sweep considered but left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSkip {
    pub concern_id: String,
    pub reference: String,
    pub reason: SkipReason,
}

/// Result of one sweep cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Open concerns examined.
    pub scanned: usize,
    pub escalated: Vec<SweepEscalation>,
    pub reminded: Vec<SweepReminder>,
    pub skipped: Vec<SweepSkip>,
}

impl SweepOutcome {
    /// Compact form for logging.
    pub fn summary(&self) -> String {
        format!(
            "scanned={} escalated={} reminded={} skipped={}",
            self.scanned,
            self.escalated.len(),
            self.reminded.len(),
            self.skipped.len(),
        )
    }
}

enum SweepAction {
    Escalated(SweepEscalation),
    Reminded(SweepReminder),
    Skipped(SkipReason),
    NotDue,
}

/// The time-based escalation sweep.
pub struct EscalationSweeper {
    repo: SharedRepository,
    tracker: Arc<WorkloadTracker>,
    selector: AssignmentSelector,
    machine: Arc<LifecycleMachine>,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    config: OrchestratorConfig,
}

impl EscalationSweeper {
    pub fn new(
        repo: SharedRepository,
        tracker: Arc<WorkloadTracker>,
        machine: Arc<LifecycleMachine>,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
        config: OrchestratorConfig,
    ) -> Self {
        let selector = AssignmentSelector::new(config.capacity_cap);
        Self {
            repo,
            tracker,
            selector,
            machine,
            notifier,
            clock,
            config,
        }
    }

    /// Run one sweep cycle over every open concern.
    pub fn run(&self) -> OrchestratorResult<SweepOutcome> {
        let now = self.clock.now();
        let concerns = self.repo.list_concerns()?;
        let mut outcome = SweepOutcome::default();

        for concern in concerns.into_iter().filter(|c| c.is_open()) {
            outcome.scanned += 1;
            match self.sweep_one(&concern, now) {
                Ok(SweepAction::Escalated(record)) => outcome.escalated.push(record),
                Ok(SweepAction::Reminded(record)) => outcome.reminded.push(record),
                Ok(SweepAction::Skipped(reason)) => {
                    debug!(concern = %concern.reference, %reason, "sweep skip");
                    outcome.skipped.push(SweepSkip {
                        concern_id: concern.id.clone(),
                        reference: concern.reference.clone(),
                        reason,
                    });
                }
                Ok(SweepAction::NotDue) => {}
                Err(err) => {
                    // One bad concern must not abort the batch; the cooldown
                    // was never set, so the next cycle retries it.
                    warn!(concern = %concern.reference, error = %err, "sweep failure isolated");
                    outcome.skipped.push(SweepSkip {
                        concern_id: concern.id.clone(),
                        reference: concern.reference.clone(),
                        reason: SkipReason::Failed {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }

        info!("escalation sweep finished: {}", outcome.summary());
        Ok(outcome)
    }

    fn sweep_one(&self, concern: &Concern, now: DateTime<Utc>) -> OrchestratorResult<SweepAction> {
        let elapsed_hours =
            (now - concern.activity_started_at()).num_minutes().max(0) as f64 / 60.0;
        let ladder = self.config.ladder(concern.priority);

        if let Some(by_elapsed) = target_level(elapsed_hours, ladder) {
            if let Some(escalated_at) = concern.escalated_at {
                let since = now - escalated_at;
                if since < Duration::hours(self.config.escalation_cooldown_hours) {
                    return Ok(SweepAction::Skipped(SkipReason::EscalationCooldown {
                        hours_since_escalated: since.num_minutes().max(0) as f64 / 60.0,
                    }));
                }
            }

            // A concern already raised to some level never drops back; when
            // elapsed time maps to the same level again the sweep still
            // moves the concern to a different handler in that pool.
            let level = by_elapsed.max(concern.escalation_level);

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
                    return Ok(SweepAction::Skipped(SkipReason::NoCandidate { level }));
                }
            };

            let anchor = if concern.assigned_at.is_some() {
                "assignment"
            } else {
                "creation"
            };
            let reason = format!(
                "{elapsed_hours:.1}h since {anchor} exceeded the {}h threshold for {} priority",
                threshold_hours(level, ladder),
                concern.priority,
            );

            let escalated =
                self.machine
                    .commit_escalation(&concern.id, &target, level, &reason, "sweep")?;

            return Ok(SweepAction::Escalated(SweepEscalation {
                concern_id: escalated.id,
                reference: escalated.reference,
                level,
                handler_id: target.handler.id.clone(),
                elapsed_hours,
            }));
        }

        if reminder_due(elapsed_hours, ladder) {
            // Reminders go to the current handler; an unassigned concern has
            // nobody to nudge and waits for the escalation branch instead.
            let Some(handler_id) = concern.assigned_to.clone() else {
                return Ok(SweepAction::NotDue);
            };

            if let Some(last) = concern.last_reminder_sent {
                let since = now - last;
                if since < Duration::hours(self.config.reminder_cooldown_hours) {
                    return Ok(SweepAction::Skipped(SkipReason::ReminderCooldown {
                        hours_since_reminder: since.num_minutes().max(0) as f64 / 60.0,
                    }));
                }
            }

            let mut updated = concern.clone();
            updated.last_reminder_sent = Some(now);
            match self.repo.update_concern(updated, concern.version) {
                Ok(_) => {}
                // A concurrent sweep got there first; its reminder stands.
                Err(StoreError::VersionConflict { .. }) => {
                    return Ok(SweepAction::Skipped(SkipReason::ReminderCooldown {
                        hours_since_reminder: 0.0,
                    }));
                }
                Err(other) => return Err(other.into()),
            }

            self.notifier.notify(
                &handler_id,
                "Concern reminder",
                &format!(
                    "Concern {} has been waiting {elapsed_hours:.1}h. Please take a look.",
                    concern.reference
                ),
                json!({ "concern_id": concern.id, "reference": concern.reference }),
            );

            return Ok(SweepAction::Reminded(SweepReminder {
                concern_id: concern.id.clone(),
                reference: concern.reference.clone(),
                handler_id,
                elapsed_hours,
            }));
        }

        Ok(SweepAction::NotDue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ports::{NoopAudit, NoopChat, RecordingNotifier};
    use crate::state::{
        Concern, ConcernCategory, ConcernDraft, Handler, MemoryStore, Priority, Role,
    };
    use chrono::TimeZone;

    struct Fixture {
        repo: SharedRepository,
        sweeper: EscalationSweeper,
        clock: Arc<FixedClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let repo: SharedRepository = MemoryStore::new().shared();
        let clock = Arc::new(FixedClock::at(start()));
        let notifier = RecordingNotifier::shared();
        let config = OrchestratorConfig::default();

        let machine = Arc::new(LifecycleMachine::new(
            repo.clone(),
            notifier.clone(),
            Arc::new(NoopChat),
            Arc::new(NoopAudit),
            clock.clone(),
            config.clone(),
        ));
        let tracker = Arc::new(WorkloadTracker::new(repo.clone()));
        let sweeper = EscalationSweeper::new(
            repo.clone(),
            tracker,
            machine,
            notifier.clone(),
            clock.clone(),
            config,
        );

        Fixture {
            repo,
            sweeper,
            clock,
            notifier,
        }
    }

    fn seed_staff(f: &Fixture) {
        f.repo
            .upsert_handler(Handler::new("h1", "Pat", "facilities", Role::Staff))
            .unwrap();
        f.repo
            .upsert_handler(Handler::new("h2", "Sam", "facilities", Role::Staff))
            .unwrap();
    }

    fn seed_concern(f: &Fixture, priority: Priority, assigned: Option<&str>) -> String {
        let mut concern = Concern::new(
            ConcernDraft {
                subject: "s".into(),
                description: "d".into(),
                student_id: "student-1".into(),
                department_id: "facilities".into(),
                facility: None,
                attachments: vec![],
            },
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            priority,
            start(),
        );
        if let Some(handler) = assigned {
            concern.record_assignment(handler.into(), start());
        }
        let id = concern.id.clone();
        f.repo.insert_concern(concern).unwrap();
        id
    }

    #[test]
    fn test_overdue_urgent_escalates_to_staff() {
        let f = fixture();
        seed_staff(&f);
        let id = seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(7));
        let outcome = f.sweeper.run().unwrap();

        assert_eq!(outcome.escalated.len(), 1);
        assert_eq!(outcome.escalated[0].level, EscalationLevel::Staff);
        assert_eq!(outcome.escalated[0].handler_id, "h2");

        let concern = f.repo.get_concern(&id).unwrap();
        assert_eq!(concern.assigned_to.as_deref(), Some("h2"));
        assert_eq!(concern.escalation_level, EscalationLevel::Staff);
        assert!(concern.escalated_at.is_some());
        assert_eq!(
            concern.status,
            crate::state::ConcernStatus::InProgress,
            "escalation forces in_progress"
        );
    }

    #[test]
    fn test_second_sweep_within_cooldown_skips() {
        let f = fixture();
        seed_staff(&f);
        seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(7));
        let first = f.sweeper.run().unwrap();
        assert_eq!(first.escalated.len(), 1);

        // 6h after the reassignment the escalate threshold is crossed
        // again, but the 24h cooldown holds the concern where it is.
        f.clock.advance(Duration::hours(6));
        let second = f.sweeper.run().unwrap();
        assert!(second.escalated.is_empty());
        assert_eq!(second.skipped.len(), 1);
        assert!(matches!(
            second.skipped[0].reason,
            SkipReason::EscalationCooldown { .. }
        ));
    }

    #[test]
    fn test_after_cooldown_escalates_to_next_level() {
        let f = fixture();
        seed_staff(&f);
        f.repo
            .upsert_handler(Handler::new("a1", "Ada", "central", Role::Admin))
            .unwrap();
        let id = seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(7));
        f.sweeper.run().unwrap();

        // 25h after the first escalation: cooldown over, elapsed now maps
        // past the 24h admin threshold.
        f.clock.advance(Duration::hours(25));
        let outcome = f.sweeper.run().unwrap();

        assert_eq!(outcome.escalated.len(), 1);
        assert_eq!(outcome.escalated[0].level, EscalationLevel::Admin);

        let concern = f.repo.get_concern(&id).unwrap();
        assert_eq!(concern.escalation_level, EscalationLevel::Admin);
        assert_eq!(concern.assigned_to.as_deref(), Some("a1"));
    }

    #[test]
    fn test_unassigned_concern_measures_from_creation() {
        let f = fixture();
        seed_staff(&f);
        let id = seed_concern(&f, Priority::Urgent, None);

        f.clock.advance(Duration::hours(6));
        let outcome = f.sweeper.run().unwrap();

        assert_eq!(outcome.escalated.len(), 1);
        let concern = f.repo.get_concern(&id).unwrap();
        assert!(concern.assigned_to.is_some());
        assert!(concern
            .escalation_reason
            .as_deref()
            .unwrap()
            .contains("creation"));
    }

    #[test]
    fn test_reminder_before_escalation_threshold() {
        let f = fixture();
        seed_staff(&f);
        let id = seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(3));
        let outcome = f.sweeper.run().unwrap();

        assert!(outcome.escalated.is_empty());
        assert_eq!(outcome.reminded.len(), 1);
        assert_eq!(outcome.reminded[0].handler_id, "h1");

        let concern = f.repo.get_concern(&id).unwrap();
        assert!(concern.last_reminder_sent.is_some());
        assert_eq!(concern.assigned_to.as_deref(), Some("h1"), "no reassignment");

        let sent = f.notifier.sent();
        assert!(sent.iter().any(|n| n.user == "h1" && n.title == "Concern reminder"));
    }

    #[test]
    fn test_reminder_cooldown() {
        let f = fixture();
        seed_staff(&f);
        seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(3));
        f.sweeper.run().unwrap();

        f.clock.advance(Duration::hours(1));
        let outcome = f.sweeper.run().unwrap();
        assert!(outcome.reminded.is_empty());
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::ReminderCooldown { .. }
        ));
    }

    #[test]
    fn test_no_candidate_is_reported_not_fatal() {
        let f = fixture();
        // Only the current assignee exists; no peer to escalate to.
        f.repo
            .upsert_handler(Handler::new("h1", "Pat", "facilities", Role::Staff))
            .unwrap();
        seed_concern(&f, Priority::Urgent, Some("h1"));

        f.clock.advance(Duration::hours(7));
        let outcome = f.sweeper.run().unwrap();

        assert!(outcome.escalated.is_empty());
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::NoCandidate {
                level: EscalationLevel::Staff
            }
        ));
    }

    #[test]
    fn test_terminal_and_archived_concerns_ignored() {
        let f = fixture();
        seed_staff(&f);
        let id = seed_concern(&f, Priority::Urgent, Some("h1"));

        // Resolve and confirm, which archives.
        let mut concern = f.repo.get_concern(&id).unwrap();
        concern.record_status(crate::state::ConcernStatus::StaffResolved, start());
        concern.record_confirmation(start());
        let version = f.repo.get_concern(&id).unwrap().version;
        f.repo.update_concern(concern, version).unwrap();

        f.clock.advance(Duration::hours(100));
        let outcome = f.sweeper.run().unwrap();
        assert_eq!(outcome.scanned, 0);
        assert!(outcome.escalated.is_empty());
    }

    #[test]
    fn test_high_priority_uses_its_own_ladder() {
        let f = fixture();
        seed_staff(&f);
        seed_concern(&f, Priority::High, Some("h1"));

        // 7h is past urgent's escalate threshold but within high's 24h.
        f.clock.advance(Duration::hours(7));
        let outcome = f.sweeper.run().unwrap();
        assert!(outcome.escalated.is_empty());
        assert_eq!(outcome.reminded.len(), 1, "6h reminder threshold crossed");
    }
}
