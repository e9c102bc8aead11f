//! Core entity types for concern orchestration.
//!
//! `Concern` is the aggregate root; handlers and departments are referenced
//! by id, never owned. Every mutating field change goes through the
//! lifecycle machine so timestamps and side effects stay consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for concerns (uuid v4).
pub type ConcernId = String;

/// Unique identifier for handlers (staff, department heads, admins).
pub type HandlerId = String;

/// Unique identifier for departments.
pub type DepartmentId = String;

/// Concern priority, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Lifecycle status of a concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernStatus {
    /// Submitted, awaiting departmental review.
    Pending,
    /// Accepted for handling by the department.
    Approved,
    /// Declined at review; terminal.
    Rejected,
    /// Withdrawn before handling started; terminal.
    Cancelled,
    /// Actively being worked by a handler.
    InProgress,
    /// Handler reports the concern resolved; awaiting the student.
    StaffResolved,
    /// Student accepted the resolution; terminal.
    StudentConfirmed,
    /// Student rejected the resolution; needs human follow-up.
    Disputed,
    /// Administratively closed; terminal.
    Closed,
}

impl ConcernStatus {
    /// Whether this status ends the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Cancelled | Self::StudentConfirmed | Self::Closed
        )
    }

    /// Position in the forward progression, for statuses that sit on it.
    ///
    /// `Disputed` and the terminal statuses are reached through dedicated
    /// transitions and have no rank.
    pub fn forward_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Approved => Some(1),
            Self::InProgress => Some(2),
            Self::StaffResolved => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConcernStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InProgress => write!(f, "in_progress"),
            Self::StaffResolved => write!(f, "staff_resolved"),
            Self::StudentConfirmed => write!(f, "student_confirmed"),
            Self::Disputed => write!(f, "disputed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Authority tier a concern has been escalated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    None,
    Staff,
    DepartmentHead,
    Admin,
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Staff => write!(f, "staff"),
            Self::DepartmentHead => write!(f, "department_head"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Role of an actor or handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    DepartmentHead,
    Admin,
}

impl Role {
    /// Whether this role may be assigned concerns.
    pub fn is_handler(&self) -> bool {
        !matches!(self, Self::Student)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Staff => write!(f, "staff"),
            Self::DepartmentHead => write!(f, "department_head"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Concern category inferred by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernCategory {
    Safety,
    Facilities,
    Academic,
    Technology,
    Financial,
    Wellbeing,
    General,
}

impl std::fmt::Display for ConcernCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safety => write!(f, "safety"),
            Self::Facilities => write!(f, "facilities"),
            Self::Academic => write!(f, "academic"),
            Self::Technology => write!(f, "technology"),
            Self::Financial => write!(f, "financial"),
            Self::Wellbeing => write!(f, "wellbeing"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Overall tone of a concern's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Kind of cross-department assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Normal,
    Emergency,
}

/// Status of a cross-department assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossAssignmentStatus {
    Active,
    Completed,
}

/// Metadata for an uploaded attachment; blob storage is external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// The caller of a mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    /// Department the actor belongs to; `None` for students and admins.
    pub department_id: Option<DepartmentId>,
}

impl Actor {
    pub fn student(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Student,
            department_id: None,
        }
    }

    pub fn staff(id: impl Into<String>, department_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Staff,
            department_id: Some(department_id.into()),
        }
    }

    pub fn department_head(id: impl Into<String>, department_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::DepartmentHead,
            department_id: Some(department_id.into()),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
            department_id: None,
        }
    }

    /// Staff, department head, or admin.
    pub fn is_staff_level(&self) -> bool {
        self.role.is_handler()
    }
}

/// Input for submitting a new concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcernDraft {
    pub subject: String,
    pub description: String,
    pub student_id: String,
    pub department_id: DepartmentId,
    pub facility: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

/// A student-submitted support request tracked through resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concern {
    /// Internal identifier.
    pub id: ConcernId,

    /// Human-readable reference, `CNR<year><month><seq>`.
    pub reference: String,

    pub subject: String,
    pub description: String,
    pub category: ConcernCategory,
    pub priority: Priority,
    pub status: ConcernStatus,

    /// Owning student.
    pub student_id: String,
    /// Target department.
    pub department_id: DepartmentId,
    /// Optional facility the concern is about.
    pub facility: Option<String>,

    /// Current handler, if any.
    pub assigned_to: Option<HandlerId>,
    /// Who approved the concern at review.
    pub approver: Option<HandlerId>,

    pub escalation_level: EscalationLevel,
    pub escalation_reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub dispute_reason: Option<String>,

    /// Last time the current handler was nudged by the sweep.
    pub last_reminder_sent: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,

    /// Logical archival flag; archived concerns leave active workload.
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,

    pub attachments: Vec<AttachmentMeta>,

    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl Concern {
    /// Create a freshly submitted concern in `pending`.
    pub fn new(
        draft: ConcernDraft,
        reference: String,
        category: ConcernCategory,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference,
            subject: draft.subject,
            description: draft.description,
            category,
            priority,
            status: ConcernStatus::Pending,
            student_id: draft.student_id,
            department_id: draft.department_id,
            facility: draft.facility,
            assigned_to: None,
            approver: None,
            escalation_level: EscalationLevel::None,
            escalation_reason: None,
            rejection_reason: None,
            dispute_reason: None,
            last_reminder_sent: None,
            created_at: now,
            approved_at: None,
            rejected_at: None,
            assigned_at: None,
            resolved_at: None,
            confirmed_at: None,
            disputed_at: None,
            closed_at: None,
            escalated_at: None,
            archived: false,
            archived_at: None,
            attachments: draft.attachments,
            version: 0,
        }
    }

    /// Non-terminal and not archived: counts toward workload and sweeps.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal() && !self.archived
    }

    /// The instant escalation math measures from.
    pub fn activity_started_at(&self) -> DateTime<Utc> {
        self.assigned_at.unwrap_or(self.created_at)
    }

    /// Record an assignment to `handler`.
    ///
    /// Moves `approved` to `in_progress`; a still-pending concern keeps its
    /// status until review.
    pub fn record_assignment(&mut self, handler: HandlerId, now: DateTime<Utc>) {
        self.assigned_to = Some(handler);
        self.assigned_at = Some(now);
        if self.status == ConcernStatus::Approved {
            self.status = ConcernStatus::InProgress;
        }
    }

    /// Record departmental approval.
    pub fn record_approval(&mut self, approver: HandlerId, now: DateTime<Utc>) {
        self.status = ConcernStatus::Approved;
        self.approver = Some(approver);
        self.approved_at = Some(now);
    }

    /// Record departmental rejection.
    pub fn record_rejection(&mut self, approver: HandlerId, reason: String, now: DateTime<Utc>) {
        self.status = ConcernStatus::Rejected;
        self.approver = Some(approver);
        self.rejection_reason = Some(reason);
        self.rejected_at = Some(now);
    }

    /// Record a plain status move; timestamps follow the target status.
    pub fn record_status(&mut self, status: ConcernStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            ConcernStatus::StaffResolved => self.resolved_at = Some(now),
            ConcernStatus::Closed | ConcernStatus::Cancelled => self.closed_at = Some(now),
            _ => {}
        }
    }

    /// Record the student accepting the resolution; archives the concern.
    pub fn record_confirmation(&mut self, now: DateTime<Utc>) {
        self.status = ConcernStatus::StudentConfirmed;
        self.confirmed_at = Some(now);
        self.archived = true;
        self.archived_at = Some(now);
    }

    /// Record the student disputing the resolution.
    pub fn record_dispute(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = ConcernStatus::Disputed;
        self.dispute_reason = Some(reason);
        self.disputed_at = Some(now);
    }

    /// Record an escalation: reassignment plus level, reason, and timestamp,
    /// with status forced to `in_progress`.
    pub fn record_escalation(
        &mut self,
        handler: HandlerId,
        level: EscalationLevel,
        reason: String,
        now: DateTime<Utc>,
    ) {
        self.assigned_to = Some(handler);
        self.assigned_at = Some(now);
        self.escalation_level = level;
        self.escalation_reason = Some(reason);
        self.escalated_at = Some(now);
        self.status = ConcernStatus::InProgress;
    }

    /// Compact form for logging.
    pub fn summary(&self) -> String {
        format!(
            "concern={} status={} priority={} dept={} assigned={}",
            self.reference,
            self.status,
            self.priority,
            self.department_id,
            self.assigned_to.as_deref().unwrap_or("-"),
        )
    }
}

/// A staff member, department head, or admin able to handle concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handler {
    pub id: HandlerId,
    pub name: String,
    pub department_id: DepartmentId,
    pub role: Role,
    pub active: bool,
    /// May take concerns from other departments.
    pub cross_department: bool,
}

impl Handler {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        department_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department_id: department_id.into(),
            role,
            active: true,
            cross_department: false,
        }
    }

    /// Mark this handler as cross-department capable.
    pub fn with_cross_department(mut self) -> Self {
        self.cross_department = true;
        self
    }
}

/// A department that owns concerns and staffs handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub head: Option<HandlerId>,
    pub active: bool,
}

impl Department {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            head: None,
            active: true,
        }
    }

    /// Set the department head.
    pub fn with_head(mut self, head: impl Into<String>) -> Self {
        self.head = Some(head.into());
        self
    }
}

/// A concern handled by staff outside its owning department.
///
/// Append-only except for the single completion mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossDepartmentAssignment {
    pub id: String,
    pub concern_id: ConcernId,
    /// Department that needed outside help.
    pub requesting_department: DepartmentId,
    pub handler_id: HandlerId,
    /// The handler's home department.
    pub handler_department: DepartmentId,
    pub kind: AssignmentKind,
    pub estimated_hours: i64,
    pub actual_hours: Option<i64>,
    pub status: CrossAssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrossDepartmentAssignment {
    pub fn new(
        concern_id: ConcernId,
        requesting_department: DepartmentId,
        handler_id: HandlerId,
        handler_department: DepartmentId,
        kind: AssignmentKind,
        estimated_hours: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            concern_id,
            requesting_department,
            handler_id,
            handler_department,
            kind,
            estimated_hours,
            actual_hours: None,
            status: CrossAssignmentStatus::Active,
            created_at: now,
            completed_at: None,
        }
    }

    /// Mark completed, deriving the actual duration from `created_at`.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = CrossAssignmentStatus::Completed;
        self.completed_at = Some(now);
        self.actual_hours = Some((now - self.created_at).num_hours().max(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn draft() -> ConcernDraft {
        ConcernDraft {
            subject: "Broken heater".into(),
            description: "The heater in room 12 is broken".into(),
            student_id: "student-1".into(),
            department_id: "facilities".into(),
            facility: Some("dorm-a".into()),
            attachments: vec![],
        }
    }

    #[test]
    fn test_new_concern_is_pending_and_open() {
        let c = Concern::new(
            draft(),
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            Priority::Medium,
            now(),
        );
        assert_eq!(c.status, ConcernStatus::Pending);
        assert!(c.is_open());
        assert!(c.assigned_to.is_none());
        assert_eq!(c.version, 0);
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            ConcernStatus::Rejected,
            ConcernStatus::Cancelled,
            ConcernStatus::StudentConfirmed,
            ConcernStatus::Closed,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        assert!(!ConcernStatus::Disputed.is_terminal());
        assert!(!ConcernStatus::StaffResolved.is_terminal());
    }

    #[test]
    fn test_assignment_promotes_approved_only() {
        let mut c = Concern::new(
            draft(),
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            Priority::Medium,
            now(),
        );

        c.record_assignment("h1".into(), now());
        assert_eq!(c.status, ConcernStatus::Pending, "pending stays pending");
        assert_eq!(c.assigned_at, Some(now()));

        c.record_approval("head-1".into(), now());
        assert_eq!(
            c.status,
            ConcernStatus::Approved,
            "approval does not skip ahead even when a handler is already assigned"
        );

        let mut c2 = Concern::new(
            draft(),
            "CNR2024050002".into(),
            ConcernCategory::Facilities,
            Priority::Medium,
            now(),
        );
        c2.record_approval("head-1".into(), now());
        c2.record_assignment("h1".into(), now());
        assert_eq!(
            c2.status,
            ConcernStatus::InProgress,
            "assignment after approval starts work"
        );
    }

    #[test]
    fn test_confirmation_archives() {
        let mut c = Concern::new(
            draft(),
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            Priority::Medium,
            now(),
        );
        c.record_status(ConcernStatus::StaffResolved, now());
        assert_eq!(c.resolved_at, Some(now()));

        c.record_confirmation(now());
        assert_eq!(c.status, ConcernStatus::StudentConfirmed);
        assert!(c.archived);
        assert!(!c.is_open());
    }

    #[test]
    fn test_escalation_forces_in_progress() {
        let mut c = Concern::new(
            draft(),
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            Priority::Urgent,
            now(),
        );
        c.record_assignment("h1".into(), now());

        c.record_escalation(
            "h2".into(),
            EscalationLevel::Staff,
            "7.0h since assignment".into(),
            now(),
        );
        assert_eq!(c.status, ConcernStatus::InProgress);
        assert_eq!(c.assigned_to.as_deref(), Some("h2"));
        assert_eq!(c.escalation_level, EscalationLevel::Staff);
        assert!(c.escalated_at.is_some());
    }

    #[test]
    fn test_activity_started_at_falls_back_to_creation() {
        let mut c = Concern::new(
            draft(),
            "CNR2024050001".into(),
            ConcernCategory::Facilities,
            Priority::Medium,
            now(),
        );
        assert_eq!(c.activity_started_at(), c.created_at);

        let later = now() + chrono::Duration::hours(2);
        c.record_assignment("h1".into(), later);
        assert_eq!(c.activity_started_at(), later);
    }

    #[test]
    fn test_escalation_level_ordering() {
        assert!(EscalationLevel::Admin > EscalationLevel::DepartmentHead);
        assert!(EscalationLevel::DepartmentHead > EscalationLevel::Staff);
        assert!(EscalationLevel::Staff > EscalationLevel::None);
    }

    #[test]
    fn test_cross_assignment_completion() {
        let mut x = CrossDepartmentAssignment::new(
            "c1".into(),
            "facilities".into(),
            "h9".into(),
            "it-services".into(),
            AssignmentKind::Emergency,
            2,
            now(),
        );
        assert_eq!(x.status, CrossAssignmentStatus::Active);

        x.complete(now() + chrono::Duration::hours(3));
        assert_eq!(x.status, CrossAssignmentStatus::Completed);
        assert_eq!(x.actual_hours, Some(3));
    }

    #[test]
    fn test_priority_serialization() {
        let json = serde_json::to_string(&Priority::Urgent).unwrap();
        assert_eq!(json, "\"urgent\"");
        let restored: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(restored, Priority::High);
    }
}
