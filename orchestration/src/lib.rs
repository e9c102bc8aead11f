//! Concern Assignment & Escalation Orchestrator
//!
//! The decision core of the campus concern desk:
//! - keyword triage of free text into priority, category, and sentiment
//! - handler selection under workload and cross-department capacity limits
//! - the concern lifecycle state machine with centralized capability checks
//! - a time-based, idempotent escalation sweep with per-priority ladders
//! - cross-department load balancing and emergency reassignment
//!
//! Storage, notification delivery, chat, and audit logging are external
//! collaborators consumed through the ports in [`ports`] and
//! [`state::store`]; an in-memory store backs tests and embedders without
//! a database.
//!
//! # Usage
//!
//! ```
//! use orchestration::clock::SystemClock;
//! use orchestration::config::OrchestratorConfig;
//! use orchestration::orchestrator::ConcernOrchestrator;
//! use orchestration::ports::{NoopAudit, NoopChat, NoopNotifier};
//! use orchestration::state::{ConcernDraft, Department, Handler, MemoryStore, Role};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), orchestration::error::OrchestratorError> {
//! let repo = MemoryStore::new().shared();
//! repo.upsert_department(Department::new("facilities", "Facilities"))?;
//! repo.upsert_handler(Handler::new("h1", "Pat", "facilities", Role::Staff))?;
//!
//! let orchestrator = ConcernOrchestrator::new(
//!     repo,
//!     Arc::new(NoopNotifier),
//!     Arc::new(NoopChat),
//!     Arc::new(NoopAudit),
//!     Arc::new(SystemClock),
//!     OrchestratorConfig::default(),
//! );
//!
//! let outcome = orchestrator.submit(ConcernDraft {
//!     subject: "Broken heater".into(),
//!     description: "No heat in room 12 since yesterday".into(),
//!     student_id: "student-1".into(),
//!     department_id: "facilities".into(),
//!     facility: None,
//!     attachments: vec![],
//! })?;
//! assert!(outcome.assignment.is_assigned());
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod balancer;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod lifecycle;
pub mod orchestrator;
pub mod ports;
pub mod state;
pub mod telemetry;
pub mod triage;
pub mod workload;

// Re-export the key public types
pub use assignment::{AssignmentSelector, SelectedHandler, SelectionOutcome, SelectionPool};
pub use balancer::{
    CrossDepartmentBalancer, DepartmentLoad, EmergencyActivation, LoadBand, RebalanceProposal,
};
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{LadderThresholds, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use escalation::{
    EscalationSweeper, SkipReason, SweepOutcome, SweepRunner, SweepRunnerHandle,
};
pub use lifecycle::{CapabilityCheck, LifecycleMachine};
pub use orchestrator::{ConcernOrchestrator, SubmitOutcome};
pub use ports::{
    AuditLog, ChatChannels, ChatMessage, Notifier, RecordingAudit, RecordingChat,
    RecordingNotifier,
};
pub use state::{
    Actor, AssignmentKind, AttachmentMeta, Concern, ConcernCategory, ConcernDraft,
    ConcernRepository, ConcernStatus, CrossDepartmentAssignment, Department, EscalationLevel,
    Handler, MemoryStore, Priority, ReferenceGenerator, Role, Sentiment, SharedRepository,
    StoreError,
};
pub use triage::{PriorityClassifier, TriageAnalysis};
pub use workload::{CandidateSnapshot, WorkloadTracker};
