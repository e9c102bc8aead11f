//! Collaborator ports consumed by the orchestrator.
//!
//! Notification delivery, chat channels, and audit logging are owned by
//! external systems; the orchestrator only calls these traits. Delivery
//! guarantees belong to the collaborator, so the calls are fire-and-forget.
//! `Noop*` implementations serve as defaults and `Recording*` fakes back
//! the test suites.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::state::Concern;

/// An initial or system-authored chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Handler or approver the message speaks for.
    pub author: String,
    pub body: String,
}

/// Push/email/SMS fan-out.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: &str, title: &str, body: &str, data: Value);
}

/// Per-concern chat channels.
///
/// `open` is idempotent: opening an already-open channel is a no-op, so
/// submission-time auto-assignment and approval may both call it.
pub trait ChatChannels: Send + Sync {
    fn open(&self, concern: &Concern, participants: &[String], opening_message: &ChatMessage);
    fn close(&self, concern_id: &str);
    fn reopen(&self, concern_id: &str);
}

/// Append-only audit trail.
pub trait AuditLog: Send + Sync {
    fn record(&self, actor: &str, action: &str, before: Option<Value>, after: Option<Value>);
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _user: &str, _title: &str, _body: &str, _data: Value) {}
}

/// Chat port that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChat;

impl ChatChannels for NoopChat {
    fn open(&self, _concern: &Concern, _participants: &[String], _opening_message: &ChatMessage) {}
    fn close(&self, _concern_id: &str) {}
    fn reopen(&self, _concern_id: &str) {}
}

/// Audit port that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAudit;

impl AuditLog for NoopAudit {
    fn record(&self, _actor: &str, _action: &str, _before: Option<Value>, _after: Option<Value>) {}
}

/// A delivered notification, captured for assertions.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub user: String,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Notifier fake that records every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn sent(&self) -> MutexGuard<'_, Vec<SentNotification>> {
        match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user: &str, title: &str, body: &str, data: Value) {
        self.sent().push(SentNotification {
            user: user.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
    }
}

/// A chat channel event, captured for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Opened {
        concern_id: String,
        participants: Vec<String>,
        message: ChatMessage,
    },
    Closed {
        concern_id: String,
    },
    Reopened {
        concern_id: String,
    },
}

/// Chat fake that records every event and absorbs duplicate opens.
#[derive(Default)]
pub struct RecordingChat {
    events: Mutex<Vec<ChatEvent>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn events(&self) -> MutexGuard<'_, Vec<ChatEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether a channel is currently open for `concern_id`.
    pub fn is_open(&self, concern_id: &str) -> bool {
        let mut open = false;
        for event in self.events().iter() {
            match event {
                ChatEvent::Opened { concern_id: id, .. }
                | ChatEvent::Reopened { concern_id: id } => {
                    if id == concern_id {
                        open = true;
                    }
                }
                ChatEvent::Closed { concern_id: id } => {
                    if id == concern_id {
                        open = false;
                    }
                }
            }
        }
        open
    }
}

impl ChatChannels for RecordingChat {
    fn open(&self, concern: &Concern, participants: &[String], opening_message: &ChatMessage) {
        if self.is_open(&concern.id) {
            return;
        }
        self.events().push(ChatEvent::Opened {
            concern_id: concern.id.clone(),
            participants: participants.to_vec(),
            message: opening_message.clone(),
        });
    }

    fn close(&self, concern_id: &str) {
        self.events().push(ChatEvent::Closed {
            concern_id: concern_id.to_string(),
        });
    }

    fn reopen(&self, concern_id: &str) {
        self.events().push(ChatEvent::Reopened {
            concern_id: concern_id.to_string(),
        });
    }
}

/// An audit entry, captured for assertions.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Audit fake that records every entry.
#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AuditLog for RecordingAudit {
    fn record(&self, actor: &str, action: &str, before: Option<Value>, after: Option<Value>) {
        self.entries().push(AuditEntry {
            actor: actor.to_string(),
            action: action.to_string(),
            before,
            after,
        });
    }
}
