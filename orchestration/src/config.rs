//! Orchestrator configuration.
//!
//! Every tunable lives here with a default matching production behavior;
//! deployments override selectively via a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::Priority;

/// Escalation ladder for one priority class, in hours since assignment
/// (or creation when never assigned).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LadderThresholds {
    /// Nudge the current handler.
    pub reminder_hours: i64,
    /// Reassign to a different staff member.
    pub escalate_hours: i64,
    /// Raise to the department head pool.
    pub department_head_hours: i64,
    /// Raise to the admin pool.
    pub admin_hours: i64,
}

/// Configuration for the whole orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum open concerns per handler.
    pub capacity_cap: usize,
    /// A concern escalated within this window is not escalated again.
    pub escalation_cooldown_hours: i64,
    /// A handler reminded within this window is not reminded again.
    pub reminder_cooldown_hours: i64,
    /// Fixed duration estimate for emergency cross-department assignments.
    pub emergency_estimate_hours: i64,
    /// Duration estimate for proposed (non-emergency) cross-department work.
    pub rebalance_estimate_hours: i64,
    /// Attempts per read-modify-write before surfacing a version conflict.
    pub cas_retry_limit: u32,
    /// Minimum length for rejection and dispute reasons.
    pub min_reason_len: usize,
    /// Open-concerns-per-active-staff ratio above which a department is
    /// flagged overloaded.
    pub high_load_ratio: f64,
    /// Ratio below which a department is flagged as having spare capacity.
    pub low_load_ratio: f64,
    /// Ladder for `urgent` concerns.
    pub urgent: LadderThresholds,
    /// Ladder for `high` concerns.
    pub high: LadderThresholds,
    /// Ladder for everything else.
    pub standard: LadderThresholds,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capacity_cap: 10,
            escalation_cooldown_hours: 24,
            reminder_cooldown_hours: 12,
            emergency_estimate_hours: 2,
            rebalance_estimate_hours: 4,
            cas_retry_limit: 5,
            min_reason_len: 10,
            high_load_ratio: 5.0,
            low_load_ratio: 1.0,
            urgent: LadderThresholds {
                reminder_hours: 2,
                escalate_hours: 6,
                department_head_hours: 12,
                admin_hours: 24,
            },
            high: LadderThresholds {
                reminder_hours: 6,
                escalate_hours: 24,
                department_head_hours: 48,
                admin_hours: 72,
            },
            standard: LadderThresholds {
                reminder_hours: 24,
                escalate_hours: 72,
                department_head_hours: 120,
                admin_hours: 168,
            },
        }
    }
}

impl OrchestratorConfig {
    /// The escalation ladder for a priority class.
    pub fn ladder(&self, priority: Priority) -> &LadderThresholds {
        match priority {
            Priority::Urgent => &self.urgent,
            Priority::High => &self.high,
            Priority::Medium | Priority::Low => &self.standard,
        }
    }

    /// Parse a configuration from TOML; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> OrchestratorResult<Self> {
        toml::from_str(raw)
            .map_err(|e| OrchestratorError::Validation(format!("invalid config: {e}")))
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OrchestratorError::Validation(format!(
                "cannot read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }
}
