//! Threshold math for the escalation ladder.
//!
//! Elapsed time is compared against a priority-specific ladder; when several
//! thresholds have been crossed at once (for example after a long gap
//! between sweeps) the highest crossed threshold wins.

use crate::config::LadderThresholds;
use crate::state::EscalationLevel;

/// The escalation level a concern has earned by elapsed time, if any.
pub fn target_level(elapsed_hours: f64, thresholds: &LadderThresholds) -> Option<EscalationLevel> {
    if elapsed_hours >= thresholds.admin_hours as f64 {
        Some(EscalationLevel::Admin)
    } else if elapsed_hours >= thresholds.department_head_hours as f64 {
        Some(EscalationLevel::DepartmentHead)
    } else if elapsed_hours >= thresholds.escalate_hours as f64 {
        Some(EscalationLevel::Staff)
    } else {
        None
    }
}

/// Whether elapsed time has crossed the reminder threshold.
pub fn reminder_due(elapsed_hours: f64, thresholds: &LadderThresholds) -> bool {
    elapsed_hours >= thresholds.reminder_hours as f64
}

/// The ladder threshold, in hours, that corresponds to a level.
pub fn threshold_hours(level: EscalationLevel, thresholds: &LadderThresholds) -> i64 {
    match level {
        EscalationLevel::Admin => thresholds.admin_hours,
        EscalationLevel::DepartmentHead => thresholds.department_head_hours,
        EscalationLevel::Staff | EscalationLevel::None => thresholds.escalate_hours,
    }
}
