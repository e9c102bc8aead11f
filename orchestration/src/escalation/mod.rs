//! Time-based escalation: ladder math, the idempotent sweep, and the
//! periodic tokio driver.
//!
//! # Escalation ladder
//!
//! ```text
//! urgent:   remind 2h   escalate 6h    dept head 12h   admin 24h
//! high:     remind 6h   escalate 24h   dept head 48h   admin 72h
//! default:  remind 24h  escalate 72h   dept head 120h  admin 168h
//! ```
//!
//! Elapsed time counts from assignment, or from creation when a concern was
//! never assigned. The highest threshold crossed wins, so a rarely-run
//! sweep can raise a concern straight to admin. Cooldowns (24h escalation,
//! 12h reminder) make re-running the sweep safe.

pub mod ladder;
pub mod runner;
pub mod sweeper;

pub use ladder::{reminder_due, target_level};
pub use runner::{SweepRunner, SweepRunnerHandle};
pub use sweeper::{
    EscalationSweeper, SkipReason, SweepEscalation, SweepOutcome, SweepReminder, SweepSkip,
};
