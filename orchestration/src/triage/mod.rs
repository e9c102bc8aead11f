//! Keyword triage: priority, category, and sentiment estimation.

pub mod classifier;
pub mod keywords;

pub use classifier::{PriorityClassifier, TriageAnalysis};
pub use keywords::department_hint;
