//! Handler selection.

pub mod selector;

pub use selector::{AssignmentSelector, SelectedHandler, SelectionOutcome, SelectionPool};
