//! Reconciliation engine
//!
//! Folds one batch of observations into the persisted objects of a source:
//! matches by identity, classifies watched-value change, marks unseen objects
//! missing, creates new ones, and selects the events to emit.

mod engine;
mod outcome;


pub use engine::{observe, reconcile, reconcile_in, ReconcileError, ReconcileResult};
pub use outcome::{ReconcileOutcome, StatusCounts};
