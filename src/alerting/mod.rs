//! Severity evaluation and the two consumers of it: alert dispatch and
//! automated interventions.

pub mod dispatcher;
pub mod intervention;
pub mod severity;

pub use dispatcher::{AlertDispatcher, AlertOutcome, AlertRequest};
pub use intervention::{InterventionController, InterventionOutcome};
pub use severity::{Severity, SeverityEvaluator};
