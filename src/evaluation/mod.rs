//! Expression evaluation and scenario parameter resolution.

pub mod expression;
pub mod params;

pub use expression::{evaluate, EvalOutcome, Expression};
pub use params::{evaluate_parameters_for_scenario, EvaluatedParams};

/// Three-valued outcome of resolving a node during a graph or hierarchy walk.
///
/// `NotApplicable` marks a slot that cannot be resolved through the current
/// path at all (e.g. the node is already on the visiting stack), as opposed
/// to `NotAvailable`, where the inputs simply are not known yet and a later
/// fixpoint iteration may succeed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved(f64),
    NotAvailable,
    NotApplicable,
}

impl Resolution {
    pub fn value(self) -> Option<f64> {
        match self {
            Resolution::Resolved(v) => Some(v),
            _ => None,
        }
    }
}
