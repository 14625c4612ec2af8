//! The solver core: weight inference, graph and hierarchy evaluators,
//! conflict policy, scope split, and the top-level orchestrator.

pub mod aggregation;
pub mod conflicts;
pub mod flow_inference;
pub mod graph_eval;
pub mod orchestrator;
pub mod scope;

pub use conflicts::ConflictPolicy;
pub use orchestrator::solve;

use crate::results::{FloatComputedTuple, ValueMap};

/// Output of one evaluator pass over one computation source.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutput {
    /// Nodes newly resolved by this pass, without conflict.
    pub computed: ValueMap,
    /// Authoritative values of conflicting nodes.
    pub taken: ValueMap,
    /// Overridden values of conflicting nodes.
    pub dismissed: ValueMap,
}

impl EvaluationOutput {
    pub fn is_empty(&self) -> bool {
        self.computed.is_empty() && self.taken.is_empty() && self.dismissed.is_empty()
    }

    pub(crate) fn record_conflict(
        &mut self,
        key: &str,
        taken: FloatComputedTuple,
        dismissed: FloatComputedTuple,
    ) {
        self.taken.insert(key.to_string(), taken);
        self.dismissed.insert(key.to_string(), dismissed);
    }
}
