//! Fatal error taxonomy of the solver.
//!
//! Everything here aborts solving for the current (scenario, period) pair;
//! recoverable findings travel as [`crate::issues::Issue`] records instead.

use crate::results::ComputationSource;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolvingError {
    /// The same canonical node name was assigned inconsistent type or
    /// orientation across different aggregation paths.
    #[error("inconsistent identity for node '{key}': {detail}")]
    InconsistentNodeIdentity { key: String, detail: String },

    #[error("cyclic parameter dependency involving: {0}")]
    CyclicParameters(String),

    #[error("parameters could not be resolved after exhaustive iteration: {0}")]
    UnresolvedParameters(String),

    /// Multiple un-overridden observations for the same node and period,
    /// with no observer priority order able to disambiguate them.
    #[error("ambiguous observations for '{key}' at period '{period}'")]
    AmbiguousObservations { key: String, period: String },

    #[error("invalid solver configuration: {0}")]
    InvalidConfiguration(String),

    #[error("cycle detected in hierarchy involving '{0}'")]
    HierarchyCycle(String),

    /// A duplicate explicit edge between the same node pair in the same
    /// direction. Structural, unlike unresolved weights which are warnings.
    /// The fields avoid the name `source`, which thiserror reserves for
    /// error chaining.
    #[error("duplicate declared edge '{from}' -> '{to}'")]
    DuplicateEdge { from: String, to: String },

    /// Two conflicting values claim the identical computation source.
    /// This is a programming invariant violation, not a business conflict.
    #[error("two values for '{key}' claim the same computation source {claimed:?}")]
    DuplicateSource {
        key: String,
        claimed: ComputationSource,
    },

    #[error("division by zero while evaluating '{0}'")]
    DivisionByZero(String),

    #[error("iteration cap ({0}) exceeded before reaching fixpoint")]
    IterationCapExceeded(usize),
}
