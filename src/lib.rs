//! Flow and scale computation-graph solver for accounting-style models.
//!
//! A declared model (processors, interfaces, relations, observations,
//! parameters) is compiled into relation graphs and aggregation hierarchies,
//! then solved to fixpoint independently per (scenario, period) pair. The
//! output is a set of result buckets keyed by scenario, period, scope and
//! conflict marker, plus the flat list of findings produced along the way.
//!
//! Parsing of input formats and exporting of results both live outside this
//! crate: it consumes an in-memory [`model::ModelRegistry`] and produces a
//! [`results::SolverResults`].

pub mod config;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod issues;
pub mod model;
pub mod results;
pub mod solver;

pub use config::SolverConfig;
pub use error::SolvingError;
pub use issues::{Issue, Severity};
pub use model::ModelRegistry;
pub use results::{ResultKey, SolverResults};
pub use solver::solve;
