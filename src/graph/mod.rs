//! Graph structures of the solver: node identity, relation graphs, the
//! bidirectional computation graph, and aggregation hierarchies.

pub mod comp_graph;
pub mod hierarchy;
pub mod node;
pub mod relations;

pub use comp_graph::{ComputationGraph, EdgeWeights};
pub use hierarchy::{Hierarchy, ResolvedHierarchy};
pub use node::{InterfaceNode, NodeTable};
pub use relations::{build_relation_graphs, RelationGraph, RelationGraphs};
