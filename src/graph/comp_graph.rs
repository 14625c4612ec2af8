//! The bidirectional computation graph.
//!
//! One petgraph edge record carries both propagation directions: `direct`
//! follows the edge arrow, `reverse` runs against it. This keeps the
//! invariant that every direct edge has a complementary reverse edge by
//! construction. Nodes carry per-direction split flags: a split node is
//! determined by any single adequately-weighted neighbor instead of
//! requiring all of them.

use crate::error::SolvingError;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction as PetDirection;
use std::collections::HashMap;

/// Propagation direction over the shared edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Direct,
    Reverse,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Direct => Direction::Reverse,
            Direction::Reverse => Direction::Direct,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Direct => "direct",
            Direction::Reverse => "reverse",
        }
    }
}

/// Weights of one edge record, per direction. `declared` distinguishes an
/// explicitly modeled weight from one filled in by inference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeWeights {
    pub direct: Option<f64>,
    pub reverse: Option<f64>,
    pub direct_declared: bool,
    pub reverse_declared: bool,
}

impl EdgeWeights {
    pub fn direct_of(weight: Option<f64>) -> Self {
        Self {
            direct: weight,
            reverse: None,
            direct_declared: true,
            reverse_declared: false,
        }
    }

    pub fn weight(&self, dir: Direction) -> Option<f64> {
        match dir {
            Direction::Direct => self.direct,
            Direction::Reverse => self.reverse,
        }
    }

    pub fn set_weight(&mut self, dir: Direction, w: f64) {
        match dir {
            Direction::Direct => self.direct = Some(w),
            Direction::Reverse => self.reverse = Some(w),
        }
    }

    pub fn declared(&self, dir: Direction) -> bool {
        match dir {
            Direction::Direct => self.direct_declared,
            Direction::Reverse => self.reverse_declared,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CompNode {
    key: String,
    split_direct: bool,
    split_reverse: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ComputationGraph {
    graph: DiGraph<CompNode, EdgeWeights>,
    index: HashMap<String, NodeIndex>,
}

impl ComputationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_node(&mut self, key: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(key) {
            return idx;
        }
        let idx = self.graph.add_node(CompNode {
            key: key.to_string(),
            split_direct: false,
            split_reverse: false,
        });
        self.index.insert(key.to_string(), idx);
        idx
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Node keys in insertion order; builders insert deterministically, so
    /// every downstream scan is reproducible.
    pub fn node_keys(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .map(|i| self.graph[i].key.clone())
            .collect()
    }

    /// Adds (or completes) the edge record between `source` and `target`.
    /// Declaring the same direction twice for one pair is a structural error.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        weights: EdgeWeights,
    ) -> Result<(), SolvingError> {
        let s = self.ensure_node(source);
        let t = self.ensure_node(target);
        if let Some(edge) = self.graph.find_edge(s, t) {
            let existing = &mut self.graph[edge];
            for dir in [Direction::Direct, Direction::Reverse] {
                if weights.declared(dir) {
                    if existing.declared(dir) {
                        return Err(SolvingError::DuplicateEdge {
                            from: source.to_string(),
                            to: target.to_string(),
                        });
                    }
                    if let Some(w) = weights.weight(dir) {
                        existing.set_weight(dir, w);
                    }
                    match dir {
                        Direction::Direct => existing.direct_declared = true,
                        Direction::Reverse => existing.reverse_declared = true,
                    }
                }
            }
        } else {
            self.graph.add_edge(s, t, weights);
        }
        Ok(())
    }

    pub fn split(&self, key: &str, dir: Direction) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        match dir {
            Direction::Direct => self.graph[idx].split_direct,
            Direction::Reverse => self.graph[idx].split_reverse,
        }
    }

    pub fn set_split(&mut self, key: &str, dir: Direction) {
        let idx = self.ensure_node(key);
        match dir {
            Direction::Direct => self.graph[idx].split_direct = true,
            Direction::Reverse => self.graph[idx].split_reverse = true,
        }
    }

    /// Neighbors feeding `key` through the given propagation direction,
    /// with the corresponding edge weight:
    /// direct predecessors are edge sources, reverse predecessors are edge
    /// targets (their values flow back against the arrow).
    pub fn predecessors(&self, key: &str, dir: Direction) -> Vec<(String, Option<f64>)> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let pet_dir = match dir {
            Direction::Direct => PetDirection::Incoming,
            Direction::Reverse => PetDirection::Outgoing,
        };
        let mut out: Vec<(String, Option<f64>)> = self
            .graph
            .edges_directed(idx, pet_dir)
            .map(|e| {
                let other = match dir {
                    Direction::Direct => e.source(),
                    Direction::Reverse => e.target(),
                };
                (self.graph[other].key.clone(), e.weight().weight(dir))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Edge indices leaving `key` in the given direction (direct: outgoing
    /// arrows, reverse: incoming arrows traversed backwards).
    pub fn outbound_edges(&self, key: &str, dir: Direction) -> Vec<EdgeIndex> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let pet_dir = match dir {
            Direction::Direct => PetDirection::Outgoing,
            Direction::Reverse => PetDirection::Incoming,
        };
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, pet_dir)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    pub fn edge(&self, idx: EdgeIndex) -> &EdgeWeights {
        &self.graph[idx]
    }

    pub fn edge_mut(&mut self, idx: EdgeIndex) -> &mut EdgeWeights {
        &mut self.graph[idx]
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> (String, String) {
        let (s, t) = self
            .graph
            .edge_endpoints(idx)
            .expect("edge index obtained from this graph");
        (self.graph[s].key.clone(), self.graph[t].key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_record_carries_both_directions() {
        let mut g = ComputationGraph::new();
        g.add_edge("X:Out", "Y:In", EdgeWeights::direct_of(Some(0.5)))
            .unwrap();
        assert_eq!(
            g.predecessors("Y:In", Direction::Direct),
            vec![("X:Out".to_string(), Some(0.5))]
        );
        // Complementary reverse edge exists with no weight yet.
        assert_eq!(
            g.predecessors("X:Out", Direction::Reverse),
            vec![("Y:In".to_string(), None)]
        );
    }

    #[test]
    fn duplicate_declared_direction_is_structural_error() {
        let mut g = ComputationGraph::new();
        g.add_edge("A", "B", EdgeWeights::direct_of(Some(1.0)))
            .unwrap();
        let err = g
            .add_edge("A", "B", EdgeWeights::direct_of(Some(0.3)))
            .unwrap_err();
        assert!(matches!(err, SolvingError::DuplicateEdge { .. }));
    }

    #[test]
    fn reverse_declaration_completes_existing_record() {
        let mut g = ComputationGraph::new();
        g.add_edge("A", "B", EdgeWeights::direct_of(Some(0.4)))
            .unwrap();
        g.add_edge(
            "A",
            "B",
            EdgeWeights {
                direct: None,
                reverse: Some(2.5),
                direct_declared: false,
                reverse_declared: true,
            },
        )
        .unwrap();
        assert_eq!(
            g.predecessors("A", Direction::Reverse),
            vec![("B".to_string(), Some(2.5))]
        );
    }

    #[test]
    fn split_flags_are_per_direction() {
        let mut g = ComputationGraph::new();
        g.ensure_node("A");
        g.set_split("A", Direction::Direct);
        assert!(g.split("A", Direction::Direct));
        assert!(!g.split("A", Direction::Reverse));
    }
}
