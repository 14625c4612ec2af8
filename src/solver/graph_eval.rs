//! Generic fixpoint evaluator for a bidirectional computation graph.
//!
//! Depth-first memoized recursion per node, guarded against cycles: a node
//! currently on the visiting stack resolves as not-applicable instead of
//! recursing forever. Direct computation is attempted first, then reverse;
//! a value that collides with an already-known one becomes a conflict.

use crate::error::SolvingError;
use crate::evaluation::Resolution;
use crate::graph::comp_graph::{ComputationGraph, Direction};
use crate::results::{ComputationSource, FloatComputedTuple, ValueMap};
use crate::solver::conflicts::{values_agree, ConflictPolicy};
use crate::solver::EvaluationOutput;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Computes a value for every node of `graph` reachable from the known
/// values. `prev` holds nodes this source already resolved in earlier
/// fixpoint iterations; they are returned from cache so a re-derivation is
/// never misread as a fresh same-source conflict.
pub fn evaluate_graph(
    graph: &ComputationGraph,
    source: ComputationSource,
    known: &ValueMap,
    prev: &BTreeMap<String, f64>,
    policy: &ConflictPolicy,
) -> Result<EvaluationOutput, SolvingError> {
    let mut walker = Walker {
        graph,
        source,
        known,
        prev,
        policy,
        cache: HashMap::new(),
        visiting: HashSet::new(),
        output: EvaluationOutput::default(),
    };
    for key in graph.node_keys() {
        walker.resolve(&key)?;
    }
    Ok(walker.output)
}

struct Walker<'a> {
    graph: &'a ComputationGraph,
    source: ComputationSource,
    known: &'a ValueMap,
    prev: &'a BTreeMap<String, f64>,
    policy: &'a ConflictPolicy,
    cache: HashMap<String, Resolution>,
    visiting: HashSet<String>,
    output: EvaluationOutput,
}

impl<'a> Walker<'a> {
    fn resolve(&mut self, key: &str) -> Result<Resolution, SolvingError> {
        if let Some(&v) = self.prev.get(key) {
            return Ok(Resolution::Resolved(v));
        }
        if self.visiting.contains(key) {
            return Ok(Resolution::NotApplicable);
        }
        if let Some(&cached) = self.cache.get(key) {
            return Ok(cached);
        }

        self.visiting.insert(key.to_string());
        // Direct computation borrows the reverse-split flag and vice versa:
        // the flag describes how the node's own outbound edges split, which
        // is what back-computation from the other side relies on.
        let direct = self.combine(
            key,
            Direction::Direct,
            self.graph.split(key, Direction::Reverse),
        )?;
        let attempt = if direct.value().is_some() {
            direct
        } else {
            let reverse = self.combine(
                key,
                Direction::Reverse,
                self.graph.split(key, Direction::Direct),
            )?;
            if reverse == Resolution::NotAvailable && direct == Resolution::NotApplicable {
                direct
            } else {
                reverse
            }
        };
        self.visiting.remove(key);
        // An attempt cut short by a visiting ancestor is tentative: any
        // known-map fallback below must stay unmemoized so the top-level
        // visit re-attempts the computation, conflict check included.
        let blocked = attempt == Resolution::NotApplicable;

        let resolution = match attempt.value() {
            Some(value) => match self.known.get(key) {
                Some(existing) if values_agree(value, existing.value) => {
                    Resolution::Resolved(existing.value)
                }
                Some(existing) => {
                    let tuple = FloatComputedTuple::derived(value, key, self.source);
                    let (taken, dismissed) =
                        self.policy.resolve(key, tuple, existing.clone())?;
                    let final_value = taken.value;
                    self.output.record_conflict(key, taken, dismissed);
                    Resolution::Resolved(final_value)
                }
                None => {
                    let tuple = FloatComputedTuple::derived(value, key, self.source);
                    self.output.computed.insert(key.to_string(), tuple);
                    Resolution::Resolved(value)
                }
            },
            None => match self.known.get(key) {
                Some(existing) => Resolution::Resolved(existing.value),
                None => attempt,
            },
        };
        // Only definitive values are memoized: a node unresolved mid-walk
        // may become resolvable once an ancestor settles from the known map.
        if !blocked {
            if let Resolution::Resolved(_) = resolution {
                self.cache.insert(key.to_string(), resolution);
            }
        }
        Ok(resolution)
    }

    /// One computation attempt through `dir`. With `any_one` (split
    /// semantics) a single adequately-weighted predecessor suffices;
    /// otherwise all predecessors must carry a weight and resolve, and the
    /// result is their weighted sum.
    fn combine(
        &mut self,
        key: &str,
        dir: Direction,
        any_one: bool,
    ) -> Result<Resolution, SolvingError> {
        let preds = self.graph.predecessors(key, dir);
        if preds.is_empty() {
            return Ok(Resolution::NotAvailable);
        }

        if any_one {
            let mut any_visiting = false;
            for (pred, weight) in &preds {
                let Some(w) = weight else { continue };
                match self.resolve(pred)? {
                    Resolution::Resolved(v) => return Ok(Resolution::Resolved(w * v)),
                    Resolution::NotApplicable => any_visiting = true,
                    Resolution::NotAvailable => {}
                }
            }
            return Ok(if any_visiting {
                Resolution::NotApplicable
            } else {
                Resolution::NotAvailable
            });
        }

        let mut contributions: SmallVec<[(f64, f64); 4]> = SmallVec::new();
        for (pred, weight) in &preds {
            // A missing weight aborts the whole non-split sum.
            let Some(w) = weight else {
                return Ok(Resolution::NotAvailable);
            };
            match self.resolve(pred)? {
                Resolution::Resolved(v) => contributions.push((v, *w)),
                // NotApplicable marks an attempt blocked by a visiting
                // ancestor, which must not be memoized upstream.
                other => return Ok(other),
            }
        }
        Ok(Resolution::Resolved(
            contributions.iter().map(|(v, w)| v * w).sum(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::graph::comp_graph::EdgeWeights;
    use crate::results::Computed;
    use crate::solver::flow_inference::infer_weights;

    fn policy() -> ConflictPolicy {
        ConflictPolicy::from_config(&SolverConfig::default())
    }

    fn known(entries: &[(&str, f64)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), FloatComputedTuple::observed(*v, *k, None)))
            .collect()
    }

    #[test]
    fn propagates_forward_along_weighted_edge() {
        let mut g = ComputationGraph::new();
        g.add_edge("X", "Y", EdgeWeights::direct_of(Some(0.5)))
            .unwrap();
        let out = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("X", 100.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        let y = &out.computed["Y"];
        assert_eq!(y.value, 50.0);
        assert_eq!(y.computed, Computed::Yes);
        assert_eq!(y.source, Some(ComputationSource::Flow));
    }

    #[test]
    fn non_split_sum_requires_all_predecessors() {
        let mut g = ComputationGraph::new();
        g.add_edge("A", "C", EdgeWeights::direct_of(Some(1.0)))
            .unwrap();
        g.add_edge("B", "C", EdgeWeights::direct_of(Some(2.0)))
            .unwrap();

        let partial = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("A", 1.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        assert!(!partial.computed.contains_key("C"));

        let full = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("A", 1.0), ("B", 10.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        assert_eq!(full.computed["C"].value, 21.0);
    }

    #[test]
    fn split_node_back_computes_from_single_successor() {
        let mut g = ComputationGraph::new();
        g.add_edge("A", "B", EdgeWeights::direct_of(Some(0.25)))
            .unwrap();
        g.add_edge("A", "C", EdgeWeights::direct_of(Some(0.75)))
            .unwrap();
        infer_weights(&mut g);

        // Only B is known; A is split, so one successor suffices.
        let out = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("B", 10.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        assert_eq!(out.computed["A"].value, 40.0);
        // And C then follows forward.
        assert_eq!(out.computed["C"].value, 30.0);
    }

    #[test]
    fn cycle_terminates_without_value() {
        let mut g = ComputationGraph::new();
        g.add_edge("A", "B", EdgeWeights::direct_of(Some(1.0)))
            .unwrap();
        g.add_edge("B", "A", EdgeWeights::direct_of(Some(1.0)))
            .unwrap();
        let out = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &ValueMap::new(),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn conflict_with_known_value_is_reported_both_ways() {
        let mut g = ComputationGraph::new();
        g.add_edge("X", "Y", EdgeWeights::direct_of(Some(0.5)))
            .unwrap();
        let out = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("X", 100.0), ("Y", 60.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        // The raw observation wins; the flow-derived value is dismissed.
        assert_eq!(out.taken["Y"].value, 60.0);
        assert_eq!(out.dismissed["Y"].value, 50.0);
        assert_eq!(out.dismissed["Y"].source, Some(ComputationSource::Flow));
    }

    #[test]
    fn conflict_detected_when_known_target_is_seen_mid_walk() {
        // With a reverse weight inferred, resolving X first recurses into Y,
        // which falls back to its known value while X is still on the stack.
        // That fallback must stay uncached so the later top-level visit of Y
        // still derives 50.0 and reports the conflict with the observed 60.0.
        let mut g = ComputationGraph::new();
        g.add_edge("X", "Y", EdgeWeights::direct_of(Some(0.5)))
            .unwrap();
        infer_weights(&mut g);
        let out = evaluate_graph(
            &g,
            ComputationSource::Flow,
            &known(&[("X", 100.0), ("Y", 60.0)]),
            &BTreeMap::new(),
            &policy(),
        )
        .unwrap();
        assert_eq!(out.taken["Y"].value, 60.0);
        assert_eq!(out.dismissed["Y"].value, 50.0);
        // X itself is back-computed as 120.0 from Y's observation and loses.
        assert_eq!(out.taken["X"].value, 100.0);
        assert_eq!(out.dismissed["X"].value, 120.0);
    }

    #[test]
    fn previously_computed_nodes_are_not_rederived() {
        let mut g = ComputationGraph::new();
        g.add_edge("X", "Y", EdgeWeights::direct_of(Some(0.5)))
            .unwrap();
        let prev = BTreeMap::from([("Y".to_string(), 50.0)]);
        // Y already carries the flow-derived value in `known` from the
        // previous iteration; the prev cache keeps this from becoming a
        // same-source conflict.
        let mut k = known(&[("X", 100.0)]);
        k.insert(
            "Y".to_string(),
            FloatComputedTuple::derived(50.0, "Y", ComputationSource::Flow),
        );
        let out = evaluate_graph(&g, ComputationSource::Flow, &k, &prev, &policy()).unwrap();
        assert!(out.is_empty());
    }
}
