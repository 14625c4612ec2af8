//! Hierarchical aggregation: parent value as the weighted sum of children.
//!
//! Shared by part-of aggregation (declared weights) and interface-type
//! aggregation (implicit weight 1); the hierarchies arrive with weights
//! already resolved. The missing-value policy decides whether an absent
//! child invalidates the parent or contributes zero.

use crate::config::MissingValuePolicy;
use crate::error::SolvingError;
use crate::evaluation::Resolution;
use crate::graph::hierarchy::ResolvedHierarchy;
use crate::results::{ComputationSource, FloatComputedTuple, ValueMap};
use crate::solver::conflicts::{values_agree, ConflictPolicy};
use crate::solver::EvaluationOutput;
use std::collections::{BTreeMap, HashMap, HashSet};

pub fn evaluate_hierarchy(
    hierarchy: &ResolvedHierarchy,
    source: ComputationSource,
    known: &ValueMap,
    prev: &BTreeMap<String, f64>,
    policy: &ConflictPolicy,
    missing: MissingValuePolicy,
) -> Result<EvaluationOutput, SolvingError> {
    let mut walker = AggregationWalker {
        hierarchy,
        source,
        known,
        prev,
        policy,
        missing,
        cache: HashMap::new(),
        visiting: HashSet::new(),
        output: EvaluationOutput::default(),
    };
    let parents: Vec<String> = hierarchy.parents().cloned().collect();
    for parent in parents {
        walker.resolve(&parent)?;
    }
    Ok(walker.output)
}

struct AggregationWalker<'a> {
    hierarchy: &'a ResolvedHierarchy,
    source: ComputationSource,
    known: &'a ValueMap,
    prev: &'a BTreeMap<String, f64>,
    policy: &'a ConflictPolicy,
    missing: MissingValuePolicy,
    cache: HashMap<String, Resolution>,
    visiting: HashSet<String>,
    output: EvaluationOutput,
}

impl<'a> AggregationWalker<'a> {
    fn resolve(&mut self, key: &str) -> Result<Resolution, SolvingError> {
        if let Some(&v) = self.prev.get(key) {
            return Ok(Resolution::Resolved(v));
        }
        // The builder rejects cyclic hierarchies; this guard is the runtime
        // backstop that keeps a slipped-through cycle from recursing forever.
        if self.visiting.contains(key) {
            return Ok(Resolution::NotApplicable);
        }
        if let Some(&cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let (aggregated, blocked) = self.aggregate_children(key)?;

        let resolution = match aggregated {
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
                None => Resolution::NotAvailable,
            },
        };
        // Only definitive values are memoized, as in the graph evaluator;
        // an aggregation cut short by a visiting ancestor stays uncached so
        // the top-level visit re-attempts it.
        if !blocked {
            if let Resolution::Resolved(_) = resolution {
                self.cache.insert(key.to_string(), resolution);
            }
        }
        Ok(resolution)
    }

    /// Weighted sum over the children, or `None` when the node is a leaf or
    /// the aggregation is invalidated by a missing child. The flag reports
    /// whether a child was blocked on the visiting stack.
    fn aggregate_children(&mut self, key: &str) -> Result<(Option<f64>, bool), SolvingError> {
        let children = self.hierarchy.children_of(key).to_vec();
        if children.is_empty() {
            return Ok((None, false));
        }

        self.visiting.insert(key.to_string());
        let mut sum = 0.0;
        let mut invalidated = false;
        let mut blocked = false;
        for (child, weight) in &children {
            let resolved = self.resolve(child)?;
            if resolved == Resolution::NotApplicable {
                blocked = true;
            }
            match (resolved.value(), weight) {
                (Some(v), Some(w)) => sum += w * v,
                _ => match self.missing {
                    MissingValuePolicy::Invalidate => {
                        invalidated = true;
                        break;
                    }
                    MissingValuePolicy::UseZero => {}
                },
            }
        }
        self.visiting.remove(key);

        Ok((if invalidated { None } else { Some(sum) }, blocked))
    }
}
