//! Internal/External partition of a Total result set.
//!
//! Raw observations and Scale-derived values stay Internal. Every other
//! node is classified by where its children live: children sharing the
//! node's system and subsystem contribute to the Internal sum, the rest to
//! the External sum; a node whose children span both scopes appears in
//! both partitions with independently summed partial values.

use crate::graph::comp_graph::{ComputationGraph, Direction};
use crate::graph::hierarchy::ResolvedHierarchy;
use crate::graph::InterfaceNode;
use crate::results::{Computed, ComputationSource, ValueMap};
use std::collections::BTreeMap;
use tracing::debug;

pub fn split_scopes(
    total: &ValueMap,
    nodes: &BTreeMap<String, InterfaceNode>,
    part_of: &ResolvedHierarchy,
    interface_type: &ResolvedHierarchy,
    flow: &ComputationGraph,
) -> (ValueMap, ValueMap) {
    let mut internal = ValueMap::new();
    let mut external = ValueMap::new();

    for (key, tuple) in total {
        if tuple.computed == Computed::No || tuple.source == Some(ComputationSource::Scale) {
            internal.insert(key.clone(), tuple.clone());
            continue;
        }

        let mut children = hierarchical_children(key, part_of, interface_type, total);
        if children.is_empty() {
            // The hierarchical structure cannot place this node; retry with
            // the flow graph's reverse direction before giving up.
            children = flow
                .predecessors(key, Direction::Reverse)
                .into_iter()
                .filter_map(|(child, weight)| {
                    let w = weight?;
                    total.get(&child).map(|t| (child, w, t.value))
                })
                .collect();
        }
        if children.is_empty() {
            debug!(node = %key, "node is neither internal nor external");
            continue;
        }

        let node_scope = nodes.get(key).map(|n| owned_scope(n));
        let mut internal_sum = 0.0;
        let mut external_sum = 0.0;
        let mut internal_count = 0usize;
        let mut external_count = 0usize;
        for (child, weight, value) in children {
            let child_scope = nodes.get(&child).map(|n| owned_scope(n));
            if child_scope == node_scope {
                internal_sum += weight * value;
                internal_count += 1;
            } else {
                external_sum += weight * value;
                external_count += 1;
            }
        }

        match (internal_count, external_count) {
            (_, 0) => {
                internal.insert(key.clone(), tuple.clone());
            }
            (0, _) => {
                external.insert(key.clone(), tuple.clone());
            }
            _ => {
                let mut t = tuple.clone();
                t.value = internal_sum;
                internal.insert(key.clone(), t);
                let mut t = tuple.clone();
                t.value = external_sum;
                external.insert(key.clone(), t);
            }
        }
    }

    (internal, external)
}

fn owned_scope(node: &InterfaceNode) -> (Option<String>, Option<String>) {
    let (system, subsystem) = node.scope_tag();
    (system.map(str::to_string), subsystem.map(str::to_string))
}

/// Children of `key` in either hierarchy that carry a resolved total value.
fn hierarchical_children(
    key: &str,
    part_of: &ResolvedHierarchy,
    interface_type: &ResolvedHierarchy,
    total: &ValueMap,
) -> Vec<(String, f64, f64)> {
    part_of
        .children_of(key)
        .iter()
        .chain(interface_type.children_of(key))
        .filter_map(|(child, weight)| {
            let w = (*weight)?;
            total
                .get(child)
                .map(|t| (child.clone(), w, t.value))
        })
        .collect()
}
