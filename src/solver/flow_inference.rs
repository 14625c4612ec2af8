//! Flow-graph weight inference.
//!
//! Fills in weights that are uniquely determined by the declared ones,
//! marks split nodes, and flags everything else. Runs independently for
//! the direct and reverse directions, each treating the other as
//! "opposite". Unresolved weights are warnings, never fatal: the value
//! simply does not propagate across that edge.

use crate::graph::comp_graph::{ComputationGraph, Direction};
use crate::issues::Issue;
use tracing::debug;

/// Floating tolerance for "the declared proportions are exhaustive".
const SUM_TOLERANCE: f64 = 1e-6;

pub fn infer_weights(graph: &mut ComputationGraph) -> Vec<Issue> {
    let mut issues = Vec::new();
    for dir in [Direction::Direct, Direction::Reverse] {
        infer_direction(graph, dir, &mut issues);
    }
    complete_split_back_weights(graph, &mut issues);
    issues
}

fn infer_direction(graph: &mut ComputationGraph, dir: Direction, issues: &mut Vec<Issue>) {
    for key in graph.node_keys() {
        let edges = graph.outbound_edges(&key, dir);
        if edges.is_empty() {
            continue;
        }

        let missing: Vec<_> = edges
            .iter()
            .copied()
            .filter(|&e| graph.edge(e).weight(dir).is_none())
            .collect();
        let known_sum: f64 = edges
            .iter()
            .filter_map(|&e| graph.edge(e).weight(dir))
            .sum();

        match missing.len() {
            0 => {
                if (known_sum - 1.0).abs() <= SUM_TOLERANCE {
                    // The split is exhaustive: any one successor's
                    // back-computed value determines this node.
                    graph.set_split(&key, dir);
                }
            }
            1 if edges.len() == 1 => {
                infer_sole_edge(graph, &key, dir, missing[0], issues);
            }
            1 => {
                if known_sum >= 1.0 {
                    issues.push(Issue::warning(format!(
                        "{} weights out of '{}' already sum to {:.6}; the missing \
                         weight has no valid non-negative complement",
                        dir.as_str(),
                        key,
                        known_sum
                    )));
                } else {
                    let inferred = 1.0 - known_sum;
                    graph.edge_mut(missing[0]).set_weight(dir, inferred);
                    graph.set_split(&key, dir);
                    let (s, t) = graph.edge_endpoints(missing[0]);
                    debug!(source = %s, target = %t, weight = inferred, "complement weight inferred");
                    issues.push(Issue::info(format!(
                        "inferred {} weight {:.6} for '{}' -> '{}' as complement of sibling weights",
                        dir.as_str(),
                        inferred,
                        s,
                        t
                    )));
                }
            }
            n => {
                issues.push(Issue::warning(format!(
                    "{} unweighted {} edges out of '{}': weights cannot be inferred",
                    n,
                    dir.as_str(),
                    key
                )));
            }
        }
    }
}

/// The node has exactly one outbound edge in `dir` and its weight is
/// missing: try the opposite weight on the same edge, else fall back to the
/// pass-through default unless an explicitly declared opposite edge says
/// the pair is already modeled the other way.
fn infer_sole_edge(
    graph: &mut ComputationGraph,
    key: &str,
    dir: Direction,
    edge: petgraph::graph::EdgeIndex,
    issues: &mut Vec<Issue>,
) {
    let opposite = dir.opposite();
    let (s, t) = graph.edge_endpoints(edge);
    if let Some(w_opp) = graph.edge(edge).weight(opposite) {
        let inferred = if w_opp == 0.0 { 0.0 } else { 1.0 / w_opp };
        graph.edge_mut(edge).set_weight(dir, inferred);
        issues.push(Issue::info(format!(
            "inferred {} weight {:.6} for '{}' -> '{}' from its {} weight",
            dir.as_str(),
            inferred,
            s,
            t,
            opposite.as_str()
        )));
    } else if graph.edge(edge).declared(opposite) {
        issues.push(Issue::warning(format!(
            "sole {} weight of '{}' left unresolved: a declared {} edge \
             exists for the same pair",
            dir.as_str(),
            key,
            opposite.as_str()
        )));
    } else {
        graph.edge_mut(edge).set_weight(dir, 1.0);
        issues.push(Issue::info(format!(
            "inferred pass-through {} weight 1.0 for '{}' -> '{}'",
            dir.as_str(),
            s,
            t
        )));
    }
}

/// For a node split in one direction, any single successor back-determines
/// it; realize that by completing missing opposite weights as reciprocals.
/// Also applied to the scale-change graph, whose hidden nodes arrive
/// pre-marked as split.
pub(crate) fn complete_split_back_weights(graph: &mut ComputationGraph, issues: &mut Vec<Issue>) {
    for dir in [Direction::Direct, Direction::Reverse] {
        let opposite = dir.opposite();
        for key in graph.node_keys() {
            if !graph.split(&key, dir) {
                continue;
            }
            for e in graph.outbound_edges(&key, dir) {
                let weights = *graph.edge(e);
                let Some(w) = weights.weight(dir) else { continue };
                if w == 0.0 || weights.weight(opposite).is_some() || weights.declared(opposite) {
                    continue;
                }
                graph.edge_mut(e).set_weight(opposite, 1.0 / w);
                let (s, t) = graph.edge_endpoints(e);
                issues.push(Issue::info(format!(
                    "completed {} weight {:.6} for split node edge '{}' -> '{}'",
                    opposite.as_str(),
                    1.0 / w,
                    s,
                    t
                )));
            }
        }
    }
}
