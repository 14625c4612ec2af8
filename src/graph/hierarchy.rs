//! Aggregation hierarchies: parent node -> weighted children.
//!
//! Shared by part-of aggregation (weights from the declared relations) and
//! interface-type aggregation (implicit weight 1). Hierarchies must be
//! acyclic; the check runs at build time with a visit-state DFS.

use crate::error::SolvingError;
use crate::evaluation::expression::{evaluate, EvalOutcome, Expression};
use crate::issues::Issue;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyEdge {
    pub child: String,
    /// `None` means implicit weight 1.
    pub weight: Option<Expression>,
}

#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    children: BTreeMap<String, Vec<HierarchyEdge>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, parent: &str, child: &str, weight: Option<Expression>) {
        let edges = self.children.entry(parent.to_string()).or_default();
        if edges.iter().any(|e| e.child == child) {
            return;
        }
        edges.push(HierarchyEdge {
            child: child.to_string(),
            weight,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parents(&self) -> impl Iterator<Item = &String> {
        self.children.keys()
    }

    pub fn children_of(&self, parent: &str) -> &[HierarchyEdge] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rejects any ancestor chain that loops back on itself.
    pub fn check_acyclic(&self) -> Result<(), SolvingError> {
        #[derive(Clone, Copy, PartialEq)]
        enum VisitState {
            Visiting,
            Visited,
        }

        fn visit(
            node: &str,
            hierarchy: &Hierarchy,
            state: &mut HashMap<String, VisitState>,
        ) -> Result<(), SolvingError> {
            match state.get(node) {
                Some(VisitState::Visited) => return Ok(()),
                Some(VisitState::Visiting) => {
                    return Err(SolvingError::HierarchyCycle(node.to_string()))
                }
                None => {}
            }
            state.insert(node.to_string(), VisitState::Visiting);
            for edge in hierarchy.children_of(node) {
                visit(&edge.child, hierarchy, state)?;
            }
            state.insert(node.to_string(), VisitState::Visited);
            Ok(())
        }

        let mut state = HashMap::new();
        for parent in self.children.keys() {
            visit(parent, self, &mut state)?;
        }
        Ok(())
    }

    /// Resolves weight expressions against the scenario environment. An edge
    /// whose weight cannot be evaluated keeps `None` and emits a warning;
    /// the aggregator then treats that child as missing.
    pub fn resolve(
        &self,
        env: &HashMap<String, f64>,
    ) -> Result<(ResolvedHierarchy, Vec<Issue>), SolvingError> {
        let mut issues = Vec::new();
        let mut children = BTreeMap::new();
        for (parent, edges) in &self.children {
            let mut resolved = Vec::with_capacity(edges.len());
            for edge in edges {
                let weight = match &edge.weight {
                    None => Some(1.0),
                    Some(expr) => match evaluate(expr, env)? {
                        EvalOutcome::Value(v) => Some(v),
                        EvalOutcome::Missing(names) => {
                            issues.push(Issue::warning(format!(
                                "aggregation weight for '{}' -> '{}' unresolved (missing: {})",
                                parent,
                                edge.child,
                                names.into_iter().collect::<Vec<_>>().join(", ")
                            )));
                            None
                        }
                    },
                };
                resolved.push((edge.child.clone(), weight));
            }
            children.insert(parent.clone(), resolved);
        }
        Ok((ResolvedHierarchy { children }, issues))
    }
}

/// A hierarchy with numeric weights, fixed for one (scenario, period) pair.
#[derive(Debug, Clone, Default)]
pub struct ResolvedHierarchy {
    children: BTreeMap<String, Vec<(String, Option<f64>)>>,
}

impl ResolvedHierarchy {
    pub fn parents(&self) -> impl Iterator<Item = &String> {
        self.children.keys()
    }

    pub fn children_of(&self, parent: &str) -> &[(String, Option<f64>)] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_parent(&self, key: &str) -> bool {
        self.children.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_is_rejected() {
        let mut h = Hierarchy::new();
        h.add_edge("A", "B", None);
        h.add_edge("B", "A", None);
        assert!(matches!(
            h.check_acyclic(),
            Err(SolvingError::HierarchyCycle(_))
        ));
    }

    #[test]
    fn tree_passes_acyclicity() {
        let mut h = Hierarchy::new();
        h.add_edge("A", "B", None);
        h.add_edge("A", "C", None);
        h.add_edge("B", "D", None);
        assert!(h.check_acyclic().is_ok());
    }

    #[test]
    fn missing_weight_resolves_to_one() {
        let mut h = Hierarchy::new();
        h.add_edge("A", "B", None);
        let (resolved, issues) = h.resolve(&HashMap::new()).unwrap();
        assert_eq!(resolved.children_of("A"), &[("B".to_string(), Some(1.0))]);
        assert!(issues.is_empty());
    }

    #[test]
    fn unresolvable_weight_warns_and_stays_none() {
        let mut h = Hierarchy::new();
        h.add_edge("A", "B", Some(Expression::name("w")));
        let (resolved, issues) = h.resolve(&HashMap::new()).unwrap();
        assert_eq!(resolved.children_of("A"), &[("B".to_string(), None)]);
        assert_eq!(issues.len(), 1);
    }
}
