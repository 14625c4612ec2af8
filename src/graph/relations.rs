//! Builds relation graphs and aggregation hierarchies from the declared
//! model: the Flow, Scale and Scale-Change graphs (expression-weighted),
//! plus the interface-type and part-of hierarchies.

use crate::error::SolvingError;
use crate::evaluation::expression::{evaluate, EvalOutcome, Expression};
use crate::graph::comp_graph::{ComputationGraph, Direction, EdgeWeights};
use crate::graph::hierarchy::Hierarchy;
use crate::graph::node::{InterfaceNode, NodeTable};
use crate::issues::Issue;
use crate::model::{Interface, InterfaceRef, ModelRegistry, Orientation};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// A relation graph whose weights are still expressions. Resolving against a
/// scenario environment produces a numeric [`ComputationGraph`].
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    edges: Vec<EdgeSpec>,
    nodes: BTreeSet<String>,
    splits: Vec<(String, Direction)>,
}

#[derive(Debug, Clone)]
struct EdgeSpec {
    source: String,
    target: String,
    direct: Option<Expression>,
    reverse: Option<Expression>,
    /// A period-bound edge only exists when resolving for that period.
    /// Declared relations hold for every period and carry `None`.
    period: Option<String>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_node(&mut self, key: &str) {
        self.nodes.insert(key.to_string());
    }

    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        direct: Option<Expression>,
        reverse: Option<Expression>,
    ) {
        self.add_edge_in_period(source, target, direct, reverse, None);
    }

    /// An edge scoped to a single time period; relative observations are
    /// multipliers measured in one period and must not leak into others.
    pub fn add_edge_in_period(
        &mut self,
        source: &str,
        target: &str,
        direct: Option<Expression>,
        reverse: Option<Expression>,
        period: Option<&str>,
    ) {
        self.ensure_node(source);
        self.ensure_node(target);
        self.edges.push(EdgeSpec {
            source: source.to_string(),
            target: target.to_string(),
            direct,
            reverse,
            period: period.map(str::to_string),
        });
    }

    pub fn mark_split(&mut self, key: &str, dir: Direction) {
        self.splits.push((key.to_string(), dir));
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn node_keys(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    /// Evaluates every weight expression against `env` and assembles the
    /// numeric computation graph for `period`. Period-bound edges of other
    /// periods are dropped. A weight that cannot be evaluated stays `None`
    /// (reported as a warning); duplicate declared edges are fatal.
    pub fn resolve(
        &self,
        env: &HashMap<String, f64>,
        period: Option<&str>,
    ) -> Result<(ComputationGraph, Vec<Issue>), SolvingError> {
        let mut issues = Vec::new();
        let mut graph = ComputationGraph::new();
        for key in &self.nodes {
            graph.ensure_node(key);
        }
        for spec in &self.edges {
            if spec.period.as_deref().map_or(false, |p| Some(p) != period) {
                continue;
            }
            let direct = resolve_weight(&spec.direct, env, &spec.source, &spec.target, &mut issues)?;
            let reverse =
                resolve_weight(&spec.reverse, env, &spec.source, &spec.target, &mut issues)?;
            graph.add_edge(
                &spec.source,
                &spec.target,
                EdgeWeights {
                    direct,
                    reverse,
                    direct_declared: true,
                    reverse_declared: spec.reverse.is_some(),
                },
            )?;
        }
        for (key, dir) in &self.splits {
            graph.set_split(key, *dir);
        }
        Ok((graph, issues))
    }
}

fn resolve_weight(
    expr: &Option<Expression>,
    env: &HashMap<String, f64>,
    source: &str,
    target: &str,
    issues: &mut Vec<Issue>,
) -> Result<Option<f64>, SolvingError> {
    match expr {
        None => Ok(None),
        Some(expr) => match evaluate(expr, env)? {
            EvalOutcome::Value(v) => Ok(Some(v)),
            EvalOutcome::Missing(names) => {
                issues.push(Issue::warning(format!(
                    "weight of edge '{}' -> '{}' unresolved (missing: {})",
                    source,
                    target,
                    names.into_iter().collect::<Vec<_>>().join(", ")
                )));
                Ok(None)
            }
        },
    }
}

/// Everything the per-pair solver consumes, built once from the model.
#[derive(Debug, Clone, Default)]
pub struct RelationGraphs {
    pub flow: RelationGraph,
    pub scale: RelationGraph,
    pub scale_change: RelationGraph,
    pub interface_type: Hierarchy,
    pub part_of: Hierarchy,
    pub nodes: NodeTable,
}

/// Warnings land in `issues` as they are found, so the caller keeps them
/// even when a later build step fails fatally.
pub fn build_relation_graphs(
    model: &ModelRegistry,
    issues: &mut Vec<Issue>,
) -> Result<RelationGraphs, SolvingError> {
    let mut b = Builder {
        model,
        issues,
        out: RelationGraphs::default(),
    };
    b.intern_declared_interfaces()?;
    b.build_flow_edges()?;
    b.build_scale_edges()?;
    b.build_interface_type_hierarchy()?;
    b.build_part_of_hierarchy()?;
    b.out.interface_type.check_acyclic()?;
    b.out.part_of.check_acyclic()?;
    Ok(b.out)
}

struct Builder<'a> {
    model: &'a ModelRegistry,
    issues: &'a mut Vec<Issue>,
    out: RelationGraphs,
}

impl<'a> Builder<'a> {
    fn intern_declared_interfaces(&mut self) -> Result<(), SolvingError> {
        for itf in &self.model.interfaces {
            if self.model.is_archetype(&itf.processor) {
                continue;
            }
            let proc = self.model.processor(&itf.processor);
            self.out
                .nodes
                .intern(InterfaceNode::from_interface(itf, proc))?;
        }
        Ok(())
    }

    /// Looks up the node for a declared interface reference; relations
    /// pointing at undeclared interfaces are skipped with a warning.
    fn node_key(&self, r: &InterfaceRef) -> Option<String> {
        let itf = self.model.interface(r)?;
        Some(format!("{}:{}", itf.processor, itf.name))
    }

    fn skips_archetype(&self, processors: &[&str], what: &str) -> bool {
        for p in processors {
            if self.model.is_archetype(p) {
                warn!(processor = %p, relation = what, "skipping relation touching archetype");
                return true;
            }
        }
        false
    }

    fn build_flow_edges(&mut self) -> Result<(), SolvingError> {
        for flow in &self.model.flows {
            if self.skips_archetype(
                &[&flow.source.processor, &flow.target.processor],
                "flow",
            ) {
                continue;
            }
            let (Some(src), Some(dst)) = (self.node_key(&flow.source), self.node_key(&flow.target))
            else {
                self.issues.push(Issue::warning(format!(
                    "flow relation references undeclared interface ({}:{} -> {}:{})",
                    flow.source.processor,
                    flow.source.interface,
                    flow.target.processor,
                    flow.target.interface
                )));
                continue;
            };

            if flow.scale_change_weight.is_none() && flow.back.is_none() {
                self.out
                    .flow
                    .add_edge(&src, &dst, flow.weight.clone(), None);
                continue;
            }

            // Change of scale: synthesize the hidden flow-before-scale-change
            // node on the source processor and wire it as Scale-Change edges.
            let source_itf = self
                .model
                .interface(&flow.source)
                .expect("checked by node_key");
            let hidden_key = self.intern_hidden_node(source_itf, &flow.target)?;
            self.out
                .flow
                .add_edge(&src, &hidden_key, flow.weight.clone(), None);
            self.out.scale_change.add_edge(
                &hidden_key,
                &dst,
                flow.scale_change_weight.clone(),
                None,
            );
            if let Some(back) = &flow.back {
                if let Some(back_key) = self.node_key(back) {
                    self.out.scale_change.add_edge(
                        &hidden_key,
                        &back_key,
                        flow.back_weight.clone(),
                        None,
                    );
                } else {
                    self.issues.push(Issue::warning(format!(
                        "back interface {}:{} of flow relation is undeclared",
                        back.processor, back.interface
                    )));
                }
            }
            // Either outgoing branch determines the hidden flow, and the
            // hidden flow determines the source.
            self.out
                .scale_change
                .mark_split(&hidden_key, Direction::Direct);
            self.out
                .scale_change
                .mark_split(&hidden_key, Direction::Reverse);
        }
        Ok(())
    }

    fn intern_hidden_node(
        &mut self,
        source: &Interface,
        target: &InterfaceRef,
    ) -> Result<String, SolvingError> {
        let mut hidden = source.clone();
        hidden.name = format!("{}__{}", source.name, target.interface);
        let proc = self.model.processor(&source.processor);
        debug!(node = %hidden.name, "synthesizing hidden scale-change node");
        self.out
            .nodes
            .intern(InterfaceNode::from_interface(&hidden, proc))
    }

    fn build_scale_edges(&mut self) -> Result<(), SolvingError> {
        for scale in &self.model.scales {
            if self.skips_archetype(
                &[&scale.source.processor, &scale.target.processor],
                "scale",
            ) {
                continue;
            }
            let (Some(src), Some(dst)) =
                (self.node_key(&scale.source), self.node_key(&scale.target))
            else {
                self.issues.push(Issue::warning(format!(
                    "scale relation references undeclared interface ({}:{} -> {}:{})",
                    scale.source.processor,
                    scale.source.interface,
                    scale.target.processor,
                    scale.target.interface
                )));
                continue;
            };
            self.out
                .scale
                .add_edge(&src, &dst, Some(scale.weight.clone()), None);
        }

        // Relative observations are multipliers over another interface of
        // the same processor: a Scale edge, not a direct value.
        for obs in &self.model.observations {
            let Some(base_name) = &obs.relative_to else { continue };
            if self.model.is_archetype(&obs.interface.processor) {
                continue;
            }
            let base = InterfaceRef::new(obs.interface.processor.clone(), base_name.clone());
            let (Some(src), Some(dst)) = (self.node_key(&base), self.node_key(&obs.interface))
            else {
                self.issues.push(Issue::warning(format!(
                    "relative observation on {}:{} references undeclared interface '{}'",
                    obs.interface.processor, obs.interface.interface, base_name
                )));
                continue;
            };
            self.out.scale.add_edge_in_period(
                &src,
                &dst,
                Some(obs.value.clone()),
                None,
                Some(&obs.period),
            );
        }
        Ok(())
    }

    fn build_interface_type_hierarchy(&mut self) -> Result<(), SolvingError> {
        for itype in &self.model.interface_types {
            let children = self.model.child_types(&itype.name);
            if children.is_empty() {
                continue;
            }
            let child_names: BTreeSet<&str> =
                children.iter().map(|t| t.name.as_str()).collect();

            for proc in &self.model.processors {
                if proc.archetype {
                    continue;
                }
                for orientation in [Orientation::Input, Orientation::Output] {
                    let materialized: Vec<String> = self
                        .model
                        .interfaces_of(&proc.name)
                        .filter(|i| {
                            i.orientation == orientation
                                && child_names.contains(i.interface_type.as_str())
                        })
                        .map(|i| format!("{}:{}", i.processor, i.name))
                        .collect();
                    if materialized.is_empty() {
                        continue;
                    }

                    let parent_key = self.parent_type_node(proc.name.as_str(), itype, orientation)?;
                    for child_key in materialized {
                        self.out.interface_type.add_edge(&parent_key, &child_key, None);
                    }
                }
            }
        }
        Ok(())
    }

    /// Reuses a concretely-named interface with the equal alternate key if
    /// one exists, otherwise synthesizes the per-type parent node.
    fn parent_type_node(
        &mut self,
        processor: &str,
        itype: &crate::model::InterfaceType,
        orientation: Orientation,
    ) -> Result<String, SolvingError> {
        let synthetic =
            InterfaceNode::typed(processor, &itype.name, orientation, self.model.processor(processor));
        if let Some(existing) = self.out.nodes.by_alternate_key(&synthetic.alternate_key()) {
            return Ok(existing.key().to_string());
        }
        self.out.nodes.intern(synthetic)
    }

    fn build_part_of_hierarchy(&mut self) -> Result<(), SolvingError> {
        for rel in &self.model.part_of {
            if self.skips_archetype(&[&rel.parent, &rel.child], "part-of") {
                continue;
            }

            // Under "behaves as", only interfaces present in both the child
            // and the behave-as processor are aggregated.
            let behaves_as_names: Option<BTreeSet<String>> = rel.behaves_as.as_ref().map(|b| {
                self.model
                    .interfaces_of(b)
                    .map(|i| i.name.clone())
                    .collect()
            });

            let child_interfaces: Vec<Interface> = self
                .model
                .interfaces_of(&rel.child)
                .filter(|i| {
                    behaves_as_names
                        .as_ref()
                        .map_or(true, |names| names.contains(&i.name))
                })
                .cloned()
                .collect();

            for child_itf in child_interfaces {
                let child_key = format!("{}:{}", child_itf.processor, child_itf.name);
                let mut parent_itf = child_itf.clone();
                parent_itf.processor = rel.parent.clone();
                let parent_key = self.out.nodes.intern(InterfaceNode::from_interface(
                    &parent_itf,
                    self.model.processor(&rel.parent),
                ))?;
                self.out
                    .part_of
                    .add_edge(&parent_key, &child_key, rel.weight.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FlowRelation, InterfaceType, Observation, PartOfRelation, Processor,
    };

    fn interface(processor: &str, name: &str, itype: &str, orientation: Orientation) -> Interface {
        Interface {
            processor: processor.to_string(),
            name: name.to_string(),
            interface_type: itype.to_string(),
            orientation,
            sphere: None,
            roegen_type: None,
            unit: None,
        }
    }

    fn two_processor_model() -> ModelRegistry {
        let mut m = ModelRegistry::new();
        m.add_processor(Processor::instance("A"));
        m.add_processor(Processor::instance("B"));
        m.add_interface(interface("A", "Water", "Water", Orientation::Output));
        m.add_interface(interface("B", "Water", "Water", Orientation::Input));
        m
    }

    #[test]
    fn flow_relation_becomes_flow_edge() {
        let mut m = two_processor_model();
        m.add_flow(FlowRelation::new(
            InterfaceRef::new("A", "Water"),
            InterfaceRef::new("B", "Water"),
            Some(Expression::Literal(0.5)),
        ));
        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();
        let (cg, issues) = graphs.flow.resolve(&HashMap::new(), None).unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            cg.predecessors("B:Water", Direction::Direct),
            vec![("A:Water".to_string(), Some(0.5))]
        );
    }

    #[test]
    fn archetype_relations_are_skipped() {
        let mut m = two_processor_model();
        let mut tmpl = Processor::instance("Tmpl");
        tmpl.archetype = true;
        m.add_processor(tmpl);
        m.add_interface(interface("Tmpl", "Water", "Water", Orientation::Input));
        m.add_flow(FlowRelation::new(
            InterfaceRef::new("A", "Water"),
            InterfaceRef::new("Tmpl", "Water"),
            Some(Expression::Literal(1.0)),
        ));
        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();
        assert!(graphs.flow.is_empty());
        assert!(graphs.nodes.get("Tmpl:Water").is_none());
    }

    #[test]
    fn scale_change_flow_synthesizes_split_hidden_node() {
        let mut m = two_processor_model();
        let mut flow = FlowRelation::new(
            InterfaceRef::new("A", "Water"),
            InterfaceRef::new("B", "Water"),
            Some(Expression::Literal(1.0)),
        );
        flow.scale_change_weight = Some(Expression::Literal(2.0));
        m.add_flow(flow);
        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();

        let hidden = "A:Water__Water";
        assert!(graphs.nodes.get(hidden).is_some());
        let (flow_cg, _) = graphs.flow.resolve(&HashMap::new(), None).unwrap();
        assert_eq!(
            flow_cg.predecessors(hidden, Direction::Direct),
            vec![("A:Water".to_string(), Some(1.0))]
        );
        let (sc_cg, _) = graphs.scale_change.resolve(&HashMap::new(), None).unwrap();
        assert_eq!(
            sc_cg.predecessors("B:Water", Direction::Direct),
            vec![(hidden.to_string(), Some(2.0))]
        );
        assert!(sc_cg.split(hidden, Direction::Direct));
        assert!(sc_cg.split(hidden, Direction::Reverse));
    }

    #[test]
    fn relative_observation_becomes_scale_edge() {
        let mut m = ModelRegistry::new();
        m.add_processor(Processor::instance("A"));
        m.add_interface(interface("A", "Land", "Land", Orientation::Input));
        m.add_interface(interface("A", "Labour", "Labour", Orientation::Input));
        let mut obs = Observation::absolute(
            InterfaceRef::new("A", "Labour"),
            "2020",
            Expression::Literal(3.0),
        );
        obs.relative_to = Some("Land".to_string());
        m.add_observation(obs);

        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();
        let (cg, _) = graphs.scale.resolve(&HashMap::new(), Some("2020")).unwrap();
        assert_eq!(
            cg.predecessors("A:Labour", Direction::Direct),
            vec![("A:Land".to_string(), Some(3.0))]
        );
        // The multiplier was measured in 2020 and binds to that period only.
        let (other, _) = graphs.scale.resolve(&HashMap::new(), Some("2021")).unwrap();
        assert!(other.predecessors("A:Labour", Direction::Direct).is_empty());
    }

    #[test]
    fn interface_type_hierarchy_synthesizes_parent_per_processor() {
        let mut m = ModelRegistry::new();
        m.add_processor(Processor::instance("Farm"));
        m.add_interface_type(InterfaceType {
            name: "Water".to_string(),
            parent: None,
        });
        m.add_interface_type(InterfaceType {
            name: "BlueWater".to_string(),
            parent: Some("Water".to_string()),
        });
        m.add_interface_type(InterfaceType {
            name: "GreenWater".to_string(),
            parent: Some("Water".to_string()),
        });
        m.add_interface(interface("Farm", "Blue", "BlueWater", Orientation::Input));
        m.add_interface(interface("Farm", "Green", "GreenWater", Orientation::Input));

        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();
        let parent = "Farm:Water:Input";
        let children: Vec<&str> = graphs
            .interface_type
            .children_of(parent)
            .iter()
            .map(|e| e.child.as_str())
            .collect();
        assert_eq!(children, vec!["Farm:Blue", "Farm:Green"]);
    }

    #[test]
    fn part_of_behaves_as_intersects_interfaces() {
        let mut m = ModelRegistry::new();
        m.add_processor(Processor::instance("Parent"));
        m.add_processor(Processor::instance("Child"));
        m.add_processor(Processor::instance("Role"));
        m.add_interface(interface("Child", "Water", "Water", Orientation::Input));
        m.add_interface(interface("Child", "Energy", "Energy", Orientation::Input));
        m.add_interface(interface("Role", "Water", "Water", Orientation::Input));
        m.add_part_of(PartOfRelation {
            parent: "Parent".to_string(),
            child: "Child".to_string(),
            weight: None,
            behaves_as: Some("Role".to_string()),
        });

        let graphs = build_relation_graphs(&m, &mut Vec::new()).unwrap();
        let children: Vec<&str> = graphs
            .part_of
            .children_of("Parent:Water")
            .iter()
            .map(|e| e.child.as_str())
            .collect();
        assert_eq!(children, vec!["Child:Water"]);
        // Energy is absent from the behave-as processor, so it is excluded.
        assert!(graphs.part_of.children_of("Parent:Energy").is_empty());
    }
}
