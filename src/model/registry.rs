//! The declared-model registry: everything the solver consumes, already
//! materialized in memory by the out-of-scope import layers.

use super::types::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    pub processors: Vec<Processor>,
    pub interfaces: Vec<Interface>,
    pub interface_types: Vec<InterfaceType>,
    pub flows: Vec<FlowRelation>,
    pub scales: Vec<ScaleRelation>,
    pub part_of: Vec<PartOfRelation>,
    pub observations: Vec<Observation>,
    pub parameters: Vec<Parameter>,
    pub problem: ProblemStatement,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processor(&mut self, p: Processor) {
        self.processors.push(p);
    }

    pub fn add_interface(&mut self, i: Interface) {
        self.interfaces.push(i);
    }

    pub fn add_interface_type(&mut self, t: InterfaceType) {
        self.interface_types.push(t);
    }

    pub fn add_flow(&mut self, f: FlowRelation) {
        self.flows.push(f);
    }

    pub fn add_scale(&mut self, s: ScaleRelation) {
        self.scales.push(s);
    }

    pub fn add_part_of(&mut self, p: PartOfRelation) {
        self.part_of.push(p);
    }

    pub fn add_observation(&mut self, o: Observation) {
        self.observations.push(o);
    }

    pub fn add_parameter(&mut self, p: Parameter) {
        self.parameters.push(p);
    }

    pub fn processor(&self, name: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.name == name)
    }

    pub fn is_archetype(&self, processor: &str) -> bool {
        self.processor(processor).map_or(false, |p| p.archetype)
    }

    pub fn interfaces_of<'a>(
        &'a self,
        processor: &'a str,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.interfaces
            .iter()
            .filter(move |i| i.processor == processor)
    }

    pub fn interface(&self, r: &InterfaceRef) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|i| i.processor == r.processor && i.name == r.interface)
    }

    pub fn interface_type(&self, name: &str) -> Option<&InterfaceType> {
        self.interface_types.iter().find(|t| t.name == name)
    }

    /// Child types of `parent` in the interface-type taxonomy.
    pub fn child_types(&self, parent: &str) -> Vec<&InterfaceType> {
        self.interface_types
            .iter()
            .filter(|t| t.parent.as_deref() == Some(parent))
            .collect()
    }

    /// Distinct time periods carrying at least one observation, in sorted
    /// order. These drive the (scenario, period) outer loop.
    pub fn periods(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.observations.iter().map(|o| o.period.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Scenario names to solve for; a model without an explicit problem
    /// statement still gets one pass with default parameter values.
    pub fn scenarios(&self) -> Vec<String> {
        if self.problem.scenarios.is_empty() {
            vec!["default".to_string()]
        } else {
            self.problem.scenarios.keys().cloned().collect()
        }
    }
}
