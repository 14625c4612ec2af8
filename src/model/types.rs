//! Declaration types: processors, interfaces, relations, observations,
//! parameters. These are plain data; all semantics live in `graph`/`solver`.

use crate::evaluation::Expression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Input,
    Output,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Input => "Input",
            Orientation::Output => "Output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoegenType {
    Flow,
    Fund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sphere {
    Technosphere,
    Biosphere,
}

/// A named system unit. `name` is the full hierarchical name
/// (e.g. "Society.Households").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub name: String,
    pub system: Option<String>,
    pub subsystem: Option<String>,
    /// Archetype processors are templates; relations touching them are
    /// skipped during graph construction.
    pub archetype: bool,
}

impl Processor {
    pub fn instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: None,
            subsystem: None,
            archetype: false,
        }
    }
}

/// A named quantity slot on a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub processor: String,
    pub name: String,
    pub interface_type: String,
    pub orientation: Orientation,
    pub sphere: Option<Sphere>,
    pub roegen_type: Option<RoegenType>,
    pub unit: Option<String>,
}

/// A category in the interface-type taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceType {
    pub name: String,
    pub parent: Option<String>,
}

/// Names one interface of one processor, as relations reference them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceRef {
    pub processor: String,
    pub interface: String,
}

impl InterfaceRef {
    pub fn new(processor: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            interface: interface.into(),
        }
    }
}

/// A directed flow of a quantity from one interface to another.
///
/// When `scale_change_weight` or `back` is present the flow crosses a
/// change of scale: the builder synthesizes a hidden intermediate node for
/// the flow-before-scale-change.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRelation {
    pub source: InterfaceRef,
    pub target: InterfaceRef,
    pub weight: Option<Expression>,
    pub scale_change_weight: Option<Expression>,
    pub back: Option<InterfaceRef>,
    pub back_weight: Option<Expression>,
}

impl FlowRelation {
    pub fn new(source: InterfaceRef, target: InterfaceRef, weight: Option<Expression>) -> Self {
        Self {
            source,
            target,
            weight,
            scale_change_weight: None,
            back: None,
            back_weight: None,
        }
    }
}

/// A change-of-scale dependency between two interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRelation {
    pub source: InterfaceRef,
    pub target: InterfaceRef,
    pub weight: Expression,
}

/// Hierarchical containment between processors, for bottom-up aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct PartOfRelation {
    pub parent: String,
    pub child: String,
    pub weight: Option<Expression>,
    /// If set, only interfaces present in both the child and the
    /// behave-as processor participate in the parent aggregate.
    pub behaves_as: Option<String>,
}

/// A quantity assigned to one interface for one time period.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub interface: InterfaceRef,
    pub period: String,
    pub value: Expression,
    pub observer: Option<String>,
    /// If set, the value is a multiplier relative to the named interface of
    /// the same processor; the builder turns it into a Scale edge.
    pub relative_to: Option<String>,
}

impl Observation {
    pub fn absolute(
        interface: InterfaceRef,
        period: impl Into<String>,
        value: impl Into<Expression>,
    ) -> Self {
        Self {
            interface,
            period: period.into(),
            value: value.into(),
            observer: None,
            relative_to: None,
        }
    }

    pub fn by(mut self, observer: impl Into<String>) -> Self {
        self.observer = Some(observer.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Number,
    Boolean,
    Code,
    String,
}

/// Default or override value of a parameter. Number/Boolean parameters are
/// evaluated; Code/String parameters pass through unevaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Expr(Expression),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ptype: ParameterType,
    pub default: Option<ParameterValue>,
}

impl Parameter {
    pub fn number(name: impl Into<String>, default: impl Into<Expression>) -> Self {
        Self {
            name: name.into(),
            ptype: ParameterType::Number,
            default: Some(ParameterValue::Expr(default.into())),
        }
    }
}

/// Scenario name -> parameter overrides. An empty statement means one
/// implicit scenario with no overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemStatement {
    pub scenarios: BTreeMap<String, BTreeMap<String, ParameterValue>>,
}

impl ProblemStatement {
    pub fn add_scenario(
        &mut self,
        name: impl Into<String>,
        overrides: BTreeMap<String, ParameterValue>,
    ) {
        self.scenarios.insert(name.into(), overrides);
    }
}
