//! Result records handed to the out-of-scope exporter layer.

use crate::graph::InterfaceNode;
use crate::issues::Issue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The algorithmic path by which a value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComputationSource {
    Flow,
    Scale,
    ScaleChange,
    InterfaceTypeAggregation,
    PartOfAggregation,
}

impl ComputationSource {
    pub const ALL: [ComputationSource; 5] = [
        ComputationSource::Flow,
        ComputationSource::Scale,
        ComputationSource::ScaleChange,
        ComputationSource::InterfaceTypeAggregation,
        ComputationSource::PartOfAggregation,
    ];

    pub fn is_aggregation(self) -> bool {
        matches!(
            self,
            ComputationSource::InterfaceTypeAggregation | ComputationSource::PartOfAggregation
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "Flow" => Some(ComputationSource::Flow),
            "Scale" => Some(ComputationSource::Scale),
            "ScaleChange" => Some(ComputationSource::ScaleChange),
            "InterfaceTypeAggregation" => Some(ComputationSource::InterfaceTypeAggregation),
            "PartOfAggregation" => Some(ComputationSource::PartOfAggregation),
            _ => None,
        }
    }
}

/// Whether a value was derived (`Yes`) or directly observed (`No`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Computed {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Total,
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictMarker {
    No,
    Taken,
    Dismissed,
}

/// The value record stored per node and result bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatComputedTuple {
    pub value: f64,
    /// Symbolic label for auditing (usually the node key).
    pub label: String,
    pub computed: Computed,
    pub observer: Option<String>,
    pub source: Option<ComputationSource>,
}

impl FloatComputedTuple {
    pub fn observed(value: f64, label: impl Into<String>, observer: Option<String>) -> Self {
        Self {
            value,
            label: label.into(),
            computed: Computed::No,
            observer,
            source: None,
        }
    }

    pub fn derived(value: f64, label: impl Into<String>, source: ComputationSource) -> Self {
        Self {
            value,
            label: label.into(),
            computed: Computed::Yes,
            observer: None,
            source: Some(source),
        }
    }
}

/// Key of one result bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub scenario: String,
    pub period: String,
    pub scope: Scope,
    pub conflict: ConflictMarker,
}

impl ResultKey {
    pub fn total(scenario: &str, period: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            period: period.to_string(),
            scope: Scope::Total,
            conflict: ConflictMarker::No,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_conflict(mut self, conflict: ConflictMarker) -> Self {
        self.conflict = conflict;
        self
    }
}

/// node key -> value record.
pub type ValueMap = BTreeMap<String, FloatComputedTuple>;

/// The full solver output: node table, per-bucket values, and the flat
/// issue list. BTreeMap keys give exporters a deterministic order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverResults {
    pub nodes: BTreeMap<String, InterfaceNode>,
    pub results: BTreeMap<ResultKey, ValueMap>,
    pub issues: Vec<Issue>,
}

impl SolverResults {
    pub fn bucket(&self, key: &ResultKey) -> Option<&ValueMap> {
        self.results.get(key)
    }

    pub fn value(&self, key: &ResultKey, node: &str) -> Option<f64> {
        self.results.get(key)?.get(node).map(|t| t.value)
    }
}
