//! Solver configuration, read from named global parameters and parsed once
//! into typed values at the API boundary.

use crate::error::SolvingError;
use crate::results::ComputationSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PARAM_OBSERVERS_PRIORITY: &str = "NISSolverObserversPriority";
pub const PARAM_MISSING_VALUE_POLICY: &str = "NISSolverMissingValueResolutionPolicy";
pub const PARAM_SOURCES_PRIORITY: &str = "NISSolverComputationSourcesPriority";
pub const PARAM_AGGREGATION_CONFLICT_POLICY: &str = "NISSolverAggregationConflictResolutionPolicy";

/// How hierarchical aggregation treats a child without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValuePolicy {
    /// The whole parent aggregation is aborted.
    Invalidate,
    /// The missing child contributes zero.
    UseZero,
}

/// Who wins when an aggregate collides with an observed or otherwise
/// computed value for the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationConflictPolicy {
    /// The existing (upper/observed) value wins over the new aggregate.
    TakeUpper,
    /// The aggregate computed from below overrides.
    TakeLowerAggregation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Observer names, highest priority first.
    pub observer_priority: Vec<String>,
    pub missing_value_policy: MissingValuePolicy,
    /// Total order over the five computation sources.
    pub source_priority: Vec<ComputationSource>,
    pub aggregation_policy: AggregationConflictPolicy,
    /// Defensive cap on outer fixpoint iterations per (scenario, period).
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            observer_priority: Vec::new(),
            missing_value_policy: MissingValuePolicy::Invalidate,
            source_priority: ComputationSource::ALL.to_vec(),
            aggregation_policy: AggregationConflictPolicy::TakeUpper,
            max_iterations: 100,
        }
    }
}

impl SolverConfig {
    /// Builds the configuration from the global parameter map, validating
    /// list shapes and enum spellings. Absent parameters keep defaults.
    pub fn from_parameters(params: &HashMap<String, String>) -> Result<Self, SolvingError> {
        let mut config = SolverConfig::default();

        if let Some(list) = params.get(PARAM_OBSERVERS_PRIORITY) {
            config.observer_priority = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(policy) = params.get(PARAM_MISSING_VALUE_POLICY) {
            config.missing_value_policy = match policy.trim() {
                "Invalidate" => MissingValuePolicy::Invalidate,
                "UseZero" => MissingValuePolicy::UseZero,
                other => {
                    return Err(SolvingError::InvalidConfiguration(format!(
                        "unknown missing-value policy '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(list) = params.get(PARAM_SOURCES_PRIORITY) {
            config.source_priority = parse_source_priority(list)?;
        }

        if let Some(policy) = params.get(PARAM_AGGREGATION_CONFLICT_POLICY) {
            config.aggregation_policy = match policy.trim() {
                "TakeUpper" => AggregationConflictPolicy::TakeUpper,
                "TakeLowerAggregation" => AggregationConflictPolicy::TakeLowerAggregation,
                other => {
                    return Err(SolvingError::InvalidConfiguration(format!(
                        "unknown aggregation conflict policy '{}'",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }
}

/// Parses and validates the comma-separated source priority list: every
/// source exactly once, no strangers.
fn parse_source_priority(list: &str) -> Result<Vec<ComputationSource>, SolvingError> {
    let mut sources = Vec::new();
    for name in list.split(',') {
        let source = ComputationSource::parse(name).ok_or_else(|| {
            SolvingError::InvalidConfiguration(format!(
                "unknown computation source '{}'",
                name.trim()
            ))
        })?;
        if sources.contains(&source) {
            return Err(SolvingError::InvalidConfiguration(format!(
                "computation source '{}' listed twice",
                name.trim()
            )));
        }
        sources.push(source);
    }
    if sources.len() != ComputationSource::ALL.len() {
        return Err(SolvingError::InvalidConfiguration(format!(
            "source priority list names {} of {} sources",
            sources.len(),
            ComputationSource::ALL.len()
        )));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_sane() {
        let config = SolverConfig::default();
        assert_eq!(config.source_priority.len(), 5);
        assert_eq!(config.missing_value_policy, MissingValuePolicy::Invalidate);
    }

    #[test]
    fn parses_full_configuration() {
        let params = HashMap::from([
            (
                PARAM_OBSERVERS_PRIORITY.to_string(),
                "FAO, Eurostat".to_string(),
            ),
            (PARAM_MISSING_VALUE_POLICY.to_string(), "UseZero".to_string()),
            (
                PARAM_SOURCES_PRIORITY.to_string(),
                "Scale,Flow,ScaleChange,PartOfAggregation,InterfaceTypeAggregation".to_string(),
            ),
            (
                PARAM_AGGREGATION_CONFLICT_POLICY.to_string(),
                "TakeLowerAggregation".to_string(),
            ),
        ]);
        let config = SolverConfig::from_parameters(&params).unwrap();
        assert_eq!(config.observer_priority, vec!["FAO", "Eurostat"]);
        assert_eq!(config.missing_value_policy, MissingValuePolicy::UseZero);
        assert_eq!(config.source_priority[0], ComputationSource::Scale);
        assert_eq!(
            config.aggregation_policy,
            AggregationConflictPolicy::TakeLowerAggregation
        );
    }

    #[rstest]
    #[case("Flow,Scale,ScaleChange,PartOfAggregation")] // wrong length
    #[case("Flow,Flow,Scale,ScaleChange,PartOfAggregation")] // duplicate
    #[case("Flow,Scale,ScaleChange,PartOfAggregation,Sankey")] // unknown
    fn malformed_source_priority_is_rejected(#[case] list: &str) {
        let params = HashMap::from([(PARAM_SOURCES_PRIORITY.to_string(), list.to_string())]);
        assert!(matches!(
            SolverConfig::from_parameters(&params),
            Err(SolvingError::InvalidConfiguration(_))
        ));
    }
}
