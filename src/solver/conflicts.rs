//! Resolution of two independently derived values for the same node.
//!
//! The outcome is position-independent: `resolve(a, b)` and `resolve(b, a)`
//! pick the same winner.

use crate::config::{AggregationConflictPolicy, SolverConfig};
use crate::error::SolvingError;
use crate::results::{Computed, ComputationSource, FloatComputedTuple};

/// Two derivations of the same node agree when their values coincide up to
/// rounding; agreement is not a conflict.
pub fn values_agree(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[derive(Debug, Clone)]
pub struct ConflictPolicy {
    source_priority: Vec<ComputationSource>,
    aggregation_policy: AggregationConflictPolicy,
}

impl ConflictPolicy {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            source_priority: config.source_priority.clone(),
            aggregation_policy: config.aggregation_policy,
        }
    }

    /// Decides which of two values for `key` is authoritative.
    /// Returns `(taken, dismissed)`.
    pub fn resolve(
        &self,
        key: &str,
        a: FloatComputedTuple,
        b: FloatComputedTuple,
    ) -> Result<(FloatComputedTuple, FloatComputedTuple), SolvingError> {
        // Identical source on both sides is an invariant violation, not a
        // business conflict.
        if let (Some(sa), Some(sb)) = (a.source, b.source) {
            if sa == sb {
                return Err(SolvingError::DuplicateSource {
                    key: key.to_string(),
                    claimed: sa,
                });
            }
        }

        let a_agg = a.source.map_or(false, ComputationSource::is_aggregation);
        let b_agg = b.source.map_or(false, ComputationSource::is_aggregation);

        // Exactly one side is an aggregation: the configured policy decides
        // between the aggregate and the observed/upper value.
        if a_agg != b_agg {
            let aggregate_wins =
                self.aggregation_policy == AggregationConflictPolicy::TakeLowerAggregation;
            return Ok(if a_agg == aggregate_wins {
                (a, b)
            } else {
                (b, a)
            });
        }

        // Both derived: the source earlier in the priority list wins.
        if let (Some(sa), Some(sb)) = (a.source, b.source) {
            let rank = |s: ComputationSource| {
                self.source_priority
                    .iter()
                    .position(|&x| x == s)
                    .unwrap_or(usize::MAX)
            };
            return Ok(if rank(sa) <= rank(sb) { (a, b) } else { (b, a) });
        }

        // Raw observation versus a non-aggregation computed value: the
        // observation always wins.
        match (a.computed, b.computed) {
            (Computed::No, Computed::Yes) => Ok((a, b)),
            (Computed::Yes, Computed::No) => Ok((b, a)),
            // Two raw observations reaching this point means observer
            // disambiguation was skipped upstream; keep the first seen.
            _ => Ok((a, b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;

    fn policy() -> ConflictPolicy {
        ConflictPolicy::from_config(&SolverConfig::default())
    }

    fn derived(value: f64, source: ComputationSource) -> FloatComputedTuple {
        FloatComputedTuple::derived(value, "n", source)
    }

    #[test]
    fn same_source_is_invariant_violation() {
        let err = policy()
            .resolve(
                "n",
                derived(1.0, ComputationSource::Flow),
                derived(2.0, ComputationSource::Flow),
            )
            .unwrap_err();
        assert!(matches!(err, SolvingError::DuplicateSource { .. }));
    }

    #[test]
    fn priority_list_decides_between_computed_sources() {
        let (taken, dismissed) = policy()
            .resolve(
                "n",
                derived(1.0, ComputationSource::Scale),
                derived(2.0, ComputationSource::Flow),
            )
            .unwrap();
        // Default priority lists Flow before Scale.
        assert_eq!(taken.source, Some(ComputationSource::Flow));
        assert_eq!(dismissed.source, Some(ComputationSource::Scale));
    }

    #[test]
    fn resolution_is_symmetric_for_aggregation_sources() {
        let p = policy();
        let a = derived(1.0, ComputationSource::PartOfAggregation);
        let b = derived(2.0, ComputationSource::InterfaceTypeAggregation);
        let (t1, d1) = p.resolve("n", a.clone(), b.clone()).unwrap();
        let (t2, d2) = p.resolve("n", b, a).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(d1, d2);
    }

    #[test]
    fn take_upper_prefers_observation_over_aggregate() {
        let obs = FloatComputedTuple::observed(60.0, "n", None);
        let agg = derived(50.0, ComputationSource::PartOfAggregation);
        let (taken, dismissed) = policy().resolve("n", agg, obs.clone()).unwrap();
        assert_eq!(taken, obs);
        assert_eq!(dismissed.value, 50.0);
    }

    #[test]
    fn take_lower_lets_aggregate_override() {
        let mut config = SolverConfig::default();
        config.aggregation_policy = AggregationConflictPolicy::TakeLowerAggregation;
        let p = ConflictPolicy::from_config(&config);
        let obs = FloatComputedTuple::observed(60.0, "n", None);
        let agg = derived(50.0, ComputationSource::PartOfAggregation);
        let (taken, _) = p.resolve("n", agg.clone(), obs).unwrap();
        assert_eq!(taken, agg);
    }

    #[test]
    fn observation_beats_non_aggregation_computation() {
        let obs = FloatComputedTuple::observed(60.0, "n", None);
        let flow = derived(50.0, ComputationSource::Flow);
        let (taken, dismissed) = policy().resolve("n", flow, obs.clone()).unwrap();
        assert_eq!(taken, obs);
        assert_eq!(dismissed.source, Some(ComputationSource::Flow));
    }
}
