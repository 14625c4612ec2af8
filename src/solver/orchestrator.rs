//! Top-level orchestration: one solve per (scenario, period) pair.
//!
//! Relation graphs are built once from the model; each pair then resolves
//! its parameter set, compiles the graphs to numeric weights and runs the
//! five computation sources to fixpoint. Pairs are independent and run in
//! parallel; a fatal error in one pair becomes an error issue tagged with
//! that pair and does not abort the others.

use crate::config::{MissingValuePolicy, SolverConfig};
use crate::error::SolvingError;
use crate::evaluation::expression::{evaluate, EvalOutcome, Expression};
use crate::evaluation::params::evaluate_parameters_for_scenario;
use crate::graph::comp_graph::ComputationGraph;
use crate::graph::hierarchy::ResolvedHierarchy;
use crate::graph::relations::{build_relation_graphs, RelationGraphs};
use crate::issues::Issue;
use crate::model::{ModelRegistry, Observation};
use crate::results::{
    ComputationSource, ConflictMarker, FloatComputedTuple, ResultKey, Scope, SolverResults,
    ValueMap,
};
use crate::solver::aggregation::evaluate_hierarchy;
use crate::solver::conflicts::{values_agree, ConflictPolicy};
use crate::solver::flow_inference::{complete_split_back_weights, infer_weights};
use crate::solver::graph_eval::evaluate_graph;
use crate::solver::scope::split_scopes;
use crate::solver::EvaluationOutput;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Solves the declared model for every (scenario, period) pair.
pub fn solve(model: &ModelRegistry, config: &SolverConfig) -> SolverResults {
    let mut results = SolverResults::default();
    // Builder warnings go straight into the result issues, so they survive
    // even a fatal analysis error.
    let graphs = match build_relation_graphs(model, &mut results.issues) {
        Ok(graphs) => graphs,
        Err(err) => {
            results
                .issues
                .push(Issue::error(format!("model analysis failed: {err}")));
            return results;
        }
    };
    results.nodes = graphs.nodes.inner().clone();

    let periods = model.periods();
    if periods.is_empty() {
        results.issues.push(Issue::warning(
            "model carries no absolute observations; nothing to solve",
        ));
        return results;
    }

    let policy = ConflictPolicy::from_config(config);
    let pairs: Vec<(String, String)> = model
        .scenarios()
        .into_iter()
        .flat_map(|s| periods.iter().map(move |p| (s.clone(), p.clone())))
        .collect();

    let outcomes: Vec<_> = pairs
        .par_iter()
        .map(|(scenario, period)| {
            let outcome = solve_pair(model, &graphs, config, &policy, scenario, period);
            (scenario.as_str(), period.as_str(), outcome)
        })
        .collect();

    for (scenario, period, outcome) in outcomes {
        match outcome {
            Ok(pair) => {
                for (key, bucket) in pair.buckets {
                    results.results.insert(key, bucket);
                }
                results.issues.extend(pair.issues);
            }
            Err(err) => results
                .issues
                .push(Issue::error(format!("solving failed: {err}")).tagged(scenario, period)),
        }
    }
    results
}

struct PairOutput {
    buckets: Vec<(ResultKey, ValueMap)>,
    issues: Vec<Issue>,
}

fn solve_pair(
    model: &ModelRegistry,
    graphs: &RelationGraphs,
    config: &SolverConfig,
    policy: &ConflictPolicy,
    scenario: &str,
    period: &str,
) -> Result<PairOutput, SolvingError> {
    let mut issues = Vec::new();

    let no_overrides = BTreeMap::new();
    let overrides = model
        .problem
        .scenarios
        .get(scenario)
        .unwrap_or(&no_overrides);
    let params = evaluate_parameters_for_scenario(&model.parameters, overrides)?;
    let env = params.numeric;

    let (mut flow, found) = graphs.flow.resolve(&env, Some(period))?;
    issues.extend(found);
    issues.extend(infer_weights(&mut flow));
    let (scale, found) = graphs.scale.resolve(&env, Some(period))?;
    issues.extend(found);
    let (mut scale_change, found) = graphs.scale_change.resolve(&env, Some(period))?;
    issues.extend(found);
    complete_split_back_weights(&mut scale_change, &mut issues);
    let (part_of, found) = graphs.part_of.resolve(&env)?;
    issues.extend(found);
    let (interface_type, found) = graphs.interface_type.resolve(&env)?;
    issues.extend(found);

    let mut known = ValueMap::new();
    let pending = seed_observations(model, graphs, config, period, &env, &mut known, &mut issues)?;

    let mut state = FixpointState {
        config,
        policy,
        flow: &flow,
        scale: &scale,
        scale_change: &scale_change,
        part_of: &part_of,
        interface_type: &interface_type,
        env,
        known,
        pending,
        prev: ComputationSource::ALL
            .iter()
            .map(|&s| (s, BTreeMap::new()))
            .collect(),
        taken: ValueMap::new(),
        dismissed: ValueMap::new(),
        iterations: 0,
    };
    state.run(MissingValuePolicy::Invalidate)?;
    if config.missing_value_policy == MissingValuePolicy::UseZero {
        state.run(MissingValuePolicy::UseZero)?;
    }
    debug!(scenario, period, iterations = state.iterations, "fixpoint reached");

    let final_env = state.extended_env();
    for obs in &state.pending {
        let missing = match evaluate(&obs.value, &final_env)? {
            EvalOutcome::Missing(names) => names.into_iter().collect::<Vec<_>>().join(", "),
            EvalOutcome::Value(_) => String::new(),
        };
        issues.push(Issue::warning(format!(
            "observation on '{}' never evaluated (missing: {})",
            obs.key, missing
        )));
    }
    for (name, graph) in [
        ("flow", &flow),
        ("scale", &scale),
        ("scale-change", &scale_change),
    ] {
        let unresolved: Vec<String> = graph
            .node_keys()
            .into_iter()
            .filter(|k| !state.known.contains_key(k))
            .collect();
        if !unresolved.is_empty() {
            issues.push(Issue::warning(format!(
                "{} {} graph node(s) left without value: {}",
                unresolved.len(),
                name,
                unresolved.join(", ")
            )));
        }
    }

    let (internal, external) = split_scopes(
        &state.known,
        graphs.nodes.inner(),
        &part_of,
        &interface_type,
        &flow,
    );

    let base = ResultKey::total(scenario, period);
    let mut buckets = vec![(base.clone(), state.known)];
    if !state.taken.is_empty() {
        buckets.push((
            base.clone().with_conflict(ConflictMarker::Taken),
            state.taken,
        ));
        buckets.push((
            base.clone().with_conflict(ConflictMarker::Dismissed),
            state.dismissed,
        ));
    }
    if !internal.is_empty() {
        buckets.push((base.clone().with_scope(Scope::Internal), internal));
    }
    if !external.is_empty() {
        buckets.push((base.with_scope(Scope::External), external));
    }

    Ok(PairOutput {
        buckets,
        issues: issues
            .into_iter()
            .map(|i| i.tagged(scenario, period))
            .collect(),
    })
}

/// An observation whose value expression still references unbound names;
/// retried each iteration with the known node values added to the
/// environment.
struct PendingObservation {
    key: String,
    value: Expression,
    observer: Option<String>,
}

fn seed_observations(
    model: &ModelRegistry,
    graphs: &RelationGraphs,
    config: &SolverConfig,
    period: &str,
    env: &HashMap<String, f64>,
    known: &mut ValueMap,
    issues: &mut Vec<Issue>,
) -> Result<Vec<PendingObservation>, SolvingError> {
    // Relative observations became Scale edges at build time; only absolute
    // ones seed values.
    let mut by_key: BTreeMap<String, Vec<&Observation>> = BTreeMap::new();
    for obs in &model.observations {
        if obs.relative_to.is_some()
            || obs.period != period
            || model.is_archetype(&obs.interface.processor)
        {
            continue;
        }
        let key = format!("{}:{}", obs.interface.processor, obs.interface.interface);
        if graphs.nodes.get(&key).is_none() {
            issues.push(Issue::warning(format!(
                "observation references undeclared interface '{}'",
                key
            )));
            continue;
        }
        by_key.entry(key).or_default().push(obs);
    }

    let mut pending = Vec::new();
    for (key, candidates) in by_key {
        let chosen = pick_observation(&key, period, &candidates, &config.observer_priority)?;
        match evaluate(&chosen.value, env)? {
            EvalOutcome::Value(v) => {
                known.insert(
                    key.clone(),
                    FloatComputedTuple::observed(v, key.as_str(), chosen.observer.clone()),
                );
            }
            EvalOutcome::Missing(_) => pending.push(PendingObservation {
                key,
                value: chosen.value.clone(),
                observer: chosen.observer.clone(),
            }),
        }
    }
    Ok(pending)
}

/// Picks the authoritative observation among several for the same node and
/// period. The observer priority list decides; without a unique best-ranked
/// observer the set is ambiguous and solving the pair aborts.
fn pick_observation<'m>(
    key: &str,
    period: &str,
    candidates: &[&'m Observation],
    priority: &[String],
) -> Result<&'m Observation, SolvingError> {
    if candidates.len() == 1 {
        return Ok(candidates[0]);
    }
    let ambiguous = || SolvingError::AmbiguousObservations {
        key: key.to_string(),
        period: period.to_string(),
    };
    let rank = |o: &Observation| {
        o.observer
            .as_deref()
            .and_then(|name| priority.iter().position(|p| p == name))
            .unwrap_or(usize::MAX)
    };
    let best = candidates
        .iter()
        .copied()
        .min_by_key(|o| rank(o))
        .ok_or_else(ambiguous)?;
    let best_rank = rank(best);
    if best_rank == usize::MAX || candidates.iter().filter(|o| rank(o) == best_rank).count() > 1 {
        return Err(ambiguous());
    }
    Ok(best)
}

/// Mutable solving state of one (scenario, period) pair across fixpoint
/// iterations. `prev` caches, per computation source, the authoritative
/// value of every node that source has already settled, so nothing is
/// re-derived or re-reported across iterations.
struct FixpointState<'a> {
    config: &'a SolverConfig,
    policy: &'a ConflictPolicy,
    flow: &'a ComputationGraph,
    scale: &'a ComputationGraph,
    scale_change: &'a ComputationGraph,
    part_of: &'a ResolvedHierarchy,
    interface_type: &'a ResolvedHierarchy,
    env: HashMap<String, f64>,
    known: ValueMap,
    pending: Vec<PendingObservation>,
    prev: BTreeMap<ComputationSource, BTreeMap<String, f64>>,
    taken: ValueMap,
    dismissed: ValueMap,
    iterations: usize,
}

impl FixpointState<'_> {
    /// Sweeps the sources in priority order until a full round makes no
    /// progress. The iteration counter is shared across policy passes, so
    /// the configured cap bounds the pair as a whole.
    fn run(&mut self, missing: MissingValuePolicy) -> Result<(), SolvingError> {
        let order = self.config.source_priority.clone();
        loop {
            self.iterations += 1;
            if self.iterations > self.config.max_iterations {
                return Err(SolvingError::IterationCapExceeded(self.config.max_iterations));
            }
            let mut changed = false;
            for &source in &order {
                changed |= self.step(source, missing)?;
            }
            changed |= self.retry_pending()?;
            if !changed {
                return Ok(());
            }
        }
    }

    fn step(
        &mut self,
        source: ComputationSource,
        missing: MissingValuePolicy,
    ) -> Result<bool, SolvingError> {
        let mut prev = self.prev.remove(&source).unwrap_or_default();
        let out = match source {
            ComputationSource::Flow => {
                evaluate_graph(self.flow, source, &self.known, &prev, self.policy)?
            }
            ComputationSource::Scale => {
                evaluate_graph(self.scale, source, &self.known, &prev, self.policy)?
            }
            ComputationSource::ScaleChange => {
                evaluate_graph(self.scale_change, source, &self.known, &prev, self.policy)?
            }
            ComputationSource::InterfaceTypeAggregation => evaluate_hierarchy(
                self.interface_type,
                source,
                &self.known,
                &prev,
                self.policy,
                missing,
            )?,
            ComputationSource::PartOfAggregation => evaluate_hierarchy(
                self.part_of,
                source,
                &self.known,
                &prev,
                self.policy,
                missing,
            )?,
        };

        let mut changed = false;
        let EvaluationOutput {
            computed,
            taken,
            mut dismissed,
        } = out;
        for (key, tuple) in computed {
            prev.insert(key.clone(), tuple.value);
            self.known.insert(key, tuple);
            changed = true;
        }
        for (key, winner) in taken {
            // The authoritative value goes into the per-source cache so the
            // losing derivation is not attempted again next iteration.
            prev.insert(key.clone(), winner.value);
            if let Some(loser) = dismissed.remove(&key) {
                self.dismissed.insert(key.clone(), loser);
            }
            if self.known.get(&key) != Some(&winner) {
                self.known.insert(key.clone(), winner.clone());
                changed = true;
            }
            self.taken.insert(key, winner);
        }
        self.prev.insert(source, prev);
        Ok(changed)
    }

    /// Retries pending observations against the environment extended with
    /// every known node value; interface keys are valid expression names.
    fn retry_pending(&mut self) -> Result<bool, SolvingError> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let env = self.extended_env();
        let mut changed = false;
        let mut still_pending = Vec::new();
        for obs in std::mem::take(&mut self.pending) {
            match evaluate(&obs.value, &env)? {
                EvalOutcome::Value(v) => {
                    let tuple =
                        FloatComputedTuple::observed(v, obs.key.as_str(), obs.observer.clone());
                    match self.known.get(&obs.key) {
                        Some(existing) if values_agree(v, existing.value) => {}
                        Some(existing) => {
                            let (winner, loser) =
                                self.policy.resolve(&obs.key, tuple, existing.clone())?;
                            // As in `step`: the losing source's cache must
                            // carry the authoritative value, or its next pass
                            // keeps feeding the dismissed one downstream.
                            if let Some(source) = loser.source {
                                self.prev
                                    .entry(source)
                                    .or_default()
                                    .insert(obs.key.clone(), winner.value);
                            }
                            self.dismissed.insert(obs.key.clone(), loser);
                            self.known.insert(obs.key.clone(), winner.clone());
                            self.taken.insert(obs.key.clone(), winner);
                        }
                        None => {
                            self.known.insert(obs.key.clone(), tuple);
                        }
                    }
                    changed = true;
                }
                EvalOutcome::Missing(_) => still_pending.push(obs),
            }
        }
        self.pending = still_pending;
        Ok(changed)
    }

    fn extended_env(&self) -> HashMap<String, f64> {
        let mut env = self.env.clone();
        for (key, tuple) in &self.known {
            env.insert(key.clone(), tuple.value);
        }
        env
    }
}
