//! Scenario parameter resolution.
//!
//! Starts from declared defaults, overlays scenario overrides, then resolves
//! Number/Boolean expressions to literals. Parameters may reference other
//! parameters (forward references included); a dependency cycle is fatal.

use crate::error::SolvingError;
use crate::evaluation::expression::{evaluate, EvalOutcome, Expression};
use crate::model::{Parameter, ParameterType, ParameterValue};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fully resolved parameter set for one scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedParams {
    /// Number and Boolean parameters (booleans as 0.0 / 1.0).
    pub numeric: HashMap<String, f64>,
    /// Code and String parameters, passed through unevaluated.
    pub text: HashMap<String, String>,
}

/// Resolves `parameters` under `overrides`.
///
/// Numeric parameters whose expressions depend on each other are resolved
/// iteratively, injecting each resolved value into the environment, until
/// no more progress is possible. A cycle of any length is fatal, as is a
/// parameter still unresolved once iteration stalls.
pub fn evaluate_parameters_for_scenario(
    parameters: &[Parameter],
    overrides: &BTreeMap<String, ParameterValue>,
) -> Result<EvaluatedParams, SolvingError> {
    let mut out = EvaluatedParams::default();
    // name -> effective expression, for numeric parameters still pending
    let mut pending: BTreeMap<String, Expression> = BTreeMap::new();

    for param in parameters {
        let effective = overrides.get(&param.name).or(param.default.as_ref());
        let Some(effective) = effective else { continue };
        match (param.ptype, effective) {
            (ParameterType::Code | ParameterType::String, ParameterValue::Text(t)) => {
                out.text.insert(param.name.clone(), t.clone());
            }
            (ParameterType::Code | ParameterType::String, ParameterValue::Expr(e)) => {
                // A code/string parameter overridden with a bare literal.
                if let Expression::Literal(v) = e {
                    out.text.insert(param.name.clone(), v.to_string());
                } else {
                    return Err(SolvingError::UnresolvedParameters(format!(
                        "non-literal expression for text parameter '{}'",
                        param.name
                    )));
                }
            }
            (ParameterType::Number | ParameterType::Boolean, ParameterValue::Expr(e)) => {
                pending.insert(param.name.clone(), e.clone());
            }
            (ParameterType::Number | ParameterType::Boolean, ParameterValue::Text(t)) => {
                return Err(SolvingError::UnresolvedParameters(format!(
                    "text value '{}' for numeric parameter '{}'",
                    t, param.name
                )));
            }
        }
    }

    check_dependency_cycles(&pending)?;

    // Iterate until stalled; the cycle check above guarantees this converges
    // for any self-contained parameter set.
    loop {
        let mut progressed = false;
        let names: Vec<String> = pending.keys().cloned().collect();
        for name in names {
            let expr = &pending[&name];
            match evaluate(expr, &out.numeric)? {
                EvalOutcome::Value(v) => {
                    debug!(parameter = %name, value = v, "parameter resolved");
                    out.numeric.insert(name.clone(), v);
                    pending.remove(&name);
                    progressed = true;
                }
                EvalOutcome::Missing(_) => {}
            }
        }
        if !progressed {
            break;
        }
    }

    if let Some((name, expr)) = pending.iter().next() {
        let missing = match evaluate(expr, &out.numeric)? {
            EvalOutcome::Missing(names) => names.into_iter().collect::<Vec<_>>().join(", "),
            _ => String::new(),
        };
        return Err(SolvingError::UnresolvedParameters(format!(
            "'{}' (missing: {})",
            name, missing
        )));
    }

    Ok(out)
}

/// Builds the parameter dependency graph and rejects any cycle.
fn check_dependency_cycles(pending: &BTreeMap<String, Expression>) -> Result<(), SolvingError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index = HashMap::new();
    for name in pending.keys() {
        index.insert(name.as_str(), graph.add_node(name.as_str()));
    }
    for (name, expr) in pending {
        for dep in expr.referenced_names() {
            if let Some(&dep_idx) = index.get(dep.as_str()) {
                graph.add_edge(dep_idx, index[name.as_str()], ());
            }
        }
    }
    toposort(&graph, None)
        .map_err(|cycle| SolvingError::CyclicParameters(graph[cycle.node_id()].to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(name: &str, expr: Expression) -> Parameter {
        Parameter {
            name: name.to_string(),
            ptype: ParameterType::Number,
            default: Some(ParameterValue::Expr(expr)),
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let params = vec![Parameter::number("p1", 1.0)];
        let overrides = BTreeMap::from([(
            "p1".to_string(),
            ParameterValue::Expr(Expression::Literal(10.0)),
        )]);
        let out = evaluate_parameters_for_scenario(&params, &overrides).unwrap();
        assert_eq!(out.numeric["p1"], 10.0);
    }

    #[test]
    fn forward_references_resolve() {
        // p1 is declared before p2 but depends on it.
        let params = vec![
            number("p1", Expression::add(Expression::name("p2"), 1.0.into())),
            number("p2", Expression::Literal(4.0)),
        ];
        let out = evaluate_parameters_for_scenario(&params, &BTreeMap::new()).unwrap();
        assert_eq!(out.numeric["p1"], 5.0);
        assert_eq!(out.numeric["p2"], 4.0);
    }

    #[test]
    fn cyclic_parameters_are_fatal() {
        let params = vec![
            number("p1", Expression::add(Expression::name("p2"), 1.0.into())),
            number("p2", Expression::add(Expression::name("p1"), 1.0.into())),
        ];
        let err = evaluate_parameters_for_scenario(&params, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SolvingError::CyclicParameters(_)));
    }

    #[test]
    fn unknown_reference_is_fatal_after_iteration() {
        let params = vec![number("p1", Expression::name("nowhere"))];
        let err = evaluate_parameters_for_scenario(&params, &BTreeMap::new()).unwrap_err();
        match err {
            SolvingError::UnresolvedParameters(msg) => assert!(msg.contains("nowhere")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn text_parameters_pass_through() {
        let params = vec![Parameter {
            name: "method".to_string(),
            ptype: ParameterType::Code,
            default: Some(ParameterValue::Text("LCIA".to_string())),
        }];
        let out = evaluate_parameters_for_scenario(&params, &BTreeMap::new()).unwrap();
        assert_eq!(out.text["method"], "LCIA");
        assert!(out.numeric.is_empty());
    }
}
