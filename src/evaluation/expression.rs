//! Pre-parsed arithmetic expressions and the evaluator adapter.
//!
//! The expression-language *grammar* lives outside this crate; declarations
//! arrive already parsed into this tagged AST. The adapter contract is:
//! given an expression and a binding environment, return either a resolved
//! number or the set of names still missing. Evaluation is pure.

use crate::error::SolvingError;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A literal number, a named reference (parameter or interface key), or a
/// binary combination of the two.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(f64),
    Name(String),
    Neg(Box<Expression>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    pub fn name(n: impl Into<String>) -> Self {
        Expression::Name(n.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expression, rhs: Expression) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn mul(lhs: Expression, rhs: Expression) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    /// All names referenced anywhere in the expression tree.
    pub fn referenced_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Name(n) => {
                names.insert(n.clone());
            }
            Expression::Neg(inner) => inner.collect_names(names),
            Expression::Binary { lhs, rhs, .. } => {
                lhs.collect_names(names);
                rhs.collect_names(names);
            }
        }
    }
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Expression::Literal(v)
    }
}

/// Result of evaluating an expression against a binding environment.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Value(f64),
    /// The expression references names absent from the environment.
    Missing(BTreeSet<String>),
}

/// Evaluates `expr` against `known`. A plain literal short-circuits; any
/// referenced name absent from `known` makes the whole expression pending,
/// reporting the full set of missing names.
pub fn evaluate(
    expr: &Expression,
    known: &HashMap<String, f64>,
) -> Result<EvalOutcome, SolvingError> {
    let missing: BTreeSet<String> = expr
        .referenced_names()
        .into_iter()
        .filter(|n| !known.contains_key(n))
        .collect();
    if !missing.is_empty() {
        return Ok(EvalOutcome::Missing(missing));
    }
    Ok(EvalOutcome::Value(eval_resolved(expr, known)?))
}

fn eval_resolved(expr: &Expression, known: &HashMap<String, f64>) -> Result<f64, SolvingError> {
    match expr {
        Expression::Literal(v) => Ok(*v),
        // Presence was checked up front.
        Expression::Name(n) => Ok(known[n]),
        Expression::Neg(inner) => Ok(-eval_resolved(inner, known)?),
        Expression::Binary { op, lhs, rhs } => {
            let l = eval_resolved(lhs, known)?;
            let r = eval_resolved(rhs, known)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        return Err(SolvingError::DivisionByZero(format!("{:?}", expr)));
                    }
                    Ok(l / r)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_short_circuits() {
        let known = HashMap::new();
        let out = evaluate(&Expression::Literal(4.5), &known).unwrap();
        assert_eq!(out, EvalOutcome::Value(4.5));
    }

    #[test]
    fn missing_names_are_reported_together() {
        let known = HashMap::from([("p1".to_string(), 2.0)]);
        let expr = Expression::add(
            Expression::name("p1"),
            Expression::mul(Expression::name("p2"), Expression::name("p3")),
        );
        match evaluate(&expr, &known).unwrap() {
            EvalOutcome::Missing(names) => {
                assert_eq!(
                    names.into_iter().collect::<Vec<_>>(),
                    vec!["p2".to_string(), "p3".to_string()]
                );
            }
            other => panic!("expected Missing, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_over_bound_names() {
        let known = HashMap::from([("p1".to_string(), 10.0)]);
        let expr = Expression::mul(Expression::Literal(5.0), Expression::name("p1"));
        assert_eq!(evaluate(&expr, &known).unwrap(), EvalOutcome::Value(50.0));
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let known = HashMap::new();
        let expr = Expression::binary(
            BinaryOp::Div,
            Expression::Literal(1.0),
            Expression::Literal(0.0),
        );
        assert!(matches!(
            evaluate(&expr, &known),
            Err(SolvingError::DivisionByZero(_))
        ));
    }
}
