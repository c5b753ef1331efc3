//! Scalar evaluation: `ScalarNode` -> `SqlValue` against the ambient
//! `BindingStack`, with SQL three-valued logic throughout.

use crate::error::{QuereusError, QuereusResult};
use crate::plan::scalar::{BinaryOp, CaseArm, ScalarNode, UnaryOp};
use crate::row::BindingStack;
use crate::temporal::{self, TemporalValue};
use crate::value::collation::CollationRegistry;
use crate::value::{Collation, SqlValue, TypeAffinity};
use std::cmp::Ordering;

pub struct EvalContext<'a> {
    pub bindings: &'a BindingStack,
    pub parameters: &'a [SqlValue],
    pub collations: &'a CollationRegistry,
}

fn resolve_collation(name: &str, ctx: &EvalContext) -> Collation {
    Collation::resolve(name, ctx.collations)
}

/// Three-valued AND: `FALSE` is absorbing regardless of which side is NULL.
fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Three-valued OR: `TRUE` is absorbing regardless of which side is NULL.
fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn bool_value(b: Option<bool>) -> SqlValue {
    match b {
        Some(b) => SqlValue::Boolean(b),
        None => SqlValue::Null,
    }
}

pub fn eval(node: &ScalarNode, ctx: &EvalContext) -> QuereusResult<SqlValue> {
    match node {
        ScalarNode::Literal { value, .. } => Ok(value.clone()),

        ScalarNode::ColumnRef { attribute, .. } => Ok(ctx
            .bindings
            .resolve(*attribute)
            .cloned()
            .unwrap_or(SqlValue::Null)),

        ScalarNode::Parameter { index, .. } => Ok(ctx
            .parameters
            .get(*index)
            .cloned()
            .unwrap_or(SqlValue::Null)),

        ScalarNode::Binary {
            op, left, right, ..
        } => eval_binary(*op, left, right, ctx),

        ScalarNode::Unary { op, operand, .. } => eval_unary(*op, operand, ctx),

        ScalarNode::Between { operand, low, high } => {
            let v = eval(operand, ctx)?;
            let lo = eval(low, ctx)?;
            let hi = eval(high, ctx)?;
            // `x BETWEEN a AND b` is `x >= a AND x <= b`; each comparison is
            // NULL if either side is NULL, but AND still absorbs on a
            // definite FALSE from the other side.
            let ge_lo = if v.is_null() || lo.is_null() {
                None
            } else {
                Some(v.compare(&lo, Collation::Binary) != Ordering::Less)
            };
            let le_hi = if v.is_null() || hi.is_null() {
                None
            } else {
                Some(v.compare(&hi, Collation::Binary) != Ordering::Greater)
            };
            Ok(bool_value(and3(ge_lo, le_hi)))
        }

        ScalarNode::Case {
            arms, else_branch, ..
        } => eval_case(arms, else_branch.as_deref(), ctx),

        ScalarNode::Cast { operand, target } => {
            let v = eval(operand, ctx)?;
            let affinity = target.kind.affinity().unwrap_or(TypeAffinity::Text);
            Ok(v.cast_to(affinity))
        }

        ScalarNode::Collate { operand, .. } => eval(operand, ctx),

        ScalarNode::FunctionCall { name, args, .. } => {
            let values: Vec<SqlValue> = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<QuereusResult<_>>()?;
            super::functions::call(name, &values)
        }

        ScalarNode::SubqueryScalar { .. } => Err(QuereusError::unsupported(
            "scalar subqueries are evaluated by the relational emitter, not eval()",
        )),
    }
}

fn eval_unary(op: UnaryOp, operand: &ScalarNode, ctx: &EvalContext) -> QuereusResult<SqlValue> {
    let v = eval(operand, ctx)?;
    Ok(match op {
        UnaryOp::Neg => match v {
            SqlValue::Integer(i) => SqlValue::Integer(-i),
            SqlValue::Real(r) => SqlValue::Real(-r),
            SqlValue::Null => SqlValue::Null,
            other => match other.as_f64() {
                Some(f) => SqlValue::Real(-f),
                None => SqlValue::Null,
            },
        },
        UnaryOp::Not => bool_value(v.as_bool().map(|b| !b)),
        UnaryOp::IsNull => SqlValue::Boolean(v.is_null()),
        UnaryOp::IsNotNull => SqlValue::Boolean(!v.is_null()),
    })
}

fn eval_binary(
    op: BinaryOp,
    left: &ScalarNode,
    right: &ScalarNode,
    ctx: &EvalContext,
) -> QuereusResult<SqlValue> {
    // AND/OR short-circuit NULL per three-valued logic before touching the
    // other operand's value at all, matching SQL's short-circuit rules.
    if op == BinaryOp::And {
        let l = eval(left, ctx)?.as_bool();
        if l == Some(false) {
            return Ok(SqlValue::Boolean(false));
        }
        let r = eval(right, ctx)?.as_bool();
        return Ok(bool_value(and3(l, r)));
    }
    if op == BinaryOp::Or {
        let l = eval(left, ctx)?.as_bool();
        if l == Some(true) {
            return Ok(SqlValue::Boolean(true));
        }
        let r = eval(right, ctx)?.as_bool();
        return Ok(bool_value(or3(l, r)));
    }

    let l = eval(left, ctx)?;
    let r = eval(right, ctx)?;

    let collation = match (left.as_ref_collation(), right.as_ref_collation()) {
        (Some(name), _) | (_, Some(name)) => resolve_collation(&name, ctx),
        (None, None) => Collation::Binary,
    };

    match op {
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if l.is_null() || r.is_null() {
                return Ok(SqlValue::Null);
            }
            let ord = l.compare(&r, collation);
            let result = match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::Ne => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(SqlValue::Boolean(result))
        }
        BinaryOp::Is => Ok(SqlValue::Boolean(l.is_same_as(&r, collation))),
        BinaryOp::IsNot => Ok(SqlValue::Boolean(!l.is_same_as(&r, collation))),
        BinaryOp::Xor => {
            let lb = l.as_bool();
            let rb = r.as_bool();
            Ok(bool_value(match (lb, rb) {
                (Some(a), Some(b)) => Some(a != b),
                _ => None,
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            eval_arithmetic(op, &l, &r)
        }
        BinaryOp::Concat => {
            if l.is_null() || r.is_null() {
                return Ok(SqlValue::Null);
            }
            Ok(SqlValue::Text(format!("{l}{r}")))
        }
        BinaryOp::Like | BinaryOp::Glob | BinaryOp::Regexp | BinaryOp::Match => {
            eval_pattern_match(op, &l, &r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

/// Recognizes ISO-8601 date/time/datetime/duration text on either side of an
/// arithmetic operator and dispatches to the temporal type matrix. Returns
/// `None` when either side doesn't parse as a temporal value (or is numeric,
/// for the duration-scale case), leaving the caller to fall back to plain
/// numeric arithmetic.
fn eval_temporal_arithmetic(op: BinaryOp, l: &SqlValue, r: &SqlValue) -> Option<SqlValue> {
    let l_temporal = match l {
        SqlValue::Text(s) => TemporalValue::parse(s),
        _ => None,
    };
    let r_temporal = match r {
        SqlValue::Text(s) => TemporalValue::parse(s),
        _ => None,
    };

    match (op, l_temporal, r_temporal) {
        (BinaryOp::Add, Some(a), Some(b)) => temporal::add(a, b).map(|v| SqlValue::Text(v.to_text())),
        (BinaryOp::Sub, Some(a), Some(b)) => temporal::sub(a, b).map(|v| SqlValue::Text(v.to_text())),
        (BinaryOp::Div, Some(TemporalValue::Duration(a)), Some(TemporalValue::Duration(b))) => {
            temporal::ratio(TemporalValue::Duration(a), TemporalValue::Duration(b)).map(SqlValue::Real)
        }
        // duration * number, either operand order
        (BinaryOp::Mul, Some(TemporalValue::Duration(d)), None) => r.as_f64().and_then(|factor| {
            temporal::scale(TemporalValue::Duration(d), factor).map(|v| SqlValue::Text(v.to_text()))
        }),
        (BinaryOp::Mul, None, Some(TemporalValue::Duration(d))) => l.as_f64().and_then(|factor| {
            temporal::scale(TemporalValue::Duration(d), factor).map(|v| SqlValue::Text(v.to_text()))
        }),
        _ => None,
    }
}

fn eval_arithmetic(op: BinaryOp, l: &SqlValue, r: &SqlValue) -> QuereusResult<SqlValue> {
    if l.is_null() || r.is_null() {
        return Ok(SqlValue::Null);
    }
    if let Some(result) = eval_temporal_arithmetic(op, l, r) {
        return Ok(result);
    }
    let both_integer = matches!(l, SqlValue::Integer(_) | SqlValue::Boolean(_))
        && matches!(r, SqlValue::Integer(_) | SqlValue::Boolean(_));
    if both_integer && op != BinaryOp::Div {
        let a = l.as_i64().unwrap_or(0);
        let b = r.as_i64().unwrap_or(0);
        return Ok(match op {
            BinaryOp::Add => a.checked_add(b).map_or(SqlValue::Null, SqlValue::Integer),
            BinaryOp::Sub => a.checked_sub(b).map_or(SqlValue::Null, SqlValue::Integer),
            BinaryOp::Mul => a.checked_mul(b).map_or(SqlValue::Null, SqlValue::Integer),
            BinaryOp::Mod => {
                if b == 0 {
                    SqlValue::Null
                } else {
                    SqlValue::Integer(a % b)
                }
            }
            _ => unreachable!(),
        });
    }
    let a = l.as_f64().ok_or_else(|| QuereusError::Type(format!("non-numeric operand: {l}")))?;
    let b = r.as_f64().ok_or_else(|| QuereusError::Type(format!("non-numeric operand: {r}")))?;
    Ok(match op {
        BinaryOp::Add => SqlValue::Real(a + b),
        BinaryOp::Sub => SqlValue::Real(a - b),
        BinaryOp::Mul => SqlValue::Real(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                SqlValue::Null
            } else {
                SqlValue::Real(a / b)
            }
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                SqlValue::Null
            } else {
                SqlValue::Real(a % b)
            }
        }
        _ => unreachable!(),
    })
}

fn eval_pattern_match(op: BinaryOp, l: &SqlValue, r: &SqlValue) -> QuereusResult<SqlValue> {
    if l.is_null() || r.is_null() {
        return Ok(SqlValue::Null);
    }
    let text = l.as_text().unwrap_or_default();
    let pattern = r.as_text().unwrap_or_default();
    let matched = match op {
        BinaryOp::Like => like_match(text, pattern),
        BinaryOp::Glob => glob_match(text, pattern),
        BinaryOp::Regexp | BinaryOp::Match => regex::Regex::new(pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false),
        _ => unreachable!(),
    };
    Ok(SqlValue::Boolean(matched))
}

/// SQL `LIKE`: `%` any run, `_` any one character, case-insensitive ASCII.
fn like_match(text: &str, pattern: &str) -> bool {
    fn rec(t: &[u8], p: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'%') => rec(t, &p[1..]) || (!t.is_empty() && rec(&t[1..], p)),
            Some(b'_') => !t.is_empty() && rec(&t[1..], &p[1..]),
            Some(c) => {
                !t.is_empty() && t[0].to_ascii_lowercase() == c.to_ascii_lowercase() && rec(&t[1..], &p[1..])
            }
        }
    }
    rec(text.as_bytes(), pattern.as_bytes())
}

/// SQL `GLOB`: `*`/`?`, case-sensitive (sqlite semantics).
fn glob_match(text: &str, pattern: &str) -> bool {
    fn rec(t: &[u8], p: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => rec(t, &p[1..]) || (!t.is_empty() && rec(&t[1..], p)),
            Some(b'?') => !t.is_empty() && rec(&t[1..], &p[1..]),
            Some(c) => !t.is_empty() && t[0] == *c && rec(&t[1..], &p[1..]),
        }
    }
    rec(text.as_bytes(), pattern.as_bytes())
}

fn eval_case(arms: &[CaseArm], else_branch: Option<&ScalarNode>, ctx: &EvalContext) -> QuereusResult<SqlValue> {
    for arm in arms {
        let cond = eval(&arm.when, ctx)?;
        if cond.as_bool() == Some(true) {
            return eval(&arm.then, ctx);
        }
    }
    match else_branch {
        Some(e) => eval(e, ctx),
        None => Ok(SqlValue::Null),
    }
}

/// Helper trait used only to pull a `COLLATE` annotation off an operand
/// without restructuring `ScalarNode`'s binary-op evaluation above.
trait CollationHint {
    fn as_ref_collation(&self) -> Option<String>;
}

impl CollationHint for ScalarNode {
    fn as_ref_collation(&self) -> Option<String> {
        match self {
            ScalarNode::Collate { collation, .. } => Some(collation.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScalarKind, ScalarType};

    fn lit(v: SqlValue) -> ScalarNode {
        ScalarNode::literal(v, ScalarType::new(ScalarKind::Any))
    }

    fn ctx<'a>(bindings: &'a BindingStack, collations: &'a CollationRegistry) -> EvalContext<'a> {
        EvalContext {
            bindings,
            parameters: &[],
            collations,
        }
    }

    #[test]
    fn null_and_false_is_false() {
        let bindings = BindingStack::new();
        let collations = CollationRegistry::new();
        let node = ScalarNode::Binary {
            op: BinaryOp::And,
            left: Box::new(lit(SqlValue::Null)),
            right: Box::new(lit(SqlValue::Boolean(false))),
            scalar_type: ScalarType::new(ScalarKind::Boolean),
        };
        let v = eval(&node, &ctx(&bindings, &collations)).unwrap();
        assert_eq!(v.as_bool(), Some(false));
    }

    #[test]
    fn null_and_true_is_null() {
        let bindings = BindingStack::new();
        let collations = CollationRegistry::new();
        let node = ScalarNode::Binary {
            op: BinaryOp::And,
            left: Box::new(lit(SqlValue::Null)),
            right: Box::new(lit(SqlValue::Boolean(true))),
            scalar_type: ScalarType::new(ScalarKind::Boolean),
        };
        let v = eval(&node, &ctx(&bindings, &collations)).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn like_percent_and_underscore() {
        assert!(like_match("hello", "h_l%"));
        assert!(!like_match("hello", "h_x%"));
    }

    #[test]
    fn division_by_zero_is_null() {
        let bindings = BindingStack::new();
        let collations = CollationRegistry::new();
        let node = ScalarNode::Binary {
            op: BinaryOp::Div,
            left: Box::new(lit(SqlValue::Integer(1))),
            right: Box::new(lit(SqlValue::Integer(0))),
            scalar_type: ScalarType::new(ScalarKind::Real),
        };
        let v = eval(&node, &ctx(&bindings, &collations)).unwrap();
        assert!(v.is_null());
    }
}
