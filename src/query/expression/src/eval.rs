// Copyright 2024 PPDS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::compare::compare_scalars;
use crate::functions;
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_ast::ast::BinaryOperator;
use ppds_query_ast::ast::Expr;
use ppds_query_ast::ast::Literal;
use ppds_query_ast::ast::UnaryOperator;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::Scalar;
use ppds_query_catalog::VariableScope;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

/// Row and variable scope an expression is evaluated against. `row` is
/// `None` for `INSERT ... VALUES`, which evaluates each expression in an
/// empty row scope (spec §4.5.13).
pub struct EvalContext<'a> {
    pub row: Option<&'a QueryRow>,
    pub variables: &'a VariableScope,
}

impl<'a> EvalContext<'a> {
    pub fn new(row: Option<&'a QueryRow>, variables: &'a VariableScope) -> Self {
        EvalContext { row, variables }
    }
}

/// `evaluate(expr, row_values) -> value` (spec §9). Pure; never touches the
/// network. Null semantics follow SQL: arithmetic on null yields null.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Scalar> {
    match expr {
        Expr::Literal(lit) => Ok(literal_to_scalar(lit)),
        Expr::Star => Ok(Scalar::Null),
        Expr::Variable(name) => Ok(ctx.variables.get(name).cloned().unwrap_or(Scalar::Null)),
        Expr::Column(col) => Ok(ctx
            .row
            .and_then(|r| r.get(&col.name))
            .map(|v| v.value.clone())
            .unwrap_or(Scalar::Null)),
        Expr::UnaryOp { op, expr } => eval_unary(*op, evaluate(expr, ctx)?),
        Expr::BinaryOp { op, left, right } => {
            eval_binary(*op, evaluate(left, ctx)?, evaluate(right, ctx)?)
        }
        Expr::FunctionCall { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, ctx))
                .collect::<Result<Vec<_>>>()?;
            functions::call(name, &values)
        }
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => eval_case(operand.as_deref(), when_then, else_expr.as_deref(), ctx),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => eval_between(expr, low, high, *negated, ctx),
        Expr::Like {
            expr,
            pattern,
            negated,
        } => eval_like(expr, pattern, *negated, ctx),
        Expr::InList {
            expr,
            list,
            negated,
        } => eval_in_list(expr, list, *negated, ctx),
        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, ctx)?.is_null();
            Ok(Scalar::Bool(is_null != *negated))
        }
        Expr::AggregateCall { .. } => Err(ErrorCode::Internal(
            "aggregate expressions are evaluated by plan nodes, not the scalar evaluator"
                .to_string(),
        )),
        Expr::WindowCall { .. } => Err(ErrorCode::Internal(
            "window expressions are evaluated by ClientWindow, not the scalar evaluator"
                .to_string(),
        )),
    }
}

/// `evaluate_condition(expr, row_values) -> bool` (spec §9). SQL's
/// `unknown = false` rule: a null/undetermined result is never true.
pub fn evaluate_condition(expr: &Expr, ctx: &EvalContext) -> Result<bool> {
    Ok(evaluate(expr, ctx)?.is_truthy())
}

fn literal_to_scalar(lit: &Literal) -> Scalar {
    match lit {
        Literal::Null => Scalar::Null,
        Literal::Boolean(b) => Scalar::Bool(*b),
        Literal::Integer(i) => Scalar::Int(*i),
        Literal::Float(f) => Scalar::Float(*f),
        Literal::Decimal(d) => Scalar::Decimal(*d),
        Literal::String(s) => Scalar::String(s.clone()),
    }
}

fn eval_unary(op: UnaryOperator, value: Scalar) -> Result<Scalar> {
    match op {
        UnaryOperator::Not => Ok(Scalar::Bool(!value.is_truthy())),
        UnaryOperator::Plus => Ok(value),
        UnaryOperator::Neg => match value.as_decimal() {
            Some(d) => Ok(Scalar::Decimal(-d)),
            None if value.is_null() => Ok(Scalar::Null),
            None => Err(ErrorCode::BadArguments(
                "unary '-' requires a numeric operand".to_string(),
            )),
        },
    }
}

fn eval_binary(op: BinaryOperator, left: Scalar, right: Scalar) -> Result<Scalar> {
    use BinaryOperator::*;
    match op {
        And => Ok(Scalar::Bool(left.is_truthy() && right.is_truthy())),
        Or => Ok(Scalar::Bool(left.is_truthy() || right.is_truthy())),
        Eq | NotEq | Lt | LtEq | Gt | GtEq => {
            if left.is_null() || right.is_null() {
                // Three-valued logic collapses to false under `is_truthy`
                // (spec §9 "unknown = false in boolean contexts").
                return Ok(Scalar::Null);
            }
            let ordering = compare_scalars(&left, &right);
            let result = match op {
                Eq => ordering == Ordering::Equal,
                NotEq => ordering != Ordering::Equal,
                Lt => ordering == Ordering::Less,
                LtEq => ordering != Ordering::Greater,
                Gt => ordering == Ordering::Greater,
                GtEq => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Scalar::Bool(result))
        }
        Add | Sub | Mul | Div | Mod => eval_arithmetic(op, left, right),
    }
}

fn eval_arithmetic(op: BinaryOperator, left: Scalar, right: Scalar) -> Result<Scalar> {
    if let (Scalar::String(a), Scalar::String(b)) = (&left, &right) {
        if op == BinaryOperator::Add {
            return Ok(Scalar::String(format!("{}{}", a, b)));
        }
    }
    if left.is_null() || right.is_null() {
        return Ok(Scalar::Null);
    }
    let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
        return Err(ErrorCode::BadArguments(
            "arithmetic requires numeric operands".to_string(),
        ));
    };
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => {
            if b.is_zero() {
                return Err(ErrorCode::BadArguments("division by zero".to_string()));
            }
            a / b
        }
        BinaryOperator::Mod => {
            if b.is_zero() {
                return Err(ErrorCode::BadArguments("modulo by zero".to_string()));
            }
            a % b
        }
        _ => unreachable!(),
    };
    Ok(Scalar::Decimal(result))
}

fn eval_case(
    operand: Option<&Expr>,
    when_then: &[(Expr, Expr)],
    else_expr: Option<&Expr>,
    ctx: &EvalContext,
) -> Result<Scalar> {
    let operand_value = operand.map(|o| evaluate(o, ctx)).transpose()?;
    for (when, then) in when_then {
        let matched = match &operand_value {
            Some(v) => {
                let w = evaluate(when, ctx)?;
                !v.is_null() && !w.is_null() && compare_scalars(v, &w) == Ordering::Equal
            }
            None => evaluate_condition(when, ctx)?,
        };
        if matched {
            return evaluate(then, ctx);
        }
    }
    match else_expr {
        Some(e) => evaluate(e, ctx),
        None => Ok(Scalar::Null),
    }
}

fn eval_between(
    expr: &Expr,
    low: &Expr,
    high: &Expr,
    negated: bool,
    ctx: &EvalContext,
) -> Result<Scalar> {
    let v = evaluate(expr, ctx)?;
    let lo = evaluate(low, ctx)?;
    let hi = evaluate(high, ctx)?;
    if v.is_null() || lo.is_null() || hi.is_null() {
        return Ok(Scalar::Null);
    }
    let in_range =
        compare_scalars(&v, &lo) != Ordering::Less && compare_scalars(&v, &hi) != Ordering::Greater;
    Ok(Scalar::Bool(in_range != negated))
}

fn eval_like(expr: &Expr, pattern: &Expr, negated: bool, ctx: &EvalContext) -> Result<Scalar> {
    let v = evaluate(expr, ctx)?;
    let p = evaluate(pattern, ctx)?;
    if v.is_null() || p.is_null() {
        return Ok(Scalar::Null);
    }
    let matched = like_match(&v.key_string(), &p.key_string());
    Ok(Scalar::Bool(matched != negated))
}

/// Minimal SQL `LIKE` matcher: `%` = any run of characters, `_` = exactly
/// one character. Case-insensitive, matching the rest of the evaluator's
/// string-comparison fallback.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    like_match_rec(&text, &pattern)
}

fn like_match_rec(text: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => {
            like_match_rec(text, &pattern[1..])
                || (!text.is_empty() && like_match_rec(&text[1..], pattern))
        }
        Some('_') => !text.is_empty() && like_match_rec(&text[1..], &pattern[1..]),
        Some(c) => text.first() == Some(c) && like_match_rec(&text[1..], &pattern[1..]),
    }
}

fn eval_in_list(expr: &Expr, list: &[Expr], negated: bool, ctx: &EvalContext) -> Result<Scalar> {
    let v = evaluate(expr, ctx)?;
    if v.is_null() {
        return Ok(Scalar::Null);
    }
    let mut found = false;
    for item in list {
        let item_value = evaluate(item, ctx)?;
        if !item_value.is_null() && compare_scalars(&v, &item_value) == Ordering::Equal {
            found = true;
            break;
        }
    }
    Ok(Scalar::Bool(found != negated))
}

/// Parses a decimal literal text; used by callers building literal
/// `Scalar`s outside the parser (kept here since it shares the evaluator's
/// numeric-coercion rules).
pub fn parse_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| ErrorCode::BadArguments(format!("invalid decimal literal '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_ast::ast::ColumnRef;
    use ppds_query_catalog::QueryValue;

    fn empty_scope() -> VariableScope {
        VariableScope::new()
    }

    #[test]
    fn column_lookup_returns_null_when_missing() {
        let scope = empty_scope();
        let row = QueryRow::new("account");
        let ctx = EvalContext::new(Some(&row), &scope);
        let expr = Expr::Column(ColumnRef {
            table: None,
            name: "name".into(),
        });
        assert_eq!(evaluate(&expr, &ctx).unwrap(), Scalar::Null);
    }

    #[test]
    fn arithmetic_on_null_yields_null() {
        let scope = empty_scope();
        let ctx = EvalContext::new(None, &scope);
        let expr = Expr::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Expr::Literal(Literal::Null)),
            right: Box::new(Expr::Literal(Literal::Integer(1))),
        };
        assert_eq!(evaluate(&expr, &ctx).unwrap(), Scalar::Null);
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(like_match("contoso", "cont%"));
        assert!(like_match("cat", "c_t"));
        assert!(!like_match("cart", "c_t"));
    }

    #[test]
    fn between_is_inclusive() {
        let scope = empty_scope();
        let ctx = EvalContext::new(None, &scope);
        let mut row = QueryRow::new("account");
        row.push("n", QueryValue::new(Scalar::Int(5)));
        let ctx = EvalContext::new(Some(&row), ctx.variables);
        let expr = Expr::Between {
            expr: Box::new(Expr::Column(ColumnRef {
                table: None,
                name: "n".into(),
            })),
            low: Box::new(Expr::Literal(Literal::Integer(1))),
            high: Box::new(Expr::Literal(Literal::Integer(5))),
            negated: false,
        };
        assert!(evaluate_condition(&expr, &ctx).unwrap());
    }

    #[test]
    fn in_list_matches_any_member() {
        let scope = empty_scope();
        let ctx = EvalContext::new(None, &scope);
        let expr = Expr::InList {
            expr: Box::new(Expr::Literal(Literal::Integer(2))),
            list: vec![
                Expr::Literal(Literal::Integer(1)),
                Expr::Literal(Literal::Integer(2)),
            ],
            negated: false,
        };
        assert!(evaluate_condition(&expr, &ctx).unwrap());
    }
}
