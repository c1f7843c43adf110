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

use rust_decimal::Decimal;
use std::str::FromStr;

use super::Parser;
use crate::ast::AggregateFunc;
use crate::ast::BinaryOperator;
use crate::ast::ColumnRef;
use crate::ast::Expr;
use crate::ast::Literal;
use crate::ast::OrderByItem;
use crate::ast::OrderDirection;
use crate::ast::UnaryOperator;
use crate::ast::WindowFunc;
use crate::ast::WindowSpec;
use crate::error::ParseError;
use crate::token::TokenKind;

/// Top of the precedence ladder: `OR` binds loosest.
pub(super) fn parse_expr(p: &mut Parser) -> Result<Expr, ParseError> {
    parse_or(p)
}

fn parse_or(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_and(p)?;
    while p.eat_keyword("OR") {
        let right = parse_and(p)?;
        left = Expr::BinaryOp {
            op: BinaryOperator::Or,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_not(p)?;
    while p.eat_keyword("AND") {
        let right = parse_not(p)?;
        left = Expr::BinaryOp {
            op: BinaryOperator::And,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_not(p: &mut Parser) -> Result<Expr, ParseError> {
    if p.eat_keyword("NOT") {
        let expr = parse_not(p)?;
        return Ok(Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(expr),
        });
    }
    parse_comparison(p)
}

fn parse_comparison(p: &mut Parser) -> Result<Expr, ParseError> {
    let left = parse_additive(p)?;

    if p.eat_keyword("IS") {
        let negated = p.eat_keyword("NOT");
        p.expect_keyword("NULL")?;
        return Ok(Expr::IsNull {
            expr: Box::new(left),
            negated,
        });
    }

    let rewind = p.pos;
    let negated = p.eat_keyword("NOT");

    if p.eat_keyword("BETWEEN") {
        let low = parse_additive(p)?;
        p.expect_keyword("AND")?;
        let high = parse_additive(p)?;
        return Ok(Expr::Between {
            expr: Box::new(left),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        });
    }

    if p.eat_keyword("LIKE") {
        let pattern = parse_additive(p)?;
        return Ok(Expr::Like {
            expr: Box::new(left),
            pattern: Box::new(pattern),
            negated,
        });
    }

    if p.eat_keyword("IN") {
        p.expect_punct("(")?;
        let mut list = Vec::new();
        if !p.check_punct(")") {
            loop {
                list.push(parse_expr(p)?);
                if !p.eat_punct(",") {
                    break;
                }
            }
        }
        p.expect_punct(")")?;
        return Ok(Expr::InList {
            expr: Box::new(left),
            list,
            negated,
        });
    }

    if negated {
        // `NOT` wasn't followed by BETWEEN/LIKE/IN; put it back so the
        // caller (`parse_not`) can report the mismatch properly.
        p.pos = rewind;
    }

    for (text, op) in [
        ("=", BinaryOperator::Eq),
        ("<>", BinaryOperator::NotEq),
        ("!=", BinaryOperator::NotEq),
        ("<=", BinaryOperator::LtEq),
        (">=", BinaryOperator::GtEq),
        ("<", BinaryOperator::Lt),
        (">", BinaryOperator::Gt),
    ] {
        if p.check_op(text) {
            p.bump();
            let right = parse_additive(p)?;
            return Ok(Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
    }

    Ok(left)
}

fn parse_additive(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_multiplicative(p)?;
    loop {
        let op = if p.check_op("+") {
            BinaryOperator::Add
        } else if p.check_op("-") {
            BinaryOperator::Sub
        } else {
            break;
        };
        p.bump();
        let right = parse_multiplicative(p)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_multiplicative(p: &mut Parser) -> Result<Expr, ParseError> {
    let mut left = parse_unary(p)?;
    loop {
        let op = if p.check_op("*") {
            BinaryOperator::Mul
        } else if p.check_op("/") {
            BinaryOperator::Div
        } else if p.check_op("%") {
            BinaryOperator::Mod
        } else {
            break;
        };
        p.bump();
        let right = parse_unary(p)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr, ParseError> {
    if p.eat_op("-") {
        let expr = parse_unary(p)?;
        return Ok(Expr::UnaryOp {
            op: UnaryOperator::Neg,
            expr: Box::new(expr),
        });
    }
    if p.eat_op("+") {
        let expr = parse_unary(p)?;
        return Ok(Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr: Box::new(expr),
        });
    }
    parse_primary(p)
}

fn parse_primary(p: &mut Parser) -> Result<Expr, ParseError> {
    let tok = p.current().clone();
    match tok.kind {
        TokenKind::NumericLiteral => {
            p.bump();
            Ok(Expr::Literal(parse_numeric_literal(&tok.text)))
        }
        TokenKind::StringLiteral => {
            p.bump();
            Ok(Expr::Literal(Literal::String(unescape_string(&tok.text))))
        }
        TokenKind::Variable => {
            p.bump();
            Ok(Expr::Variable(tok.text.trim_start_matches('@').to_string()))
        }
        TokenKind::Operator if tok.text == "*" => {
            p.bump();
            Ok(Expr::Star)
        }
        TokenKind::Keyword if tok.text.eq_ignore_ascii_case("NULL") => {
            p.bump();
            Ok(Expr::Literal(Literal::Null))
        }
        TokenKind::Keyword if tok.text.eq_ignore_ascii_case("CASE") => parse_case(p),
        _ if p.check_punct("(") => {
            p.bump();
            let inner = parse_expr(p)?;
            p.expect_punct(")")?;
            Ok(inner)
        }
        TokenKind::Identifier | TokenKind::QuotedIdentifier => parse_identifier_expr(p),
        _ => Err(p.error(format!("unexpected token '{}' in expression", tok.text))),
    }
}

fn parse_identifier_expr(p: &mut Parser) -> Result<Expr, ParseError> {
    let first = p.expect_identifier()?;

    if p.check_punct("(") {
        return parse_call(p, first);
    }

    if p.eat_punct(".") {
        let second = p.expect_identifier()?;
        return Ok(Expr::Column(ColumnRef {
            table: Some(first),
            name: second,
        }));
    }

    Ok(Expr::Column(ColumnRef {
        table: None,
        name: first,
    }))
}

fn parse_call(p: &mut Parser, name: String) -> Result<Expr, ParseError> {
    p.expect_punct("(")?;
    let distinct = p.eat_keyword("DISTINCT");

    let mut args = Vec::new();
    if !p.check_punct(")") {
        loop {
            args.push(parse_expr(p)?);
            if !p.eat_punct(",") {
                break;
            }
        }
    }
    p.expect_punct(")")?;

    if let Some(func) = AggregateFunc::from_name(&name) {
        let arg = match args.len() {
            0 => None,
            1 if matches!(args[0], Expr::Star) => None,
            1 => Some(Box::new(args.into_iter().next().unwrap())),
            _ => {
                return Err(p.error(format!(
                    "aggregate function '{}' takes at most one argument",
                    name
                )))
            }
        };
        if p.eat_keyword("OVER") {
            let spec = parse_window_spec(p)?;
            let wf = WindowFunc::from_name(&name)
                .ok_or_else(|| p.error(format!("'{}' cannot be used as a window function", name)))?;
            return Ok(Expr::WindowCall { func: wf, arg, spec });
        }
        return Ok(Expr::AggregateCall {
            func,
            arg,
            distinct,
        });
    }

    if let Some(wf) = WindowFunc::from_name(&name) {
        if p.eat_keyword("OVER") {
            let spec = parse_window_spec(p)?;
            let arg = args.into_iter().next().map(Box::new);
            return Ok(Expr::WindowCall { func: wf, arg, spec });
        }
        if wf.is_ranking() {
            return Err(p.error(format!("'{}' requires an OVER clause", name)));
        }
    }

    Ok(Expr::FunctionCall { name, args })
}

fn parse_window_spec(p: &mut Parser) -> Result<WindowSpec, ParseError> {
    p.expect_punct("(")?;

    let mut partition_by = Vec::new();
    if p.eat_keyword("PARTITION") {
        p.expect_keyword("BY")?;
        loop {
            partition_by.push(parse_expr(p)?);
            if !p.eat_punct(",") {
                break;
            }
        }
    }

    let mut order_by = Vec::new();
    if p.eat_keyword("ORDER") {
        p.expect_keyword("BY")?;
        loop {
            let expr = parse_expr(p)?;
            let direction = if p.eat_keyword("DESC") {
                OrderDirection::Desc
            } else {
                p.eat_keyword("ASC");
                OrderDirection::Asc
            };
            order_by.push(OrderByItem { expr, direction });
            if !p.eat_punct(",") {
                break;
            }
        }
    }

    p.expect_punct(")")?;
    Ok(WindowSpec {
        partition_by,
        order_by,
    })
}

fn parse_case(p: &mut Parser) -> Result<Expr, ParseError> {
    p.expect_keyword("CASE")?;
    let operand = if !p.check_keyword("WHEN") {
        Some(Box::new(parse_expr(p)?))
    } else {
        None
    };

    let mut when_then = Vec::new();
    while p.eat_keyword("WHEN") {
        let when = parse_expr(p)?;
        p.expect_keyword("THEN")?;
        let then = parse_expr(p)?;
        when_then.push((when, then));
    }
    if when_then.is_empty() {
        return Err(p.error("CASE expression requires at least one WHEN clause".to_string()));
    }

    let else_expr = if p.eat_keyword("ELSE") {
        Some(Box::new(parse_expr(p)?))
    } else {
        None
    };
    p.expect_keyword("END")?;

    Ok(Expr::Case {
        operand,
        when_then,
        else_expr,
    })
}

fn parse_numeric_literal(text: &str) -> Literal {
    if !text.contains('.') && !text.contains(['e', 'E']) {
        if let Ok(i) = text.parse::<i64>() {
            return Literal::Integer(i);
        }
    }
    if let Ok(d) = Decimal::from_str(text) {
        return Literal::Decimal(d);
    }
    text.parse::<f64>()
        .map(Literal::Float)
        .unwrap_or(Literal::Integer(0))
}

fn unescape_string(text: &str) -> String {
    let inner = &text[1..text.len().saturating_sub(1).max(1)];
    inner.replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(src: &str) -> Expr {
        let tokens = tokenize(src);
        let mut p = Parser::new(tokens);
        parse_expr(&mut p).unwrap()
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let e = parse("a = 1 OR b = 2 AND c = 3");
        match e {
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            )),
            _ => panic!("expected OR at top level"),
        }
    }

    #[test]
    fn between_and_in_and_like() {
        assert!(matches!(parse("a BETWEEN 1 AND 10"), Expr::Between { negated: false, .. }));
        assert!(matches!(
            parse("a NOT BETWEEN 1 AND 10"),
            Expr::Between { negated: true, .. }
        ));
        assert!(matches!(parse("a IN (1, 2, 3)"), Expr::InList { negated: false, .. }));
        assert!(matches!(parse("a LIKE '%x%'"), Expr::Like { negated: false, .. }));
        assert!(matches!(parse("a IS NULL"), Expr::IsNull { negated: false, .. }));
        assert!(matches!(parse("a IS NOT NULL"), Expr::IsNull { negated: true, .. }));
    }

    #[test]
    fn window_function_over_clause() {
        let e = parse("ROW_NUMBER() OVER (PARTITION BY status ORDER BY createdon DESC)");
        match e {
            Expr::WindowCall { func, spec, .. } => {
                assert_eq!(func, WindowFunc::RowNumber);
                assert_eq!(spec.partition_by.len(), 1);
                assert_eq!(spec.order_by.len(), 1);
                assert_eq!(spec.order_by[0].direction, OrderDirection::Desc);
            }
            _ => panic!("expected window call"),
        }
    }

    #[test]
    fn aggregate_with_distinct() {
        let e = parse("COUNT(DISTINCT name)");
        match e {
            Expr::AggregateCall {
                func,
                distinct,
                arg,
            } => {
                assert_eq!(func, AggregateFunc::Count);
                assert!(distinct);
                assert!(arg.is_some());
            }
            _ => panic!("expected aggregate call"),
        }
    }

    #[test]
    fn case_expression() {
        let e = parse("CASE WHEN a = 1 THEN 'one' ELSE 'other' END");
        assert!(matches!(e, Expr::Case { .. }));
    }

    #[test]
    fn qualified_column_reference() {
        let e = parse("a.name");
        assert_eq!(
            e,
            Expr::Column(ColumnRef {
                table: Some("a".into()),
                name: "name".into(),
            })
        );
    }

    #[test]
    fn decimal_literal() {
        let e = parse("1.5");
        assert!(matches!(e, Expr::Literal(Literal::Decimal(_))));
    }
}
