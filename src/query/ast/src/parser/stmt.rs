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

use super::expr::parse_expr;
use super::Parser;
use crate::ast::DeclareStatement;
use crate::ast::DeleteStatement;
use crate::ast::IfStatement;
use crate::ast::InsertSource;
use crate::ast::InsertStatement;
use crate::ast::Join;
use crate::ast::JoinKind;
use crate::ast::OrderByItem;
use crate::ast::OrderDirection;
use crate::ast::QueryHints;
use crate::ast::SelectItem;
use crate::ast::SelectStatement;
use crate::ast::SetOperation;
use crate::ast::SetVariableStatement;
use crate::ast::Statement;
use crate::ast::TableRef;
use crate::ast::TopClause;
use crate::ast::TryCatchStatement;
use crate::ast::UpdateStatement;
use crate::ast::WhileStatement;
use crate::error::ParseError;
use crate::token::TokenKind;

pub(super) fn skip_statement_separators(p: &mut Parser) {
    while p.eat_punct(";") {}
}

pub(super) fn parse_statement(p: &mut Parser) -> Result<Statement, ParseError> {
    if p.check_keyword("SELECT") {
        return Ok(Statement::Select(parse_select(p)?));
    }
    if p.check_keyword("INSERT") {
        return Ok(Statement::Insert(parse_insert(p)?));
    }
    if p.check_keyword("UPDATE") {
        return Ok(Statement::Update(parse_update(p)?));
    }
    if p.check_keyword("DELETE") {
        return Ok(Statement::Delete(parse_delete(p)?));
    }
    if p.check_keyword("DECLARE") {
        return Ok(Statement::Declare(parse_declare(p)?));
    }
    if p.check_keyword("SET") {
        return Ok(Statement::SetVariable(parse_set(p)?));
    }
    if p.check_keyword("IF") {
        return Ok(Statement::If(parse_if(p)?));
    }
    if p.check_keyword("WHILE") {
        return Ok(Statement::While(parse_while(p)?));
    }
    if p.check_keyword("BEGIN") {
        return parse_begin(p);
    }
    Err(p.error(format!(
        "unexpected statement starting with '{}'",
        p.current().text
    )))
}

fn parse_single_or_block(p: &mut Parser) -> Result<Statement, ParseError> {
    if p.check_keyword("BEGIN") {
        parse_begin(p)
    } else {
        parse_statement(p)
    }
}

fn at_end_try(p: &Parser) -> bool {
    p.check_keyword("END") && p.peek2().is_keyword("TRY")
}

fn at_end_catch(p: &Parser) -> bool {
    p.check_keyword("END") && p.peek2().is_keyword("CATCH")
}

fn parse_statements_until(
    p: &mut Parser,
    pred: &dyn Fn(&Parser) -> bool,
) -> Result<Vec<Statement>, ParseError> {
    let mut out = Vec::new();
    skip_statement_separators(p);
    while !p.is_eof() && !pred(p) {
        out.push(parse_statement(p)?);
        skip_statement_separators(p);
    }
    Ok(out)
}

/// `BEGIN ... END`, or `BEGIN TRY ... END TRY BEGIN CATCH ... END CATCH`
/// (spec §3 `TryCatch(try, catch)`, §4.5.14).
fn parse_begin(p: &mut Parser) -> Result<Statement, ParseError> {
    p.expect_keyword("BEGIN")?;

    if p.check_keyword("TRY") {
        p.bump();
        let try_stmts = parse_statements_until(p, &at_end_try)?;
        p.expect_keyword("END")?;
        p.expect_keyword("TRY")?;
        skip_statement_separators(p);
        p.expect_keyword("BEGIN")?;
        p.expect_keyword("CATCH")?;
        let catch_stmts = parse_statements_until(p, &at_end_catch)?;
        p.expect_keyword("END")?;
        p.expect_keyword("CATCH")?;
        return Ok(Statement::TryCatch(TryCatchStatement {
            try_block: Box::new(Statement::Block(try_stmts)),
            catch_block: Box::new(Statement::Block(catch_stmts)),
        }));
    }

    let stmts = parse_statements_until(p, &|p| p.check_keyword("END"))?;
    p.expect_keyword("END")?;
    Ok(Statement::Block(stmts))
}

fn parse_if(p: &mut Parser) -> Result<IfStatement, ParseError> {
    p.expect_keyword("IF")?;
    let condition = parse_expr(p)?;
    let then_branch = Box::new(parse_single_or_block(p)?);
    skip_statement_separators(p);
    let else_branch = if p.eat_keyword("ELSE") {
        Some(Box::new(parse_single_or_block(p)?))
    } else {
        None
    };
    Ok(IfStatement {
        condition,
        then_branch,
        else_branch,
    })
}

fn parse_while(p: &mut Parser) -> Result<WhileStatement, ParseError> {
    p.expect_keyword("WHILE")?;
    let condition = parse_expr(p)?;
    let body = Box::new(parse_single_or_block(p)?);
    Ok(WhileStatement { condition, body })
}

fn parse_declare(p: &mut Parser) -> Result<DeclareStatement, ParseError> {
    p.expect_keyword("DECLARE")?;
    let var = p.expect_variable()?;

    let mut data_type = None;
    if p.current().kind == TokenKind::Identifier {
        let mut ty = p.bump().text;
        if p.eat_punct("(") {
            let mut inner = String::new();
            loop {
                if p.eat_punct(")") {
                    break;
                }
                if !inner.is_empty() {
                    inner.push(' ');
                }
                inner.push_str(&p.bump().text);
            }
            ty = format!("{}({})", ty, inner);
        }
        data_type = Some(ty);
    }

    let initial = if p.eat_op("=") {
        Some(parse_expr(p)?)
    } else {
        None
    };

    Ok(DeclareStatement {
        name: var,
        data_type,
        initial,
    })
}

fn parse_set(p: &mut Parser) -> Result<SetVariableStatement, ParseError> {
    p.expect_keyword("SET")?;
    let name = p.expect_variable()?;
    p.expect_op("=")?;
    let value = parse_expr(p)?;
    Ok(SetVariableStatement { name, value })
}

fn parse_option_hints(p: &mut Parser) -> Result<QueryHints, ParseError> {
    let mut hints = QueryHints::default();
    if !p.eat_keyword("OPTION") {
        return Ok(hints);
    }
    p.expect_punct("(")?;
    loop {
        let name = p.bump().text.to_ascii_uppercase();
        match name.as_str() {
            "USE_TDS" => hints.use_tds = true,
            "BATCH_SIZE" => hints.batch_size = Some(parse_hint_u32(p)?),
            "MAXDOP" => hints.maxdop = Some(parse_hint_u32(p)?),
            "MAX_ROWS" => hints.max_rows = Some(parse_hint_u32(p)? as u64),
            "BYPASS_PLUGINS" => hints.bypass_plugins = true,
            "BYPASS_FLOWS" => hints.bypass_flows = true,
            "NOLOCK" => hints.nolock = true,
            "HASH" => {
                p.eat_keyword("GROUP");
                hints.hash_group = true;
            }
            // Unknown hints are silently ignored (spec §6 "Query-hint surface").
            _ => {}
        }
        if !p.eat_punct(",") {
            break;
        }
    }
    p.expect_punct(")")?;
    Ok(hints)
}

fn parse_hint_u32(p: &mut Parser) -> Result<u32, ParseError> {
    let tok = p.current().clone();
    if tok.kind == TokenKind::NumericLiteral {
        p.bump();
        tok.text
            .parse::<u32>()
            .map_err(|_| p.error(format!("invalid numeric hint value '{}'", tok.text)))
    } else {
        Err(p.error("expected a numeric hint value".to_string()))
    }
}

fn parse_optional_alias(p: &mut Parser) -> Result<Option<String>, ParseError> {
    if p.eat_keyword("AS") {
        return Ok(Some(p.expect_identifier()?));
    }
    if matches!(
        p.current().kind,
        TokenKind::Identifier | TokenKind::QuotedIdentifier
    ) {
        return Ok(Some(p.expect_identifier()?));
    }
    Ok(None)
}

fn parse_table_ref(p: &mut Parser) -> Result<TableRef, ParseError> {
    let entity = p.expect_identifier()?;
    let alias = parse_optional_alias(p)?;
    let mut joins = Vec::new();
    loop {
        let kind = if p.eat_keyword("INNER") {
            p.expect_keyword("JOIN")?;
            Some(JoinKind::Inner)
        } else if p.eat_keyword("LEFT") {
            p.eat_keyword("OUTER");
            p.expect_keyword("JOIN")?;
            Some(JoinKind::Left)
        } else if p.eat_keyword("JOIN") {
            Some(JoinKind::Inner)
        } else {
            None
        };
        let Some(kind) = kind else { break };
        let join_entity = p.expect_identifier()?;
        let join_alias = parse_optional_alias(p)?;
        p.expect_keyword("ON")?;
        let on = parse_expr(p)?;
        joins.push(Join {
            kind,
            entity: join_entity,
            alias: join_alias,
            on,
        });
    }
    Ok(TableRef {
        entity,
        alias,
        joins,
    })
}

fn parse_table_refs(p: &mut Parser) -> Result<Vec<TableRef>, ParseError> {
    let mut refs = vec![parse_table_ref(p)?];
    while p.eat_punct(",") {
        refs.push(parse_table_ref(p)?);
    }
    Ok(refs)
}

fn parse_select_list(p: &mut Parser) -> Result<Vec<SelectItem>, ParseError> {
    let mut items = Vec::new();
    loop {
        if p.check_op("*") {
            p.bump();
            items.push(SelectItem::Wildcard);
        } else {
            let expr = parse_expr(p)?;
            let alias = if p.eat_keyword("AS") {
                Some(p.expect_identifier()?)
            } else if matches!(
                p.current().kind,
                TokenKind::Identifier | TokenKind::QuotedIdentifier
            ) {
                Some(p.expect_identifier()?)
            } else {
                None
            };
            items.push(SelectItem::Expr { expr, alias });
        }
        if !p.eat_punct(",") {
            break;
        }
    }
    Ok(items)
}

/// Everything in a `SELECT` except set operations and trailing hints, which
/// `parse_select` layers on so that `UNION`'s right-hand side doesn't
/// recursively swallow the rest of the statement (spec §3 `Select`).
fn parse_select_core(p: &mut Parser) -> Result<SelectStatement, ParseError> {
    p.expect_keyword("SELECT")?;
    let distinct = p.eat_keyword("DISTINCT");
    p.eat_keyword("ALL");

    let top = if p.eat_keyword("TOP") {
        let parenthesized = p.eat_punct("(");
        let tok = p.current().clone();
        if tok.kind != TokenKind::NumericLiteral {
            return Err(p.error("expected a numeric literal after TOP".to_string()));
        }
        p.bump();
        let count = tok
            .text
            .parse::<u64>()
            .map_err(|_| p.error(format!("invalid TOP count '{}'", tok.text)))?;
        if parenthesized {
            p.expect_punct(")")?;
        }
        Some(TopClause { count })
    } else {
        None
    };

    let select_list = parse_select_list(p)?;

    let from = if p.eat_keyword("FROM") {
        parse_table_refs(p)?
    } else {
        Vec::new()
    };

    let where_clause = if p.eat_keyword("WHERE") {
        Some(parse_expr(p)?)
    } else {
        None
    };

    let group_by = if p.eat_keyword("GROUP") {
        p.expect_keyword("BY")?;
        let mut list = vec![parse_expr(p)?];
        while p.eat_punct(",") {
            list.push(parse_expr(p)?);
        }
        list
    } else {
        Vec::new()
    };

    let having = if p.eat_keyword("HAVING") {
        Some(parse_expr(p)?)
    } else {
        None
    };

    let order_by = if p.eat_keyword("ORDER") {
        p.expect_keyword("BY")?;
        let mut list = Vec::new();
        loop {
            let expr = parse_expr(p)?;
            let direction = if p.eat_keyword("DESC") {
                OrderDirection::Desc
            } else {
                p.eat_keyword("ASC");
                OrderDirection::Asc
            };
            list.push(OrderByItem { expr, direction });
            if !p.eat_punct(",") {
                break;
            }
        }
        list
    } else {
        Vec::new()
    };

    Ok(SelectStatement {
        distinct,
        top,
        select_list,
        from,
        where_clause,
        group_by,
        having,
        order_by,
        set_ops: Vec::new(),
        hints: QueryHints::default(),
    })
}

pub(super) fn parse_select(p: &mut Parser) -> Result<SelectStatement, ParseError> {
    let mut stmt = parse_select_core(p)?;
    while p.check_keyword("UNION") {
        p.bump();
        let all = p.eat_keyword("ALL");
        let rhs = parse_select_core(p)?;
        stmt.set_ops.push(SetOperation {
            all,
            select: Box::new(rhs),
        });
    }
    stmt.hints = parse_option_hints(p)?;
    Ok(stmt)
}

fn parse_insert(p: &mut Parser) -> Result<InsertStatement, ParseError> {
    p.expect_keyword("INSERT")?;
    p.eat_keyword("INTO");
    let entity = p.expect_identifier()?;

    let mut columns = Vec::new();
    if p.eat_punct("(") {
        loop {
            columns.push(p.expect_identifier()?);
            if !p.eat_punct(",") {
                break;
            }
        }
        p.expect_punct(")")?;
    }

    let source = if p.eat_keyword("VALUES") {
        let mut rows = Vec::new();
        loop {
            p.expect_punct("(")?;
            let mut row = Vec::new();
            loop {
                row.push(parse_expr(p)?);
                if !p.eat_punct(",") {
                    break;
                }
            }
            p.expect_punct(")")?;
            rows.push(row);
            if !p.eat_punct(",") {
                break;
            }
        }
        InsertSource::Values(rows)
    } else if p.check_keyword("SELECT") {
        InsertSource::Select(Box::new(parse_select(p)?))
    } else {
        return Err(p.error("expected VALUES or SELECT after INSERT".to_string()));
    };

    let hints = parse_option_hints(p)?;
    Ok(InsertStatement {
        entity,
        columns,
        source,
        hints,
    })
}

fn parse_update(p: &mut Parser) -> Result<UpdateStatement, ParseError> {
    p.expect_keyword("UPDATE")?;
    let entity = p.expect_identifier()?;
    let alias = parse_optional_alias(p)?;
    p.expect_keyword("SET")?;

    let mut set_clauses = Vec::new();
    loop {
        let col = p.expect_identifier()?;
        p.expect_op("=")?;
        let value = parse_expr(p)?;
        set_clauses.push((col, value));
        if !p.eat_punct(",") {
            break;
        }
    }

    let where_clause = if p.eat_keyword("WHERE") {
        Some(parse_expr(p)?)
    } else {
        None
    };
    let hints = parse_option_hints(p)?;

    Ok(UpdateStatement {
        entity,
        alias,
        set_clauses,
        where_clause,
        hints,
    })
}

fn parse_delete(p: &mut Parser) -> Result<DeleteStatement, ParseError> {
    p.expect_keyword("DELETE")?;
    p.eat_keyword("FROM");
    let entity = p.expect_identifier()?;
    let alias = parse_optional_alias(p)?;
    let where_clause = if p.eat_keyword("WHERE") {
        Some(parse_expr(p)?)
    } else {
        None
    };
    let hints = parse_option_hints(p)?;

    Ok(DeleteStatement {
        entity,
        alias,
        where_clause,
        hints,
    })
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_sql;
    use crate::ast::Statement;

    #[test]
    fn select_with_join_where_group_having_order() {
        let script = parse_sql(
            "SELECT a.name, COUNT(*) AS c FROM account a \
             INNER JOIN contact c ON c.parentcustomerid = a.accountid \
             WHERE a.statecode = 0 \
             GROUP BY a.name \
             HAVING COUNT(*) > 1 \
             ORDER BY c DESC",
        )
        .unwrap();
        assert_eq!(script.statements.len(), 1);
        assert!(matches!(script.statements[0], Statement::Select(_)));
    }

    #[test]
    fn union_all_vs_union() {
        let a = parse_sql("SELECT name FROM account UNION ALL SELECT name FROM contact").unwrap();
        let b = parse_sql("SELECT name FROM account UNION SELECT name FROM contact").unwrap();
        let Statement::Select(sa) = &a.statements[0] else { panic!() };
        let Statement::Select(sb) = &b.statements[0] else { panic!() };
        assert!(sa.set_ops[0].all);
        assert!(!sb.set_ops[0].all);
    }

    #[test]
    fn insert_values_and_insert_select() {
        let a = parse_sql("INSERT INTO account (name) VALUES ('Contoso')").unwrap();
        assert!(matches!(a.statements[0], Statement::Insert(_)));
        let b = parse_sql("INSERT INTO account (name) SELECT name FROM contact").unwrap();
        assert!(matches!(b.statements[0], Statement::Insert(_)));
    }

    #[test]
    fn update_and_delete_require_no_where_to_parse() {
        let u = parse_sql("UPDATE account SET name = 'x'").unwrap();
        assert!(matches!(u.statements[0], Statement::Update(_)));
        let d = parse_sql("DELETE FROM account").unwrap();
        assert!(matches!(d.statements[0], Statement::Delete(_)));
    }

    #[test]
    fn option_hints_parsed() {
        let script = parse_sql("SELECT name FROM account OPTION (USE_TDS, MAX_ROWS 100)").unwrap();
        let Statement::Select(s) = &script.statements[0] else { panic!() };
        assert!(s.hints.use_tds);
        assert_eq!(s.hints.max_rows, Some(100));
    }

    #[test]
    fn script_with_control_flow_and_try_catch() {
        let script = parse_sql(
            "DECLARE @n INT = 0; \
             WHILE @n < 3 BEGIN SET @n = @n + 1 END; \
             BEGIN TRY SELECT 1 AS x END TRY BEGIN CATCH SELECT 2 AS y END CATCH",
        )
        .unwrap();
        assert_eq!(script.statements.len(), 3);
        assert!(matches!(script.statements[1], Statement::While(_)));
        assert!(matches!(script.statements[2], Statement::TryCatch(_)));
    }

    #[test]
    fn if_else_statement() {
        let script = parse_sql("IF 1 = 1 SELECT 1 AS x ELSE SELECT 2 AS y").unwrap();
        assert!(matches!(script.statements[0], Statement::If(_)));
    }
}
