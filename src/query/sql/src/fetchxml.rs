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

use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_ast::ast::AggregateFunc;
use ppds_query_ast::ast::BinaryOperator;
use ppds_query_ast::ast::ColumnRef;
use ppds_query_ast::ast::Expr;
use ppds_query_ast::ast::Join;
use ppds_query_ast::ast::JoinKind;
use ppds_query_ast::ast::Literal;
use ppds_query_ast::ast::OrderDirection;
use ppds_query_ast::ast::SelectItem;
use ppds_query_ast::ast::SelectStatement;
use ppds_query_catalog::VirtualColumnMap;
use std::collections::HashSet;

/// Output of lowering a `SelectStatement` to FetchXML (spec §4.3).
pub struct GeneratedFetchXml {
    pub fetchxml: String,
    pub virtual_columns: VirtualColumnMap,
    pub entity_name: String,
}

/// Lowers the parts of a `SELECT` that FetchXML can express into a FetchXML
/// string plus a virtual-column map (spec §4.3). Predicate pushdown is
/// all-or-nothing: `try_lower_where` either lowers the entire WHERE clause or
/// gives up, leaving the plan builder to wrap the scan in `ClientFilter`
/// instead of attempting a partial split.
pub struct FetchXmlGenerator;

impl FetchXmlGenerator {
    /// `extra_columns` are base attributes a client-side operator downstream
    /// (HAVING, a window spec, an ORDER BY not pushed to FetchXML) needs even
    /// though the user's select list never named them.
    pub fn generate(
        select: &SelectStatement,
        max_page_size: u32,
        extra_columns: &[String],
        pushed_filter: Option<&str>,
    ) -> Result<GeneratedFetchXml> {
        let table = select
            .from
            .first()
            .ok_or_else(|| ErrorCode::BadArguments("SELECT requires a FROM entity".to_string()))?;
        let entity_name = table.entity.clone();
        let aggregate = select.is_aggregate();

        let requested_bases: HashSet<String> = select
            .select_list
            .iter()
            .filter_map(|item| match item {
                SelectItem::Expr { expr: Expr::Column(c), .. } => Some(c.name.clone()),
                _ => None,
            })
            .collect();

        let mut virtual_columns = VirtualColumnMap::new();
        let mut emitted: HashSet<String> = HashSet::new();
        let mut body = String::new();

        let wildcard = select
            .select_list
            .iter()
            .any(|item| matches!(item, SelectItem::Wildcard));

        if wildcard {
            body.push_str("    <all-attributes/>\n");
        } else {
            for g in &select.group_by {
                if let Expr::Column(c) = g {
                    if emitted.insert(c.name.to_ascii_lowercase()) {
                        body.push_str(&format!(
                            "    <attribute name=\"{}\" groupby=\"true\"/>\n",
                            c.name
                        ));
                    }
                }
            }

            for item in &select.select_list {
                match item {
                    SelectItem::Wildcard => {}
                    SelectItem::Expr { expr, alias } => {
                        Self::emit_select_item(
                            expr,
                            alias.as_deref(),
                            &entity_name,
                            &mut body,
                            &mut virtual_columns,
                            &requested_bases,
                            &mut emitted,
                        );
                    }
                }
            }

            for extra in extra_columns {
                if emitted.insert(extra.to_ascii_lowercase()) {
                    body.push_str(&format!("    <attribute name=\"{}\"/>\n", extra));
                }
            }
        }

        if let Some(filter) = pushed_filter {
            body.push_str(filter);
        }

        // No plan node runs a general client-side sort, so an ORDER BY over a
        // computed expression is pushed here or not at all.
        if !aggregate {
            for o in &select.order_by {
                if let Expr::Column(c) = &o.expr {
                    let descending = o.direction == OrderDirection::Desc;
                    body.push_str(&format!(
                        "    <order attribute=\"{}\" descending=\"{}\"/>\n",
                        c.name, descending
                    ));
                }
            }
        }

        for join in &table.joins {
            body.push_str(&Self::lower_join(join));
        }

        let mut head = String::from("<fetch");
        if select.distinct {
            head.push_str(" distinct=\"true\"");
        }
        if aggregate {
            head.push_str(" aggregate=\"true\"");
        } else if let Some(top) = &select.top {
            let capped = top.count.min(max_page_size as u64);
            head.push_str(&format!(" count=\"{}\"", capped));
        }
        head.push_str(">\n");

        let fetchxml = format!(
            "{}  <entity name=\"{}\">\n{}  </entity>\n</fetch>",
            head, entity_name, body
        );

        Ok(GeneratedFetchXml {
            fetchxml,
            virtual_columns,
            entity_name,
        })
    }

    /// The entire WHERE clause, or nothing: a mixed AND/OR tree of
    /// column-vs-literal comparisons, LIKE, IN, IS NULL and BETWEEN lowers
    /// cleanly; anything else (column-to-column comparisons, function calls,
    /// CASE) causes the whole clause to fall back to a client-side filter.
    pub fn try_lower_where(expr: &Expr) -> Option<String> {
        let mut out = String::new();
        Self::try_write_filter_node(expr, &mut out, 2)?;
        Some(out)
    }

    fn try_write_filter_node(expr: &Expr, out: &mut String, indent: usize) -> Option<()> {
        let top_op = match expr {
            Expr::BinaryOp { op: BinaryOperator::Or, .. } => BinaryOperator::Or,
            _ => BinaryOperator::And,
        };
        let ftype = if top_op == BinaryOperator::Or { "or" } else { "and" };
        let members = Self::flatten(expr, top_op);
        let pad = "  ".repeat(indent);
        out.push_str(&format!("{}<filter type=\"{}\">\n", pad, ftype));
        for member in members {
            match member {
                Expr::BinaryOp { op, .. } if matches!(op, BinaryOperator::And | BinaryOperator::Or) => {
                    Self::try_write_filter_node(member, out, indent + 1)?;
                }
                _ => Self::try_write_condition(member, out, indent + 1)?,
            }
        }
        out.push_str(&format!("{}</filter>\n", pad));
        Some(())
    }

    fn flatten(expr: &Expr, op: BinaryOperator) -> Vec<&Expr> {
        match expr {
            Expr::BinaryOp { op: o, left, right } if *o == op => {
                let mut members = Self::flatten(left, op);
                members.extend(Self::flatten(right, op));
                members
            }
            other => vec![other],
        }
    }

    fn try_write_condition(expr: &Expr, out: &mut String, indent: usize) -> Option<()> {
        let pad = "  ".repeat(indent);
        match expr {
            Expr::BinaryOp { op, left, right } => {
                let (col, lit, op) = Self::normalize_comparison(*op, left, right)?;
                let fx_op = Self::comparison_operator(op)?;
                let value = Self::literal_to_value(lit)?;
                out.push_str(&format!(
                    "{}<condition attribute=\"{}\" operator=\"{}\" value=\"{}\"/>\n",
                    pad,
                    col.name,
                    fx_op,
                    escape_xml(&value)
                ));
                Some(())
            }
            Expr::Like { expr, pattern, negated } => {
                let col = as_column(expr)?;
                let value = as_literal_value(pattern)?;
                let op = if *negated { "not-like" } else { "like" };
                out.push_str(&format!(
                    "{}<condition attribute=\"{}\" operator=\"{}\" value=\"{}\"/>\n",
                    pad,
                    col.name,
                    op,
                    escape_xml(&value)
                ));
                Some(())
            }
            Expr::InList { expr, list, negated } => {
                let col = as_column(expr)?;
                let op = if *negated { "not-in" } else { "in" };
                let mut values = Vec::with_capacity(list.len());
                for item in list {
                    values.push(as_literal_value(item)?);
                }
                out.push_str(&format!("{}<condition attribute=\"{}\" operator=\"{}\">\n", pad, col.name, op));
                for v in values {
                    out.push_str(&format!("{}  <value>{}</value>\n", pad, escape_xml(&v)));
                }
                out.push_str(&format!("{}</condition>\n", pad));
                Some(())
            }
            Expr::IsNull { expr, negated } => {
                let col = as_column(expr)?;
                let op = if *negated { "not-null" } else { "null" };
                out.push_str(&format!("{}<condition attribute=\"{}\" operator=\"{}\"/>\n", pad, col.name, op));
                Some(())
            }
            Expr::Between { expr, low, high, negated } => {
                let col = as_column(expr)?;
                let lo = as_literal_value(low)?;
                let hi = as_literal_value(high)?;
                let op = if *negated { "not-between" } else { "between" };
                out.push_str(&format!("{}<condition attribute=\"{}\" operator=\"{}\">\n", pad, col.name, op));
                out.push_str(&format!("{}  <value>{}</value>\n", pad, escape_xml(&lo)));
                out.push_str(&format!("{}  <value>{}</value>\n", pad, escape_xml(&hi)));
                out.push_str(&format!("{}</condition>\n", pad));
                Some(())
            }
            _ => None,
        }
    }

    fn normalize_comparison<'a>(
        op: BinaryOperator,
        left: &'a Expr,
        right: &'a Expr,
    ) -> Option<(&'a ColumnRef, &'a Literal, BinaryOperator)> {
        if !matches!(
            op,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        ) {
            return None;
        }
        match (left, right) {
            (Expr::Column(c), Expr::Literal(l)) => Some((c, l, op)),
            (Expr::Literal(l), Expr::Column(c)) => Some((c, l, flip(op))),
            _ => None,
        }
    }

    fn comparison_operator(op: BinaryOperator) -> Option<&'static str> {
        match op {
            BinaryOperator::Eq => Some("eq"),
            BinaryOperator::NotEq => Some("ne"),
            BinaryOperator::Lt => Some("lt"),
            BinaryOperator::LtEq => Some("le"),
            BinaryOperator::Gt => Some("gt"),
            BinaryOperator::GtEq => Some("ge"),
            _ => None,
        }
    }

    fn literal_to_value(lit: &Literal) -> Option<String> {
        match lit {
            Literal::Null => None,
            Literal::Boolean(b) => Some(b.to_string()),
            Literal::Integer(i) => Some(i.to_string()),
            Literal::Float(f) => Some(f.to_string()),
            Literal::Decimal(d) => Some(d.to_string()),
            Literal::String(s) => Some(s.clone()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_select_item(
        expr: &Expr,
        alias: Option<&str>,
        entity: &str,
        out: &mut String,
        virtual_columns: &mut VirtualColumnMap,
        requested_bases: &HashSet<String>,
        emitted: &mut HashSet<String>,
    ) {
        match expr {
            Expr::AggregateCall { func, arg, distinct } if !func.is_client_only() => {
                let agg = match func {
                    AggregateFunc::Count => "count",
                    AggregateFunc::CountColumn => "countcolumn",
                    AggregateFunc::Sum => "sum",
                    AggregateFunc::Avg => "avg",
                    AggregateFunc::Min => "min",
                    AggregateFunc::Max => "max",
                    AggregateFunc::StDev | AggregateFunc::Var => unreachable!("filtered by is_client_only"),
                };
                let attr_name = match arg {
                    Some(e) => as_column(e).map(|c| c.name.clone()).unwrap_or_else(|| format!("{}id", entity)),
                    None => format!("{}id", entity),
                };
                let alias_attr = alias.map(|a| format!(" alias=\"{}\"", a)).unwrap_or_default();
                let distinct_attr = if *distinct { " distinct=\"true\"" } else { "" };
                out.push_str(&format!(
                    "    <attribute name=\"{}\" aggregate=\"{}\"{}{}/>\n",
                    attr_name, agg, alias_attr, distinct_attr
                ));
            }
            Expr::Column(c) => {
                let base = virtual_base_name(&c.name).unwrap_or_else(|| c.name.clone());
                if base != c.name {
                    let explicit = requested_bases.contains(&base);
                    virtual_columns.insert(c.name.clone(), base.clone(), explicit);
                }
                if emitted.insert(base.to_ascii_lowercase()) {
                    out.push_str(&format!("    <attribute name=\"{}\"/>\n", base));
                }
            }
            // Client-only aggregates, window calls and computed expressions
            // are not requested directly; the plan builder pulls whatever
            // base columns they need in via `extra_columns`.
            _ => {}
        }
    }

    fn lower_join(join: &Join) -> String {
        let alias = join.alias.clone().unwrap_or_else(|| join.entity.clone());
        let link_type = match join.kind {
            JoinKind::Inner => "inner",
            JoinKind::Left => "outer",
        };
        // One level of link-entity, id-to-id convention (spec §4.3/§9):
        // a faithful translation of an arbitrary `ON` clause into `from`/`to`
        // attributes would need alias-scoped column resolution the AST
        // doesn't carry here, so this targets the common 1:N join shape.
        format!(
            "    <link-entity name=\"{}\" alias=\"{}\" link-type=\"{}\" from=\"{}\" to=\"{}\">\n    </link-entity>\n",
            join.entity,
            alias,
            link_type,
            format!("{}id", join.entity),
            format!("{}id", join.entity)
        )
    }
}

fn flip(op: BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other,
    }
}

fn as_column(expr: &Expr) -> Option<&ColumnRef> {
    match expr {
        Expr::Column(c) => Some(c),
        _ => None,
    }
}

fn as_literal_value(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(l) => FetchXmlGenerator::literal_to_value(l),
        _ => None,
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Recognizes the two glossary examples (`owneridname`, `statuscodename`) and
/// the general lookup convention `{attribute ending in "id"}name`; ordinary
/// attributes that merely end in "name" (`firstname`, `accountname`) are left
/// alone (spec §3 "Virtual columns").
pub(crate) fn virtual_base_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    if lower == "statuscodename" {
        return Some("statuscode".to_string());
    }
    if lower == "statecodename" {
        return Some("statecode".to_string());
    }
    if lower.len() > 4 && lower.ends_with("name") {
        let base = &name[..name.len() - 4];
        if base.to_ascii_lowercase().ends_with("id") && base.len() > 2 {
            return Some(base.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_ast::ast::ColumnRef;
    use ppds_query_ast::ast::TableRef;

    fn column(name: &str) -> Expr {
        Expr::Column(ColumnRef { table: None, name: name.to_string() })
    }

    #[test]
    fn virtual_lookup_name_is_recognized() {
        assert_eq!(virtual_base_name("owneridname").as_deref(), Some("ownerid"));
        assert_eq!(virtual_base_name("statuscodename").as_deref(), Some("statuscode"));
        assert_eq!(virtual_base_name("firstname"), None);
        assert_eq!(virtual_base_name("accountname"), None);
    }

    #[test]
    fn simple_where_lowers_to_nested_filter() {
        let expr = Expr::BinaryOp {
            op: BinaryOperator::And,
            left: Box::new(Expr::BinaryOp {
                op: BinaryOperator::Eq,
                left: Box::new(column("statuscode")),
                right: Box::new(Expr::Literal(Literal::Integer(1))),
            }),
            right: Box::new(Expr::Like {
                expr: Box::new(column("name")),
                pattern: Box::new(Expr::Literal(Literal::String("Contoso%".to_string()))),
                negated: false,
            }),
        };
        let xml = FetchXmlGenerator::try_lower_where(&expr).unwrap();
        assert!(xml.contains("operator=\"eq\""));
        assert!(xml.contains("operator=\"like\""));
        assert!(xml.contains("value=\"Contoso%\""));
    }

    #[test]
    fn column_to_column_comparison_is_not_lowered() {
        let expr = Expr::BinaryOp {
            op: BinaryOperator::Eq,
            left: Box::new(column("a")),
            right: Box::new(column("b")),
        };
        assert!(FetchXmlGenerator::try_lower_where(&expr).is_none());
    }

    #[test]
    fn generate_emits_entity_and_attributes() {
        let select = SelectStatement {
            select_list: vec![SelectItem::Expr { expr: column("name"), alias: None }],
            from: vec![TableRef { entity: "account".to_string(), alias: None, joins: vec![] }],
            ..Default::default()
        };
        let generated = FetchXmlGenerator::generate(&select, 5000, &[], None).unwrap();
        assert_eq!(generated.entity_name, "account");
        assert!(generated.fetchxml.contains("<entity name=\"account\">"));
        assert!(generated.fetchxml.contains("<attribute name=\"name\"/>"));
    }
}
