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

/// `Script = ordered sequence of Statement` (spec §3).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Declare(DeclareStatement),
    SetVariable(SetVariableStatement),
    If(IfStatement),
    While(WhileStatement),
    TryCatch(TryCatchStatement),
    Block(Vec<Statement>),
}

impl Statement {
    /// True for anything other than a single bare `Select`/DML statement —
    /// drives the plan builder's `ScriptExecution` wrapping decision (spec §4.4).
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Statement::Declare(_)
                | Statement::SetVariable(_)
                | Statement::If(_)
                | Statement::While(_)
                | Statement::TryCatch(_)
                | Statement::Block(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expr,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Expr,
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchStatement {
    pub try_block: Box<Statement>,
    pub catch_block: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclareStatement {
    pub name: String,
    pub data_type: Option<String>,
    pub initial: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetVariableStatement {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopClause {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub entity: String,
    pub alias: Option<String>,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub entity: String,
    pub alias: Option<String>,
    pub joins: Vec<Join>,
}

impl TableRef {
    /// The name a bare/unqualified column reference resolves against.
    pub fn resolved_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.entity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub direction: OrderDirection,
}

/// One `UNION [ALL] <select>` continuation chained onto a `SelectStatement`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub all: bool,
    pub select: Box<SelectStatement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryHints {
    pub use_tds: bool,
    pub batch_size: Option<u32>,
    pub maxdop: Option<u32>,
    pub max_rows: Option<u64>,
    pub bypass_plugins: bool,
    pub bypass_flows: bool,
    pub nolock: bool,
    pub hash_group: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub distinct: bool,
    pub top: Option<TopClause>,
    pub select_list: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub set_ops: Vec<SetOperation>,
    pub hints: QueryHints,
}

impl SelectStatement {
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .select_list
                .iter()
                .any(|item| matches!(item, SelectItem::Expr { expr, .. } if expr.contains_aggregate()))
    }

    pub fn has_window(&self) -> bool {
        self.select_list
            .iter()
            .any(|item| matches!(item, SelectItem::Expr { expr, .. } if expr.contains_window()))
    }

    /// `SELECT COUNT(*) FROM entity` with no WHERE/GROUP BY/joins (spec §4.4 "Bare COUNT(*)").
    pub fn is_bare_count_star(&self) -> bool {
        self.where_clause.is_none()
            && self.group_by.is_empty()
            && self.having.is_none()
            && self.set_ops.is_empty()
            && self.from.len() == 1
            && self.from[0].joins.is_empty()
            && self.select_list.len() == 1
            && matches!(
                &self.select_list[0],
                SelectItem::Expr { expr: Expr::AggregateCall { func: AggregateFunc::Count, arg: None, .. }, .. }
            )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Select(Box<SelectStatement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub entity: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub hints: QueryHints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub entity: String,
    pub alias: Option<String>,
    pub set_clauses: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
    pub hints: QueryHints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub entity: String,
    pub alias: Option<String>,
    pub where_clause: Option<Expr>,
    pub hints: QueryHints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    CountColumn,
    Sum,
    Avg,
    Min,
    Max,
    StDev,
    Var,
}

impl AggregateFunc {
    /// Aggregates FetchXML cannot express and that must route to
    /// `ClientAggregate` (spec §4.5.10).
    pub fn is_client_only(&self) -> bool {
        matches!(self, AggregateFunc::StDev | AggregateFunc::Var)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            "STDEV" => Some(AggregateFunc::StDev),
            "VAR" | "VARIANCE" => Some(AggregateFunc::Var),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl WindowFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ROW_NUMBER" => Some(WindowFunc::RowNumber),
            "RANK" => Some(WindowFunc::Rank),
            "DENSE_RANK" => Some(WindowFunc::DenseRank),
            "SUM" => Some(WindowFunc::Sum),
            "COUNT" => Some(WindowFunc::Count),
            "AVG" => Some(WindowFunc::Avg),
            "MIN" => Some(WindowFunc::Min),
            "MAX" => Some(WindowFunc::Max),
            _ => None,
        }
    }

    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Variable(String),
    Star,
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    AggregateCall {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    WindowCall {
        func: WindowFunc,
        arg: Option<Box<Expr>>,
        spec: WindowSpec,
    },
    Case {
        operand: Option<Box<Expr>>,
        when_then: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn contains_aggregate(&self) -> bool {
        self.any(&|e| matches!(e, Expr::AggregateCall { .. }))
    }

    pub fn contains_window(&self) -> bool {
        self.any(&|e| matches!(e, Expr::WindowCall { .. }))
    }

    /// Walks the expression tree; used by the validator/planner to collect
    /// column references, aggregate calls, and so on without a full visitor
    /// framework.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Variable(_) | Expr::Star => false,
            Expr::BinaryOp { left, right, .. } => left.any(pred) || right.any(pred),
            Expr::UnaryOp { expr, .. } => expr.any(pred),
            Expr::FunctionCall { args, .. } => args.iter().any(|a| a.any(pred)),
            Expr::AggregateCall { arg, .. } => arg.as_deref().is_some_and(|a| a.any(pred)),
            Expr::WindowCall { arg, spec, .. } => {
                arg.as_deref().is_some_and(|a| a.any(pred))
                    || spec.partition_by.iter().any(|e| e.any(pred))
                    || spec.order_by.iter().any(|o| o.expr.any(pred))
            }
            Expr::Case {
                operand,
                when_then,
                else_expr,
            } => {
                operand.as_deref().is_some_and(|o| o.any(pred))
                    || when_then
                        .iter()
                        .any(|(w, t)| w.any(pred) || t.any(pred))
                    || else_expr.as_deref().is_some_and(|e| e.any(pred))
            }
            Expr::Between {
                expr, low, high, ..
            } => expr.any(pred) || low.any(pred) || high.any(pred),
            Expr::Like { expr, pattern, .. } => expr.any(pred) || pattern.any(pred),
            Expr::InList { expr, list, .. } => expr.any(pred) || list.iter().any(|e| e.any(pred)),
            Expr::IsNull { expr, .. } => expr.any(pred),
        }
    }

    /// Every `ColumnRef` reachable from this expression, in visitation order.
    pub fn collect_columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns_into(&mut out);
        out
    }

    fn collect_columns_into<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) | Expr::Variable(_) | Expr::Star => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns_into(out);
                right.collect_columns_into(out);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_columns_into(out),
            Expr::FunctionCall { args, .. } => {
                for a in args {
                    a.collect_columns_into(out);
                }
            }
            Expr::AggregateCall { arg, .. } => {
                if let Some(a) = arg {
                    a.collect_columns_into(out);
                }
            }
            Expr::WindowCall { arg, spec, .. } => {
                if let Some(a) = arg {
                    a.collect_columns_into(out);
                }
                for e in &spec.partition_by {
                    e.collect_columns_into(out);
                }
                for o in &spec.order_by {
                    o.expr.collect_columns_into(out);
                }
            }
            Expr::Case {
                operand,
                when_then,
                else_expr,
            } => {
                if let Some(o) = operand {
                    o.collect_columns_into(out);
                }
                for (w, t) in when_then {
                    w.collect_columns_into(out);
                    t.collect_columns_into(out);
                }
                if let Some(e) = else_expr {
                    e.collect_columns_into(out);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.collect_columns_into(out);
                low.collect_columns_into(out);
                high.collect_columns_into(out);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.collect_columns_into(out);
                pattern.collect_columns_into(out);
            }
            Expr::InList { expr, list, .. } => {
                expr.collect_columns_into(out);
                for e in list {
                    e.collect_columns_into(out);
                }
            }
            Expr::IsNull { expr, .. } => expr.collect_columns_into(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_count_star_detection() {
        let stmt = SelectStatement {
            select_list: vec![SelectItem::Expr {
                expr: Expr::AggregateCall {
                    func: AggregateFunc::Count,
                    arg: None,
                    distinct: false,
                },
                alias: Some("c".into()),
            }],
            from: vec![TableRef {
                entity: "contact".into(),
                alias: None,
                joins: vec![],
            }],
            ..Default::default()
        };
        assert!(stmt.is_bare_count_star());
    }

    #[test]
    fn aggregate_and_window_never_nest_is_structural() {
        // The grammar itself cannot produce AggregateCall{arg: WindowCall}
        // since window expressions are parsed only at the top select-item
        // level (spec §3 invariant); `contains_aggregate`/`contains_window`
        // are therefore mutually exclusive on any one leaf expression tree
        // built by the parser.
        let agg = Expr::AggregateCall {
            func: AggregateFunc::Sum,
            arg: Some(Box::new(Expr::Column(ColumnRef {
                table: None,
                name: "amount".into(),
            }))),
            distinct: false,
        };
        assert!(agg.contains_aggregate());
        assert!(!agg.contains_window());
    }
}
