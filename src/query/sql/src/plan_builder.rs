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

use crate::fetchxml::FetchXmlGenerator;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use ppds_common_base::EngineOptions;
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_ast::ast::AggregateFunc;
use ppds_query_ast::ast::DeleteStatement;
use ppds_query_ast::ast::Expr;
use ppds_query_ast::ast::InsertSource;
use ppds_query_ast::ast::InsertStatement;
use ppds_query_ast::ast::Script;
use ppds_query_ast::ast::SelectItem;
use ppds_query_ast::ast::SelectStatement;
use ppds_query_ast::ast::Statement;
use ppds_query_ast::ast::UpdateStatement;
use ppds_query_catalog::executor::RemoteQueryExecutor;
use ppds_query_catalog::executor::TdsExecutor;
use ppds_query_catalog::VirtualColumnMap;
use ppds_query_pipeline::nodes::client_aggregate::AggregateSpec;
use ppds_query_pipeline::nodes::client_aggregate::ClientAggregate;
use ppds_query_pipeline::nodes::client_filter::ClientFilter;
use ppds_query_pipeline::nodes::client_window::ClientWindow;
use ppds_query_pipeline::nodes::client_window::WindowDefinition;
use ppds_query_pipeline::nodes::adaptive_aggregate_scan::AdaptiveAggregateScan;
use ppds_query_pipeline::nodes::concatenate::Concatenate;
use ppds_query_pipeline::nodes::count_optimized::CountOptimized;
use ppds_query_pipeline::nodes::distinct::Distinct;
use ppds_query_pipeline::nodes::dml_execute::DmlExecute;
use ppds_query_pipeline::nodes::dml_execute::DmlKind;
use ppds_query_pipeline::nodes::fetchxml_scan::FetchXmlScan;
use ppds_query_pipeline::nodes::fetchxml_scan::ScanMode;
use ppds_query_pipeline::nodes::merge_aggregate::AggregateMergeKind;
use ppds_query_pipeline::nodes::merge_aggregate::AggregateMergeSpec;
use ppds_query_pipeline::nodes::merge_aggregate::MergeAggregate;
use ppds_query_pipeline::nodes::parallel_partition::ParallelPartition;
use ppds_query_pipeline::nodes::project::Project;
use ppds_query_pipeline::nodes::project::ProjectItem;
use ppds_query_pipeline::nodes::script_execution::ScriptExecution;
use ppds_query_pipeline::nodes::script_execution::StatementPlanner;
use ppds_query_pipeline::nodes::tds_scan::TdsScan;
use ppds_query_pipeline::plan_node::PlanNode;
use std::sync::Arc;

/// `{root_node, fetchxml?, entity_logical_name, virtual_columns, dml_row_cap?}`
/// (spec §4.4). `is_aggregate` is consulted only by the result expander (C10,
/// spec §4.10 "Aggregate results are not expanded") — it never affects how
/// this builder plans the query itself.
pub struct PlanResult {
    pub root_node: PlanNode,
    pub fetchxml: Option<String>,
    pub entity_logical_name: String,
    pub virtual_columns: VirtualColumnMap,
    pub dml_row_cap: Option<u64>,
    pub is_aggregate: bool,
}

/// Lowers a parsed script/statement into an executable `PlanNode` tree (spec
/// §4.4). Holds the remote contracts a plan may need while it's being built
/// (record counts and date ranges for aggregate partitioning) separately from
/// `PlanContext`, which only exists once execution starts.
pub struct PlanBuilder {
    pub remote: Arc<dyn RemoteQueryExecutor>,
    pub tds: Option<Arc<dyn TdsExecutor>>,
    pub options: EngineOptions,
}

impl PlanBuilder {
    pub fn new(remote: Arc<dyn RemoteQueryExecutor>, options: EngineOptions) -> Self {
        PlanBuilder { remote, tds: None, options }
    }

    pub fn with_tds(mut self, tds: Arc<dyn TdsExecutor>) -> Self {
        self.tds = Some(tds);
        self
    }

    /// Top-level entry point. A multi-statement or control-flow-bearing
    /// script is wrapped in `ScriptExecution`, which recurses back into this
    /// builder (via `StatementPlanner`) for each non-control-flow statement
    /// it runs (spec §4.4 "Scripts").
    pub async fn build(self: Arc<Self>, sql_text: &str, script: &Script) -> Result<PlanResult> {
        let needs_script = script.statements.len() != 1
            || script.statements.iter().any(|s| s.is_control_flow());

        if !needs_script {
            return self.build_single(Some(sql_text), &script.statements[0]).await;
        }

        let planner: Arc<dyn StatementPlanner> = self.clone();
        let root_node = PlanNode::ScriptExecution(ScriptExecution {
            statements: script.statements.clone(),
            planner,
        });
        Ok(PlanResult {
            root_node,
            fetchxml: None,
            entity_logical_name: String::new(),
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: None,
            is_aggregate: false,
        })
    }

    /// `sql_text` is only `Some` when called from the top-level, single
    /// statement `build()` (spec §8 S1): TDS raw-SQL passthrough needs the
    /// original source text, which a statement recursively planned from
    /// inside `ScriptExecution` never carries.
    async fn build_single(&self, sql_text: Option<&str>, stmt: &Statement) -> Result<PlanResult> {
        match stmt {
            Statement::Select(s) => self.build_select(sql_text, s).await,
            Statement::Insert(s) => self.build_insert(s).await,
            Statement::Update(s) => self.build_update(s).await,
            Statement::Delete(s) => self.build_delete(s).await,
            other => Err(ErrorCode::Unimplemented(format!(
                "control-flow statement cannot be planned directly: {:?}",
                std::mem::discriminant(other)
            ))),
        }
    }

    async fn build_select(&self, sql_text: Option<&str>, s: &SelectStatement) -> Result<PlanResult> {
        if s.hints.use_tds {
            if self.tds.is_none() {
                return Err(ErrorCode::BadArguments(
                    "WITH (TDS) requires a configured TDS executor".to_string(),
                ));
            }
            if let Some(sql) = sql_text {
                let root_node = PlanNode::TdsScan(TdsScan {
                    sql: sql.to_string(),
                    max_rows: s.hints.max_rows,
                });
                return Ok(PlanResult {
                    root_node,
                    fetchxml: None,
                    entity_logical_name: s.from.first().map(|t| t.entity.clone()).unwrap_or_default(),
                    virtual_columns: VirtualColumnMap::new(),
                    dml_row_cap: None,
                    is_aggregate: false,
                });
            }
        }

        if !s.set_ops.is_empty() {
            return self.build_set_op_chain(s).await;
        }

        if s.is_bare_count_star() {
            return self.build_bare_count(s).await;
        }

        if s.is_aggregate() {
            return self.build_aggregate(s).await;
        }

        self.build_scan(s)
    }

    /// `UNION`/`UNION ALL` chain (spec §4.4): every branch is a plain
    /// `Concatenate`; a bare `UNION` (any `all == false` member) wraps it in
    /// `Distinct` over every output column.
    async fn build_set_op_chain(&self, s: &SelectStatement) -> Result<PlanResult> {
        let mut branches = vec![s.clone()];
        let mut any_distinct = s.distinct;
        for op in &s.set_ops {
            any_distinct = any_distinct || !op.all;
            branches.push((*op.select).clone());
        }

        let mut children = Vec::with_capacity(branches.len());
        let mut entity_name = String::new();
        let mut virtual_columns = VirtualColumnMap::new();
        for branch in &branches {
            let mut branch = branch.clone();
            branch.set_ops.clear();
            let result = Box::pin(self.build_select(None, &branch)).await?;
            if entity_name.is_empty() {
                entity_name = result.entity_logical_name.clone();
            }
            for (k, v) in result.virtual_columns.iter() {
                virtual_columns.insert(k.clone(), v.base_name.clone(), v.base_explicitly_queried);
            }
            children.push(result.root_node);
        }

        let concat = PlanNode::Concatenate(Concatenate { children });
        let root_node = if any_distinct {
            let columns = select_output_names(s);
            PlanNode::Distinct(Distinct { input: Box::new(concat), columns })
        } else {
            concat
        };

        Ok(PlanResult {
            root_node,
            fetchxml: None,
            entity_logical_name: entity_name,
            virtual_columns,
            dml_row_cap: None,
            is_aggregate: s.is_aggregate(),
        })
    }

    /// `SELECT COUNT(*) FROM entity` with no predicate (spec §4.4/§8 S3):
    /// tries the dedicated count call first, falling back to an aggregate
    /// FetchXML scan.
    async fn build_bare_count(&self, s: &SelectStatement) -> Result<PlanResult> {
        let entity = s.from[0].entity.clone();
        let alias = match &s.select_list[0] {
            SelectItem::Expr { alias: Some(a), .. } => a.clone(),
            _ => "count".to_string(),
        };
        let generated = FetchXmlGenerator::generate(s, self.options.max_page_size, &[], None)?;
        let fallback = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: entity.clone(),
            mode: ScanMode::AutoPage { max_rows: None },
            top_n: None,
            primary_key_column: None,
        });
        let root_node = PlanNode::CountOptimized(CountOptimized {
            entity_logical_name: entity.clone(),
            alias,
            fallback: Some(Box::new(fallback)),
        });
        Ok(PlanResult {
            root_node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: entity,
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: None,
            is_aggregate: true,
        })
    }

    /// Aggregate queries (spec §4.4): client-only functions (`STDEV`/`VAR`)
    /// force a full client-side aggregate over a plain row scan. Otherwise an
    /// `aggregate="true"` FetchXML is built directly; if the entity is large
    /// and `createdon` spans a nontrivial range, the aggregate is split by
    /// date range across `pool_capacity` partitions and merged, unless the
    /// query contains `COUNT(DISTINCT ...)`, which can never be merged
    /// correctly across partitions (spec §9 Open Question (b)) and is always
    /// planned single-partition.
    async fn build_aggregate(&self, s: &SelectStatement) -> Result<PlanResult> {
        let entity = s.from[0].entity.clone();

        if self.has_client_only_aggregate(s) {
            return self.build_client_aggregate(s, &entity);
        }

        let has_count_distinct = s.select_list.iter().any(|item| {
            matches!(
                item,
                SelectItem::Expr { expr: Expr::AggregateCall { func: AggregateFunc::Count, distinct: true, .. }, .. }
            )
        });

        let extra_columns = having_columns(s);
        let generated = FetchXmlGenerator::generate(s, self.options.max_page_size, &extra_columns, None)?;

        let single_partition_scan = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: entity.clone(),
            mode: ScanMode::AutoPage { max_rows: None },
            top_n: None,
            primary_key_column: None,
        });

        let root_node = if has_count_distinct {
            single_partition_scan
        } else {
            let estimate = self.remote.total_record_count(&entity, &default_cancellation()).await.ok();
            let range = self.remote.min_max_created_on(&entity, &default_cancellation()).await.ok().flatten();

            match (estimate, range) {
                (Some(count), Some((min, max)))
                    if count as u64 > self.options.aggregate_partition_threshold && max > min =>
                {
                    self.build_partitioned_aggregate(s, &entity, &generated.fetchxml, min, max)
                }
                _ => single_partition_scan,
            }
        };

        let root_node = self.wrap_having(s, root_node);

        Ok(PlanResult {
            root_node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: entity,
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: None,
            is_aggregate: true,
        })
    }

    fn has_client_only_aggregate(&self, s: &SelectStatement) -> bool {
        s.select_list.iter().any(|item| {
            matches!(
                item,
                SelectItem::Expr { expr: Expr::AggregateCall { func, .. }, .. } if func.is_client_only()
            )
        })
    }

    fn build_client_aggregate(&self, s: &SelectStatement, entity: &str) -> Result<PlanResult> {
        let mut plain = s.clone();
        plain.select_list = vec![SelectItem::Wildcard];
        plain.group_by.clear();
        plain.having = None;
        let generated = FetchXmlGenerator::generate(&plain, self.options.max_page_size, &[], None)?;

        let input = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: entity.to_string(),
            mode: ScanMode::AutoPage { max_rows: None },
            top_n: None,
            primary_key_column: None,
        });

        let mut group_by = Vec::new();
        for expr in &s.group_by {
            if let Expr::Column(c) = expr {
                group_by.push((c.name.clone(), expr.clone()));
            }
        }

        let mut specs = Vec::new();
        for item in &s.select_list {
            if let SelectItem::Expr { expr: Expr::AggregateCall { func, arg, distinct }, alias } = item {
                specs.push(AggregateSpec {
                    output_column: alias.clone().unwrap_or_else(|| aggregate_default_alias(*func, arg)),
                    func: *func,
                    arg: arg.as_deref().cloned(),
                    distinct: *distinct,
                });
            }
        }

        let aggregated = PlanNode::ClientAggregate(ClientAggregate {
            input: Box::new(input),
            group_by,
            specs,
        });
        let root_node = self.wrap_having(s, aggregated);

        Ok(PlanResult {
            root_node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: entity.to_string(),
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: None,
            is_aggregate: true,
        })
    }

    fn build_partitioned_aggregate(
        &self,
        s: &SelectStatement,
        entity: &str,
        template_fetchxml: &str,
        min: DateTime<Utc>,
        max: DateTime<Utc>,
    ) -> PlanNode {
        let partitions = self.options.pool_capacity.max(1);
        let span_ticks = (max - min).num_milliseconds().max(1) as u128;
        let slice = (span_ticks / partitions as u128).max(1);

        let mut children = Vec::with_capacity(partitions);
        for i in 0..partitions {
            let start = min + chrono::Duration::milliseconds((slice * i as u128) as i64);
            let end = if i + 1 == partitions {
                max
            } else {
                min + chrono::Duration::milliseconds((slice * (i as u128 + 1)) as i64)
            };
            children.push(PlanNode::AdaptiveAggregateScan(AdaptiveAggregateScan {
                template_fetchxml: template_fetchxml.to_string(),
                entity_logical_name: entity.to_string(),
                start,
                end,
            }));
        }

        let partitioned = PlanNode::ParallelPartition(ParallelPartition {
            children,
            max_parallelism: partitions,
        });

        let (group_by, specs) = merge_specs(s);
        PlanNode::MergeAggregate(MergeAggregate {
            input: Box::new(partitioned),
            group_by,
            specs,
        })
    }

    fn wrap_having(&self, s: &SelectStatement, input: PlanNode) -> PlanNode {
        match &s.having {
            Some(predicate) => PlanNode::ClientFilter(ClientFilter {
                input: Box::new(input),
                predicate: predicate.clone(),
            }),
            None => input,
        }
    }

    /// Plain row-level scan with optional WHERE pushdown, window functions,
    /// projection and DISTINCT (spec §4.4).
    fn build_scan(&self, s: &SelectStatement) -> Result<PlanResult> {
        let entity = s.from[0].entity.clone();

        let mut extra_columns = Vec::new();
        for w in &s.select_list {
            if let SelectItem::Expr { expr: win @ Expr::WindowCall { .. }, .. } = w {
                for c in win.collect_columns() {
                    extra_columns.push(c.name.clone());
                }
            }
        }
        for o in &s.order_by {
            if !matches!(o.expr, Expr::Column(_)) {
                for c in o.expr.collect_columns() {
                    extra_columns.push(c.name.clone());
                }
            }
        }

        let pushed_filter = s.where_clause.as_ref().and_then(FetchXmlGenerator::try_lower_where);

        let generated = FetchXmlGenerator::generate(
            s,
            self.options.max_page_size,
            &extra_columns,
            pushed_filter.as_deref(),
        )?;

        let mut node = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: entity.clone(),
            mode: ScanMode::AutoPage { max_rows: s.hints.max_rows },
            top_n: s.top.as_ref().map(|t| t.count),
            primary_key_column: None,
        });

        if pushed_filter.is_none() {
            if let Some(predicate) = &s.where_clause {
                node = PlanNode::ClientFilter(ClientFilter { input: Box::new(node), predicate: predicate.clone() });
            }
        }

        if s.has_window() {
            let mut windows = Vec::new();
            for item in &s.select_list {
                if let SelectItem::Expr { expr: Expr::WindowCall { func, arg, spec }, alias } = item {
                    windows.push(WindowDefinition {
                        output_column: alias.clone().unwrap_or_else(|| window_default_alias(*func)),
                        func: *func,
                        arg: arg.as_deref().cloned(),
                        partition_by: spec.partition_by.clone(),
                        order_by: spec.order_by.clone(),
                    });
                }
            }
            node = PlanNode::ClientWindow(ClientWindow { input: Box::new(node), windows });
        }

        let wildcard_only = s.select_list.len() == 1 && matches!(s.select_list[0], SelectItem::Wildcard);
        if !wildcard_only {
            let items = self.build_project_items(s);
            node = PlanNode::Project(Project { input: Box::new(node), items });
        }

        if s.distinct {
            let columns = select_output_names(s);
            node = PlanNode::Distinct(Distinct { input: Box::new(node), columns });
        }

        Ok(PlanResult {
            root_node: node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: entity,
            virtual_columns: generated.virtual_columns,
            dml_row_cap: None,
            is_aggregate: false,
        })
    }

    /// Maps select-list items to output columns. A virtual column reference
    /// (e.g. `owneridname`) passes through its underlying base attribute
    /// under the base's own name; the result expander (C10) is responsible
    /// for synthesizing the formatted virtual value from the materialized
    /// row afterward (spec §4.10).
    fn build_project_items(&self, s: &SelectStatement) -> Vec<ProjectItem> {
        s.select_list
            .iter()
            .filter_map(|item| match item {
                SelectItem::Wildcard => None,
                SelectItem::Expr { expr: Expr::Column(c), alias } => {
                    let base = crate::fetchxml::virtual_base_name(&c.name).unwrap_or_else(|| c.name.clone());
                    let output_name = alias.clone().unwrap_or_else(|| c.name.clone());
                    Some(ProjectItem::Column { output_name, source_name: base })
                }
                SelectItem::Expr { expr, alias } => {
                    let output_name = alias.clone().unwrap_or_else(|| expr_default_alias(expr));
                    Some(ProjectItem::Expr { output_name, expr: expr.clone() })
                }
            })
            .collect()
    }

    async fn build_insert(&self, s: &InsertStatement) -> Result<PlanResult> {
        let row_cap = self.options.default_dml_row_cap;
        let kind = match &s.source {
            InsertSource::Values(rows) => DmlKind::InsertValues { columns: s.columns.clone(), value_rows: rows.clone() },
            InsertSource::Select(_) => DmlKind::InsertSelect { columns: s.columns.clone() },
        };
        let source = match &s.source {
            InsertSource::Select(select) => Some(Box::new(self.build_scan(select)?.root_node)),
            InsertSource::Values(_) => None,
        };
        let root_node = PlanNode::DmlExecute(DmlExecute {
            entity_logical_name: s.entity.clone(),
            kind,
            source,
            row_cap,
        });
        Ok(PlanResult {
            root_node,
            fetchxml: None,
            entity_logical_name: s.entity.clone(),
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: Some(row_cap),
            is_aggregate: false,
        })
    }

    async fn build_update(&self, s: &UpdateStatement) -> Result<PlanResult> {
        let primary_key_column = format!("{}id", s.entity);
        let mut extra_columns = vec![primary_key_column.clone()];
        for (_, expr) in &s.set_clauses {
            for c in expr.collect_columns() {
                extra_columns.push(c.name.clone());
            }
        }

        let select = synthetic_select(&s.entity, &s.alias, &s.where_clause, &extra_columns);
        let pushed_filter = s.where_clause.as_ref().and_then(FetchXmlGenerator::try_lower_where);
        let generated = FetchXmlGenerator::generate(
            &select,
            self.options.max_page_size,
            &extra_columns,
            pushed_filter.as_deref(),
        )?;

        let mut scan = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: s.entity.clone(),
            mode: ScanMode::AutoPage { max_rows: None },
            top_n: None,
            primary_key_column: Some(primary_key_column.clone()),
        });
        if pushed_filter.is_none() {
            if let Some(predicate) = &s.where_clause {
                scan = PlanNode::ClientFilter(ClientFilter { input: Box::new(scan), predicate: predicate.clone() });
            }
        }

        let row_cap = self.options.default_dml_row_cap;
        let root_node = PlanNode::DmlExecute(DmlExecute {
            entity_logical_name: s.entity.clone(),
            kind: DmlKind::Update { set_clauses: s.set_clauses.clone(), primary_key_column },
            source: Some(Box::new(scan)),
            row_cap,
        });

        Ok(PlanResult {
            root_node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: s.entity.clone(),
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: Some(row_cap),
            is_aggregate: false,
        })
    }

    async fn build_delete(&self, s: &DeleteStatement) -> Result<PlanResult> {
        let primary_key_column = format!("{}id", s.entity);
        let extra_columns = vec![primary_key_column.clone()];
        let select = synthetic_select(&s.entity, &s.alias, &s.where_clause, &extra_columns);
        let pushed_filter = s.where_clause.as_ref().and_then(FetchXmlGenerator::try_lower_where);
        let generated = FetchXmlGenerator::generate(
            &select,
            self.options.max_page_size,
            &extra_columns,
            pushed_filter.as_deref(),
        )?;

        let mut scan = PlanNode::FetchXmlScan(FetchXmlScan {
            fetchxml: generated.fetchxml.clone(),
            entity_logical_name: s.entity.clone(),
            mode: ScanMode::AutoPage { max_rows: None },
            top_n: None,
            primary_key_column: Some(primary_key_column.clone()),
        });
        if pushed_filter.is_none() {
            if let Some(predicate) = &s.where_clause {
                scan = PlanNode::ClientFilter(ClientFilter { input: Box::new(scan), predicate: predicate.clone() });
            }
        }

        let row_cap = self.options.default_dml_row_cap;
        let root_node = PlanNode::DmlExecute(DmlExecute {
            entity_logical_name: s.entity.clone(),
            kind: DmlKind::Delete { primary_key_column },
            source: Some(Box::new(scan)),
            row_cap,
        });

        Ok(PlanResult {
            root_node,
            fetchxml: Some(generated.fetchxml),
            entity_logical_name: s.entity.clone(),
            virtual_columns: VirtualColumnMap::new(),
            dml_row_cap: Some(row_cap),
            is_aggregate: false,
        })
    }
}

#[async_trait]
impl StatementPlanner for PlanBuilder {
    async fn plan(&self, stmt: &Statement) -> Result<PlanNode> {
        Ok(self.build_single(None, stmt).await?.root_node)
    }
}

fn default_cancellation() -> ppds_common_base::CancellationToken {
    ppds_common_base::CancellationToken::new()
}

fn having_columns(s: &SelectStatement) -> Vec<String> {
    let mut columns = Vec::new();
    if let Some(having) = &s.having {
        for c in having.collect_columns() {
            columns.push(c.name.clone());
        }
    }
    columns
}

fn select_output_names(s: &SelectStatement) -> Vec<String> {
    s.select_list
        .iter()
        .filter_map(|item| match item {
            SelectItem::Wildcard => None,
            SelectItem::Expr { expr: Expr::Column(c), alias } => Some(alias.clone().unwrap_or_else(|| c.name.clone())),
            SelectItem::Expr { expr, alias } => Some(alias.clone().unwrap_or_else(|| expr_default_alias(expr))),
        })
        .collect()
}

fn expr_default_alias(expr: &Expr) -> String {
    match expr {
        Expr::Column(c) => c.name.clone(),
        Expr::AggregateCall { func, .. } => aggregate_default_alias(*func, &None),
        _ => "expr".to_string(),
    }
}

fn aggregate_default_alias(func: AggregateFunc, arg: &Option<Box<Expr>>) -> String {
    let name = match func {
        AggregateFunc::Count => "count",
        AggregateFunc::CountColumn => "count",
        AggregateFunc::Sum => "sum",
        AggregateFunc::Avg => "avg",
        AggregateFunc::Min => "min",
        AggregateFunc::Max => "max",
        AggregateFunc::StDev => "stdev",
        AggregateFunc::Var => "var",
    };
    match arg {
        Some(e) => match e.as_ref() {
            Expr::Column(c) => format!("{}_{}", name, c.name),
            _ => name.to_string(),
        },
        None => name.to_string(),
    }
}

fn window_default_alias(func: ppds_query_ast::ast::WindowFunc) -> String {
    use ppds_query_ast::ast::WindowFunc;
    match func {
        WindowFunc::RowNumber => "row_number",
        WindowFunc::Rank => "rank",
        WindowFunc::DenseRank => "dense_rank",
        WindowFunc::Sum => "sum",
        WindowFunc::Count => "count",
        WindowFunc::Avg => "avg",
        WindowFunc::Min => "min",
        WindowFunc::Max => "max",
    }
    .to_string()
}

/// Per-group merge specs for a partitioned aggregate (spec §4.5.4):
/// `COUNT`/`SUM` sum, `MIN`/`MAX` take the extreme, `AVG` needs a companion
/// count column synthesized alongside it.
fn merge_specs(s: &SelectStatement) -> (Vec<String>, Vec<AggregateMergeSpec>) {
    let group_by = s
        .group_by
        .iter()
        .filter_map(|e| match e {
            Expr::Column(c) => Some(c.name.clone()),
            _ => None,
        })
        .collect();

    let mut specs = Vec::new();
    for item in &s.select_list {
        if let SelectItem::Expr { expr: Expr::AggregateCall { func, arg, distinct }, alias } = item {
            let output_column = alias.clone().unwrap_or_else(|| aggregate_default_alias(*func, arg));
            let kind = match func {
                AggregateFunc::Count | AggregateFunc::CountColumn | AggregateFunc::Sum => AggregateMergeKind::Sum,
                AggregateFunc::Min => AggregateMergeKind::Min,
                AggregateFunc::Max => AggregateMergeKind::Max,
                AggregateFunc::Avg => AggregateMergeKind::Avg,
                AggregateFunc::StDev | AggregateFunc::Var => continue,
            };
            let kind = if *func == AggregateFunc::Count && *distinct {
                AggregateMergeKind::CountDistinct
            } else {
                kind
            };
            specs.push(AggregateMergeSpec { output_column, kind, count_column: None });
        }
    }
    (group_by, specs)
}

fn synthetic_select(
    entity: &str,
    alias: &Option<String>,
    where_clause: &Option<Expr>,
    columns: &[String],
) -> SelectStatement {
    use ppds_query_ast::ast::ColumnRef;
    use ppds_query_ast::ast::TableRef;

    SelectStatement {
        select_list: columns
            .iter()
            .map(|c| SelectItem::Expr {
                expr: Expr::Column(ColumnRef { table: None, name: c.clone() }),
                alias: None,
            })
            .collect(),
        from: vec![TableRef { entity: entity.to_string(), alias: alias.clone(), joins: vec![] }],
        where_clause: where_clause.clone(),
        ..Default::default()
    }
}
