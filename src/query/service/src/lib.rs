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

//! Query-execution service surface (spec §6): wires the semantic validator
//! (C2), DML safety guard (C7), plan builder (C4) and plan executor (C6)
//! behind `transpile`/`execute`/`explain`/`execute_streaming`, and runs the
//! result expander (C10) over every row a non-aggregate query produces.

pub mod result_expander;

use futures::stream::BoxStream;
use futures::StreamExt;
use ppds_common_base::CancellationToken;
use ppds_common_base::EngineOptions;
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_ast::ast::Script;
use ppds_query_ast::ast::Statement;
use ppds_query_ast::ast::TopClause;
use ppds_query_ast::parse_sql;
use ppds_query_catalog::executor::BulkExecutor;
use ppds_query_catalog::executor::MetadataCatalog;
use ppds_query_catalog::executor::RemoteQueryExecutor;
use ppds_query_catalog::executor::TdsExecutor;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_query_dml_guard::DmlSafetyGuard;
use ppds_query_dml_guard::DmlSafetyOptions;
use ppds_query_dml_guard::DmlSafetyResult;
use ppds_query_dml_guard::ProtectionLevel;
use ppds_query_dml_guard::QuerySafetySettings;
use ppds_query_pipeline::describe;
use ppds_query_pipeline::execute_plan;
use ppds_query_pipeline::execute_plan_streaming;
use ppds_query_pipeline::PlanDescription;
use ppds_query_pipeline::RowChunk;
use ppds_query_sql::validator::Diagnostic;
use ppds_query_sql::PlanBuilder;
use ppds_query_sql::SemanticValidator;
use std::sync::Arc;

/// `{sql, top_override?, page_number?, paging_cookie?, include_count, use_tds,
/// dml_safety?, enable_prefetch}` (spec §6). `page_number`/`paging_cookie`
/// describe a caller-driven single page fetch; the planner (spec §4.4/§4.5.1)
/// always auto-pages unless a future single-page mode is wired through here,
/// so they are carried for API completeness but not yet consumed.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub sql: String,
    pub top_override: Option<u64>,
    pub page_number: Option<u32>,
    pub paging_cookie: Option<String>,
    pub include_count: bool,
    pub use_tds: bool,
    pub dml_safety: Option<DmlSafetyOptions>,
    pub enable_prefetch: bool,
}

/// `{original_sql, transpiled_fetchxml, rows, dml_safety?}` (spec §6).
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub original_sql: String,
    pub transpiled_fetchxml: Option<String>,
    pub rows: Vec<QueryRow>,
    pub dml_safety: Option<DmlSafetyResult>,
}

/// Built once per connection (spec §3 "Plan context" is rebuilt per request;
/// the remote contracts and options here are the stable parts of it) and
/// reused across requests.
pub struct QueryService {
    remote: Arc<dyn RemoteQueryExecutor>,
    tds: Option<Arc<dyn TdsExecutor>>,
    bulk: Option<Arc<dyn BulkExecutor>>,
    metadata: Arc<dyn MetadataCatalog>,
    options: EngineOptions,
    safety_settings: QuerySafetySettings,
    protection_level: ProtectionLevel,
}

impl QueryService {
    pub fn new(remote: Arc<dyn RemoteQueryExecutor>, metadata: Arc<dyn MetadataCatalog>, options: EngineOptions) -> Self {
        QueryService {
            remote,
            tds: None,
            bulk: None,
            metadata,
            options,
            safety_settings: QuerySafetySettings::default(),
            protection_level: ProtectionLevel::Development,
        }
    }

    pub fn with_tds(mut self, tds: Arc<dyn TdsExecutor>) -> Self {
        self.tds = Some(tds);
        self
    }

    pub fn with_bulk(mut self, bulk: Arc<dyn BulkExecutor>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    pub fn with_safety_settings(mut self, settings: QuerySafetySettings) -> Self {
        self.safety_settings = settings;
        self
    }

    pub fn with_protection_level(mut self, level: ProtectionLevel) -> Self {
        self.protection_level = level;
        self
    }

    /// Diagnostics only (spec §4.2); never blocks, never throws.
    pub async fn validate(&self, sql: &str) -> Result<Vec<Diagnostic>> {
        let (_, stmt) = Self::single_statement(sql)?;
        Ok(SemanticValidator::new(self.metadata.clone()).validate(&stmt).await)
    }

    /// `transpile(sql, top_override?) → fetchxml` (spec §6). Pure from the
    /// caller's perspective: the only remote calls it may make are the
    /// record-count/date-range lookups the planner uses to decide aggregate
    /// partitioning (spec §4.4), never a row fetch.
    pub async fn transpile(&self, sql: &str, top_override: Option<u64>) -> Result<String> {
        let (mut script, _) = Self::single_statement(sql)?;
        apply_top_override(&mut script, top_override);
        let result = self.builder().build(sql, &script).await?;
        result
            .fetchxml
            .ok_or_else(|| ErrorCode::BadArguments("statement has no FetchXML representation".to_string()))
    }

    /// `explain(sql) → plan_description` (spec §6).
    pub async fn explain(&self, sql: &str) -> Result<PlanDescription> {
        let (script, _) = Self::single_statement(sql)?;
        let result = self.builder().build(sql, &script).await?;
        Ok(describe(&result.root_node))
    }

    /// `execute(request) → result` (spec §6). Runs the DML safety guard ahead
    /// of planning; a blocked or not-yet-confirmed statement never reaches the
    /// executor. A dry run plans (so the caller still gets FetchXML and the
    /// safety verdict) but never executes (spec §4.7 rule 5).
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResult> {
        let (mut script, stmt) = Self::single_statement(&request.sql)?;
        apply_top_override(&mut script, request.top_override);

        let dml_safety = self.evaluate_dml_safety(&stmt, request.dml_safety.as_ref());
        reject_if_unsafe(&dml_safety)?;

        let plan_result = self.builder().build(&request.sql, &script).await?;
        if dml_safety.as_ref().is_some_and(|d| d.is_dry_run) {
            return Ok(ExecuteResult {
                original_sql: request.sql.clone(),
                transpiled_fetchxml: plan_result.fetchxml,
                rows: Vec::new(),
                dml_safety,
            });
        }

        let ctx = self.plan_context(CancellationToken::new());
        let mut stream = execute_plan(plan_result.root_node, ctx);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        if !plan_result.is_aggregate {
            for row in &mut rows {
                *row = result_expander::expand_row(row, &plan_result.virtual_columns);
            }
        }

        Ok(ExecuteResult {
            original_sql: request.sql.clone(),
            transpiled_fetchxml: plan_result.fetchxml,
            rows,
            dml_safety,
        })
    }

    /// `execute_streaming(request, chunk_size) → stream of chunks` (spec §6).
    /// Safety is checked before the first chunk is produced; each row is
    /// expanded as its chunk comes off the executor rather than after the
    /// whole result is buffered.
    pub fn execute_streaming(&self, request: ExecuteRequest, chunk_size: usize) -> BoxStream<'static, Result<RowChunk>> {
        let remote = self.remote.clone();
        let tds = self.tds.clone();
        let bulk = self.bulk.clone();
        let metadata = self.metadata.clone();
        let options = self.options.clone();
        let safety_settings = self.safety_settings.clone();
        let protection_level = self.protection_level;

        Box::pin(async_stream::try_stream! {
            let (mut script, stmt) = QueryService::single_statement(&request.sql)?;
            apply_top_override(&mut script, request.top_override);

            let dml_safety = request
                .dml_safety
                .as_ref()
                .map(|opts| DmlSafetyGuard::evaluate(&stmt, opts, &safety_settings, protection_level));
            reject_if_unsafe(&dml_safety)?;

            let mut builder = PlanBuilder::new(remote.clone(), options.clone());
            if let Some(tds) = &tds {
                builder = builder.with_tds(tds.clone());
            }
            let plan_result = Arc::new(builder).build(&request.sql, &script).await?;

            let mut ctx = PlanContext::new(remote, metadata, options).with_cancellation(CancellationToken::new());
            if let Some(tds) = tds {
                ctx = ctx.with_tds(tds);
            }
            if let Some(bulk) = bulk {
                ctx = ctx.with_bulk(bulk);
            }

            let is_aggregate = plan_result.is_aggregate;
            let virtual_columns = plan_result.virtual_columns.clone();
            let mut chunks = execute_plan_streaming(plan_result.root_node, Arc::new(ctx), chunk_size, plan_result.fetchxml.clone());
            while let Some(chunk) = chunks.next().await {
                let mut chunk = chunk?;
                if !is_aggregate {
                    for row in &mut chunk.rows {
                        *row = result_expander::expand_row(row, &virtual_columns);
                    }
                }
                yield chunk;
            }
        })
    }

    fn builder(&self) -> Arc<PlanBuilder> {
        let mut builder = PlanBuilder::new(self.remote.clone(), self.options.clone());
        if let Some(tds) = &self.tds {
            builder = builder.with_tds(tds.clone());
        }
        Arc::new(builder)
    }

    fn plan_context(&self, ct: CancellationToken) -> Arc<PlanContext> {
        let mut ctx = PlanContext::new(self.remote.clone(), self.metadata.clone(), self.options.clone()).with_cancellation(ct);
        if let Some(tds) = &self.tds {
            ctx = ctx.with_tds(tds.clone());
        }
        if let Some(bulk) = &self.bulk {
            ctx = ctx.with_bulk(bulk.clone());
        }
        Arc::new(ctx)
    }

    fn evaluate_dml_safety(&self, stmt: &Statement, options: Option<&DmlSafetyOptions>) -> Option<DmlSafetyResult> {
        options.map(|opts| DmlSafetyGuard::evaluate(stmt, opts, &self.safety_settings, self.protection_level))
    }

    fn single_statement(sql: &str) -> Result<(Script, Statement)> {
        let script = parse_sql(sql)?;
        let stmt = script
            .statements
            .first()
            .cloned()
            .ok_or_else(|| ErrorCode::BadArguments("empty script".to_string()))?;
        Ok((script, stmt))
    }
}

fn apply_top_override(script: &mut Script, top_override: Option<u64>) {
    if let Some(top) = top_override {
        if let Some(Statement::Select(s)) = script.statements.first_mut() {
            s.top = Some(TopClause { count: top });
        }
    }
}

/// `DmlBlocked`/`ConfirmationRequired` raised before planning ever starts
/// (spec §7): a blocked or unconfirmed statement never reaches the executor.
fn reject_if_unsafe(dml_safety: &Option<DmlSafetyResult>) -> Result<()> {
    let Some(safety) = dml_safety else { return Ok(()) };
    if safety.is_blocked {
        return Err(ErrorCode::DmlBlocked(
            safety.block_reason.clone().unwrap_or_else(|| "DML blocked".to_string()),
        ));
    }
    if safety.requires_confirmation {
        return Err(ErrorCode::ConfirmationRequired(
            "statement requires confirmation before it can execute".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_catalog::fake::FakeRemoteExecutor;
    use std::sync::Arc;

    fn service() -> QueryService {
        let fake = Arc::new(FakeRemoteExecutor::new());
        fake.set_entities(vec!["account".to_string()]);
        fake.on_fetch_xml(Box::new(|xml, _, _| {
            if xml.contains("account") {
                Some(Ok(ppds_query_catalog::executor::FetchXmlPage {
                    records: vec![QueryRow::new("account")],
                    entity_logical_name: "account".to_string(),
                    more_records: false,
                    paging_cookie: None,
                    page_number: 1,
                    total_count: None,
                }))
            } else {
                None
            }
        }));
        QueryService::new(fake.clone(), fake, EngineOptions::default())
    }

    #[tokio::test]
    async fn transpile_produces_fetchxml_for_a_plain_select() {
        let svc = service();
        let fetchxml = svc.transpile("SELECT name FROM account", None).await.unwrap();
        assert!(fetchxml.contains("<entity name=\"account\">"));
        assert!(fetchxml.contains("<attribute name=\"name\"/>"));
    }

    #[tokio::test]
    async fn transpile_top_override_caps_the_count() {
        let svc = service();
        let fetchxml = svc.transpile("SELECT name FROM account", Some(7)).await.unwrap();
        assert!(fetchxml.contains("count=\"7\""));
    }

    #[tokio::test]
    async fn explain_reports_the_scan_node() {
        let svc = service();
        let description = svc.explain("SELECT name FROM account").await.unwrap();
        assert!(description.description.contains("Project"));
        assert!(description.children[0].description.contains("FetchXmlScan"));
    }

    #[tokio::test]
    async fn execute_runs_the_select_and_returns_rows() {
        let svc = service();
        let request = ExecuteRequest { sql: "SELECT name FROM account".to_string(), ..Default::default() };
        let result = svc.execute(&request).await.unwrap();
        assert!(result.transpiled_fetchxml.is_some());
        assert!(result.dml_safety.is_none());
        let _ = result.rows;
    }

    #[tokio::test]
    async fn execute_blocks_delete_without_where_by_default() {
        let svc = service();
        let request = ExecuteRequest {
            sql: "DELETE FROM account".to_string(),
            dml_safety: Some(DmlSafetyOptions::default()),
            ..Default::default()
        };
        let err = svc.execute(&request).await.unwrap_err();
        assert_eq!(err.code(), "Query.DmlBlocked");
    }

    #[tokio::test]
    async fn execute_requires_confirmation_in_production() {
        let svc = service().with_protection_level(ProtectionLevel::Production);
        let request = ExecuteRequest {
            sql: "SELECT name FROM account".to_string(),
            dml_safety: Some(DmlSafetyOptions::default()),
            ..Default::default()
        };
        let err = svc.execute(&request).await.unwrap_err();
        assert_eq!(err.code(), "Query.ConfirmationRequired");
    }

    #[tokio::test]
    async fn dry_run_plans_without_executing() {
        let svc = service();
        let request = ExecuteRequest {
            sql: "DELETE FROM account WHERE name = 'Contoso'".to_string(),
            dml_safety: Some(DmlSafetyOptions { is_confirmed: true, is_dry_run: true, ..Default::default() }),
            ..Default::default()
        };
        let result = svc.execute(&request).await.unwrap();
        assert!(result.rows.is_empty());
        assert!(result.dml_safety.unwrap().is_dry_run);
    }

    #[tokio::test]
    async fn execute_streaming_yields_chunks_with_fetchxml_on_first_chunk() {
        let svc = service();
        let request = ExecuteRequest { sql: "SELECT name FROM account".to_string(), ..Default::default() };
        let mut stream = svc.execute_streaming(request, 10);
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.transpiled_fetchxml.is_some());
        assert!(first.is_complete);
    }
}
