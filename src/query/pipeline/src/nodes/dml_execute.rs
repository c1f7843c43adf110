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

use crate::plan_node::PlanNode;
use crate::plan_node::RowStream;
use async_stream::try_stream;
use futures::StreamExt;
use ppds_common_exception::ErrorCode;
use ppds_query_ast::ast::Expr;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::BulkOutcome;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use ppds_query_expression::evaluate;
use ppds_query_expression::EvalContext;
use std::sync::Arc;
use uuid::Uuid;

pub enum DmlKind {
    InsertValues { columns: Vec<String>, value_rows: Vec<Vec<Expr>> },
    InsertSelect { columns: Vec<String> },
    Update { set_clauses: Vec<(String, Expr)>, primary_key_column: String },
    Delete { primary_key_column: String },
}

/// Single `{affected_rows: N}` DML node (spec §4.5.13). `source` is the
/// upstream scan/project for the three shapes that read existing rows;
/// `InsertValues` evaluates its literal rows directly and has no source.
pub struct DmlExecute {
    pub entity_logical_name: String,
    pub kind: DmlKind,
    pub source: Option<Box<PlanNode>>,
    pub row_cap: u64,
}

impl DmlExecute {
    pub fn description(&self) -> String {
        let shape = match &self.kind {
            DmlKind::InsertValues { .. } => "InsertValues",
            DmlKind::InsertSelect { .. } => "InsertSelect",
            DmlKind::Update { .. } => "Update",
            DmlKind::Delete { .. } => "Delete",
        };
        format!("DmlExecute({}, {})", shape, self.entity_logical_name)
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            ctx.cancellation.check()?;
            let Some(bulk) = ctx.bulk.clone() else {
                Err(ErrorCode::Internal("DmlExecute requires a configured bulk executor".to_string()))?
            };
            let batch_size = ctx.options.default_batch_size.max(1);
            let row_cap = self.row_cap;

            let affected = match self.kind {
                DmlKind::InsertValues { columns, value_rows } => {
                    let variables = ctx.variables.lock();
                    let eval_ctx = EvalContext::new(None, &variables);
                    let mut records = Vec::new();
                    for value_row in value_rows.into_iter().take(row_cap as usize) {
                        let mut record = QueryRow::new(self.entity_logical_name.clone());
                        for (name, expr) in columns.iter().zip(value_row.iter()) {
                            let value = evaluate(expr, &eval_ctx)?;
                            record.push(name.clone(), QueryValue::new(value));
                        }
                        records.push(record);
                    }
                    drop(variables);
                    run_creates(&ctx, &bulk, &self.entity_logical_name, records, batch_size).await?
                }
                DmlKind::InsertSelect { columns } => {
                    let mut records = Vec::new();
                    if let Some(source) = self.source {
                        let mut stream = source.execute(ctx.clone());
                        while let Some(row) = stream.next().await {
                            ctx.cancellation.check()?;
                            let row = row?;
                            if records.len() as u64 >= row_cap {
                                break;
                            }
                            let mut record = QueryRow::new(self.entity_logical_name.clone());
                            for name in &columns {
                                let value = row.get(name).cloned().unwrap_or_else(QueryValue::null);
                                record.push(name.clone(), value);
                            }
                            records.push(record);
                        }
                    }
                    run_creates(&ctx, &bulk, &self.entity_logical_name, records, batch_size).await?
                }
                DmlKind::Update { set_clauses, primary_key_column } => {
                    let mut records = Vec::new();
                    if let Some(source) = self.source {
                        let mut stream = source.execute(ctx.clone());
                        while let Some(row) = stream.next().await {
                            ctx.cancellation.check()?;
                            let row = row?;
                            if records.len() as u64 >= row_cap {
                                break;
                            }
                            let Some(pk) = row.get(&primary_key_column) else { continue };
                            let mut record = QueryRow::new(self.entity_logical_name.clone());
                            record.push(primary_key_column.clone(), pk.clone());
                            let variables = ctx.variables.lock();
                            let eval_ctx = EvalContext::new(Some(&row), &variables);
                            for (name, expr) in &set_clauses {
                                let value = evaluate(expr, &eval_ctx)?;
                                record.push(name.clone(), QueryValue::new(value));
                            }
                            drop(variables);
                            records.push(record);
                        }
                    }
                    run_updates(&ctx, &bulk, &self.entity_logical_name, records, batch_size).await?
                }
                DmlKind::Delete { primary_key_column } => {
                    let mut ids = Vec::new();
                    if let Some(source) = self.source {
                        let mut stream = source.execute(ctx.clone());
                        while let Some(row) = stream.next().await {
                            ctx.cancellation.check()?;
                            let row = row?;
                            if ids.len() as u64 >= row_cap {
                                break;
                            }
                            let Some(pk) = row.get(&primary_key_column) else { continue };
                            let Some(id) = scalar_to_uuid(&pk.value) else { continue };
                            ids.push(id);
                        }
                    }
                    run_deletes(&ctx, &bulk, &self.entity_logical_name, ids, batch_size).await?
                }
            };

            let mut out = QueryRow::new(self.entity_logical_name);
            out.push("affected_rows", QueryValue::new(Scalar::Int(affected as i64)));
            yield out;
        })
    }
}

fn scalar_to_uuid(value: &Scalar) -> Option<Uuid> {
    match value {
        Scalar::Guid(id) => Some(*id),
        Scalar::String(s) => Uuid::parse_str(s).ok(),
        _ => None,
    }
}

async fn run_creates(
    ctx: &Arc<PlanContext>,
    bulk: &Arc<dyn ppds_query_catalog::BulkExecutor>,
    entity: &str,
    records: Vec<QueryRow>,
    batch_size: usize,
) -> ppds_common_exception::Result<u64> {
    let mut affected = 0u64;
    for chunk in records.chunks(batch_size) {
        ctx.cancellation.check()?;
        match bulk.create_multiple(entity, chunk.to_vec(), &ctx.cancellation).await? {
            BulkOutcome::Completed(result) => {
                log::debug!(target: "ppds_query_pipeline::dml_execute", "created {}/{} records", result.success_count, chunk.len());
                affected += result.success_count;
            }
            BulkOutcome::Throttled { retry_after } => {
                log::warn!(target: "ppds_query_pipeline::dml_execute", "create batch throttled, retry_after={:?}; counted as failed", retry_after);
            }
        }
    }
    Ok(affected)
}

async fn run_updates(
    ctx: &Arc<PlanContext>,
    bulk: &Arc<dyn ppds_query_catalog::BulkExecutor>,
    entity: &str,
    records: Vec<QueryRow>,
    batch_size: usize,
) -> ppds_common_exception::Result<u64> {
    let mut affected = 0u64;
    for chunk in records.chunks(batch_size) {
        ctx.cancellation.check()?;
        match bulk.update_multiple(entity, chunk.to_vec(), &ctx.cancellation).await? {
            BulkOutcome::Completed(result) => affected += result.success_count,
            BulkOutcome::Throttled { retry_after } => {
                log::warn!(target: "ppds_query_pipeline::dml_execute", "update batch throttled, retry_after={:?}; counted as failed", retry_after);
            }
        }
    }
    Ok(affected)
}

async fn run_deletes(
    ctx: &Arc<PlanContext>,
    bulk: &Arc<dyn ppds_query_catalog::BulkExecutor>,
    entity: &str,
    ids: Vec<Uuid>,
    batch_size: usize,
) -> ppds_common_exception::Result<u64> {
    let mut affected = 0u64;
    for chunk in ids.chunks(batch_size) {
        ctx.cancellation.check()?;
        match bulk.delete_multiple(entity, chunk.to_vec(), &ctx.cancellation).await? {
            BulkOutcome::Completed(result) => affected += result.success_count,
            BulkOutcome::Throttled { retry_after } => {
                log::warn!(target: "ppds_query_pipeline::dml_execute", "delete batch throttled, retry_after={:?}; counted as failed", retry_after);
            }
        }
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_to_uuid_parses_guid_and_string() {
        let id = Uuid::new_v4();
        assert_eq!(scalar_to_uuid(&Scalar::Guid(id)), Some(id));
        assert_eq!(scalar_to_uuid(&Scalar::String(id.to_string())), Some(id));
        assert_eq!(scalar_to_uuid(&Scalar::String("not-a-guid".to_string())), None);
    }
}
