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
use async_trait::async_trait;
use futures::StreamExt;
use ppds_common_exception::Result;
use ppds_query_ast::ast::Statement;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::Scalar;
use ppds_query_expression::evaluate;
use ppds_query_expression::evaluate_condition;
use ppds_query_expression::EvalContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Plans a single non-control-flow statement into an executable node.
/// Implemented by the plan builder (C4); defined here so `ScriptExecution`
/// can recurse into the shared planner without this crate depending on it.
/// Async because building an aggregate plan may need a remote record-count
/// and date-range lookup (spec §4.4 "aggregates with date-range partitioning").
#[async_trait]
pub trait StatementPlanner: Send + Sync {
    async fn plan(&self, stmt: &Statement) -> Result<PlanNode>;
}

/// Runs an ordered statement list under a shared variable scope, emitting
/// the rows of the last result-producing statement (spec §4.5.14).
pub struct ScriptExecution {
    pub statements: Vec<Statement>,
    pub planner: Arc<dyn StatementPlanner>,
}

impl ScriptExecution {
    pub fn description(&self) -> String {
        format!("ScriptExecution(statements={})", self.statements.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut last_rows: Option<Vec<QueryRow>> = None;
            run_block(&self.statements, &ctx, &self.planner, &mut last_rows).await?;
            if let Some(rows) = last_rows {
                for row in rows {
                    ctx.cancellation.check()?;
                    yield row;
                }
            }
        })
    }
}

fn run_block<'a>(
    stmts: &'a [Statement],
    ctx: &'a Arc<PlanContext>,
    planner: &'a Arc<dyn StatementPlanner>,
    last_rows: &'a mut Option<Vec<QueryRow>>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        for stmt in stmts {
            ctx.cancellation.check()?;
            run_statement(stmt, ctx, planner, last_rows).await?;
        }
        Ok(())
    })
}

fn run_statement<'a>(
    stmt: &'a Statement,
    ctx: &'a Arc<PlanContext>,
    planner: &'a Arc<dyn StatementPlanner>,
    last_rows: &'a mut Option<Vec<QueryRow>>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        ctx.cancellation.check()?;
        match stmt {
            Statement::Declare(d) => {
                let value = {
                    let variables = ctx.variables.lock();
                    let eval_ctx = EvalContext::new(None, &variables);
                    match &d.initial {
                        Some(expr) => evaluate(expr, &eval_ctx)?,
                        None => Scalar::Null,
                    }
                };
                ctx.variables.lock().declare(d.name.clone(), d.data_type.clone(), value);
                Ok(())
            }
            Statement::SetVariable(s) => {
                let value = {
                    let variables = ctx.variables.lock();
                    let eval_ctx = EvalContext::new(None, &variables);
                    evaluate(&s.value, &eval_ctx)?
                };
                ctx.variables.lock().set(&s.name, value)?;
                Ok(())
            }
            Statement::If(i) => {
                let cond = {
                    let variables = ctx.variables.lock();
                    let eval_ctx = EvalContext::new(None, &variables);
                    evaluate_condition(&i.condition, &eval_ctx)?
                };
                if cond {
                    run_statement(&i.then_branch, ctx, planner, last_rows).await?;
                } else if let Some(else_branch) = &i.else_branch {
                    run_statement(else_branch, ctx, planner, last_rows).await?;
                }
                Ok(())
            }
            Statement::While(w) => {
                let max_iterations = ctx.options.max_script_loop_iterations;
                let mut iterations = 0u32;
                loop {
                    ctx.cancellation.check()?;
                    if iterations >= max_iterations {
                        break;
                    }
                    let cond = {
                        let variables = ctx.variables.lock();
                        let eval_ctx = EvalContext::new(None, &variables);
                        evaluate_condition(&w.condition, &eval_ctx)?
                    };
                    if !cond {
                        break;
                    }
                    run_statement(&w.body, ctx, planner, last_rows).await?;
                    iterations += 1;
                }
                Ok(())
            }
            Statement::TryCatch(tc) => match run_statement(&tc.try_block, ctx, planner, last_rows).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_cancelled() => Err(e),
                Err(e) => {
                    ctx.variables.lock().populate_error_pseudo_vars(&e);
                    run_statement(&tc.catch_block, ctx, planner, last_rows).await
                }
            },
            Statement::Block(stmts) => {
                ctx.variables.lock().push_frame();
                let result = run_block(stmts, ctx, planner, last_rows).await;
                ctx.variables.lock().pop_frame();
                result
            }
            other => {
                let node = planner.plan(other).await?;
                let mut stream = node.execute(ctx.clone());
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await {
                    ctx.cancellation.check()?;
                    rows.push(row?);
                }
                *last_rows = Some(rows);
                Ok(())
            }
        }
    })
}
