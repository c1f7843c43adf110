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
use ppds_query_ast::ast::Expr;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_expression::evaluate;
use ppds_query_expression::EvalContext;
use std::sync::Arc;

/// One output column: either a straight (possibly renamed) copy of a source
/// column, or a computed expression (spec §4.5.6).
pub enum ProjectItem {
    Column { output_name: String, source_name: String },
    Expr { output_name: String, expr: Expr },
}

pub struct Project {
    pub input: Box<PlanNode>,
    pub items: Vec<ProjectItem>,
}

impl Project {
    pub fn description(&self) -> String {
        format!("Project(columns={})", self.items.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut stream = self.input.execute(ctx.clone());
            while let Some(row) = stream.next().await {
                ctx.cancellation.check()?;
                let row = row?;
                let mut out = QueryRow::new(row.entity_logical_name.clone());
                for item in &self.items {
                    match item {
                        ProjectItem::Column { output_name, source_name } => {
                            let value = row.get(source_name).cloned().unwrap_or_else(QueryValue::null);
                            out.push(output_name.clone(), value);
                        }
                        ProjectItem::Expr { output_name, expr } => {
                            let variables = ctx.variables.lock();
                            let eval_ctx = EvalContext::new(Some(&row), &variables);
                            let value = evaluate(expr, &eval_ctx)?;
                            drop(variables);
                            out.push(output_name.clone(), QueryValue::new(value));
                        }
                    }
                }
                yield out;
            }
        })
    }
}
