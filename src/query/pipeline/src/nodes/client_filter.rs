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
use ppds_query_expression::evaluate_condition;
use ppds_query_expression::EvalContext;
use std::sync::Arc;

/// Re-evaluates a predicate client-side over an already-materialized row
/// stream — used for `HAVING` and for conditions the remote can't express
/// (spec §4.5.5).
pub struct ClientFilter {
    pub input: Box<PlanNode>,
    pub predicate: Expr,
}

impl ClientFilter {
    pub fn description(&self) -> String {
        "ClientFilter".to_string()
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut stream = self.input.execute(ctx.clone());
            while let Some(row) = stream.next().await {
                ctx.cancellation.check()?;
                let row = row?;
                let keep = {
                    let variables = ctx.variables.lock();
                    let eval_ctx = EvalContext::new(Some(&row), &variables);
                    evaluate_condition(&self.predicate, &eval_ctx)?
                };
                if keep {
                    yield row;
                }
            }
        })
    }
}
