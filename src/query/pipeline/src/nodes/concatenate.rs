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
use ppds_query_catalog::plan_context::PlanContext;
use std::sync::Arc;

/// Yields every row of each child in order, one child after another
/// (spec §4.5.8) — used for `UNION ALL`, with a `Distinct` wrapper added by
/// the plan builder for plain `UNION`.
pub struct Concatenate {
    pub children: Vec<PlanNode>,
}

impl Concatenate {
    pub fn description(&self) -> String {
        format!("Concatenate(children={})", self.children.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            for child in self.children {
                let mut stream = child.execute(ctx.clone());
                while let Some(row) = stream.next().await {
                    ctx.cancellation.check()?;
                    yield row?;
                }
            }
        })
    }
}
