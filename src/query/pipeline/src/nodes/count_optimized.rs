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
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use std::sync::Arc;

/// Tries the dedicated `total_record_count` call first; falls back to an
/// aggregate `FetchXmlScan` on any non-cancellation failure (spec §4.5.11).
pub struct CountOptimized {
    pub entity_logical_name: String,
    pub alias: String,
    pub fallback: Option<Box<PlanNode>>,
}

impl CountOptimized {
    pub fn description(&self) -> String {
        format!("CountOptimized({}, alias={})", self.entity_logical_name, self.alias)
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            ctx.cancellation.check()?;
            let result = ctx
                .remote
                .total_record_count(&self.entity_logical_name, &ctx.cancellation)
                .await;

            match result {
                Ok(count) => {
                    let mut row = QueryRow::new(self.entity_logical_name.clone());
                    row.push(self.alias.clone(), QueryValue::new(Scalar::Int(count)));
                    yield row;
                }
                Err(e) if e.is_cancelled() => Err(e)?,
                Err(_) => {
                    let Some(fallback) = self.fallback else {
                        Err(ppds_common_exception::ErrorCode::Internal(
                            "CountOptimized has no fallback scan".to_string(),
                        ))?
                    };
                    let mut stream = fallback.execute(ctx.clone());
                    while let Some(row) = stream.next().await {
                        ctx.cancellation.check()?;
                        yield row?;
                    }
                }
            }
        })
    }
}
