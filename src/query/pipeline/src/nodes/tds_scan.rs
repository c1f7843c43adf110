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

use crate::plan_node::RowStream;
use async_stream::try_stream;
use ppds_common_exception::ErrorCode;
use ppds_query_catalog::plan_context::PlanContext;
use std::sync::Arc;

/// Sends the original SQL to the TDS read endpoint, passing rows through
/// unchanged and clamping to `max_rows` client-side (spec §4.5.12).
pub struct TdsScan {
    pub sql: String,
    pub max_rows: Option<u64>,
}

impl TdsScan {
    pub fn description(&self) -> String {
        "TdsScan".to_string()
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            ctx.cancellation.check()?;
            let Some(tds) = ctx.tds.as_ref() else {
                Err(ErrorCode::Internal("TdsScan requires a configured TDS executor".to_string()))?
            };
            let result = tds.tds_execute_sql(&self.sql, self.max_rows, &ctx.cancellation).await?;

            let mut emitted = 0u64;
            for row in result.records {
                if let Some(limit) = self.max_rows {
                    if emitted >= limit {
                        break;
                    }
                }
                ctx.cancellation.check()?;
                emitted += 1;
                yield row;
            }
        })
    }
}
