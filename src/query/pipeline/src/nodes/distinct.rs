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
use std::collections::HashSet;
use std::sync::Arc;

/// Deduplicates rows by composite key over the named output columns,
/// preserving first-occurrence order (spec §4.5.7).
pub struct Distinct {
    pub input: Box<PlanNode>,
    pub columns: Vec<String>,
}

impl Distinct {
    pub fn description(&self) -> String {
        "Distinct".to_string()
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut seen: HashSet<String> = HashSet::new();
            let mut stream = self.input.execute(ctx.clone());
            while let Some(row) = stream.next().await {
                ctx.cancellation.check()?;
                let row = row?;
                let key = row.composite_key(&self.columns);
                if seen.insert(key) {
                    yield row;
                }
            }
        })
    }
}
