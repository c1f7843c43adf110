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
use ppds_common_exception::Result;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

/// Fans a fixed list of children out across up to `max_parallelism`
/// concurrently executing tasks, merging their rows through a bounded queue
/// (spec §4.5.3). Row order across children is not preserved.
pub struct ParallelPartition {
    pub children: Vec<PlanNode>,
    pub max_parallelism: usize,
}

impl ParallelPartition {
    pub fn description(&self) -> String {
        format!(
            "ParallelPartition(children={}, max_parallelism={})",
            self.children.len(),
            self.max_parallelism
        )
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            // Concurrent scans don't serialize paging metadata updates (spec §5).
            ctx.statistics.suppress_paging_metadata.store(true, Ordering::Relaxed);

            let capacity = ctx.options.partition_queue_capacity;
            let (tx, mut rx) = mpsc::channel::<Result<QueryRow>>(capacity);
            let semaphore = Arc::new(Semaphore::new(self.max_parallelism.max(1)));

            let mut handles = Vec::with_capacity(self.children.len());
            for child in self.children {
                let child_ctx = ctx.clone();
                let child_tx = tx.clone();
                let child_semaphore = semaphore.clone();
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = child_semaphore.acquire_owned().await else {
                        return;
                    };
                    let mut stream = child.execute(child_ctx.clone());
                    while let Some(item) = stream.next().await {
                        if child_ctx.cancellation.is_cancelled() {
                            break;
                        }
                        if child_tx.send(item).await.is_err() {
                            break;
                        }
                    }
                }));
            }
            drop(tx);

            let mut pending_error = None;
            while let Some(item) = rx.recv().await {
                if let Err(e) = ctx.cancellation.check() {
                    pending_error = Some(e);
                    break;
                }
                match item {
                    Ok(row) => yield row,
                    Err(e) => {
                        pending_error = Some(e);
                        break;
                    }
                }
            }

            for handle in &handles {
                handle.abort();
            }
            for handle in handles {
                let _ = handle.await;
            }

            if let Some(e) = pending_error {
                Err(e)?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_reports_child_count_and_parallelism() {
        let node = ParallelPartition {
            children: vec![],
            max_parallelism: 4,
        };
        assert_eq!(node.description(), "ParallelPartition(children=0, max_parallelism=4)");
    }
}
