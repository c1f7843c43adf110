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

//! Batches a sequence of INSERT/UPDATE/DELETE operations, dispatches up to
//! the rate controller's current parallelism concurrently, and retries
//! per-batch throttle responses (spec §4.9). Sits between `DmlExecute`'s
//! bulk standalone callers and the raw `BulkExecutor` contract — `DmlExecute`
//! itself deliberately does its own fixed-size batching and does not go
//! through the rate controller (see `ppds-query-pipeline`'s DESIGN.md
//! entry); this executor is for callers that want AIMD-regulated bulk
//! writes directly.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use ppds_common_base::CancellationToken;
use ppds_common_exception::Result;
use ppds_query_catalog::executor::BulkExecutor;
use ppds_query_catalog::executor::BulkOutcome;
use ppds_query_catalog::executor::BulkResult;
use ppds_query_catalog::QueryRow;
use ppds_query_rate_control::RateController;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use uuid::Uuid;

/// Batch size bounds (spec §4.9 "default size 100, configurable 1-1000").
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1000;

pub struct BulkOperationExecutor {
    executor: Arc<dyn BulkExecutor>,
    rate_controller: Arc<RateController>,
    batch_size: usize,
}

impl BulkOperationExecutor {
    pub fn new(executor: Arc<dyn BulkExecutor>, rate_controller: Arc<RateController>, batch_size: usize) -> Self {
        BulkOperationExecutor {
            executor,
            rate_controller,
            batch_size: batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
        }
    }

    pub async fn create(&self, entity: &str, records: Vec<QueryRow>, ct: &CancellationToken) -> Result<BulkResult> {
        let executor = self.executor.clone();
        let entity = entity.to_string();
        let call_ct = ct.clone();
        self.dispatch(records, ct.clone(), move |batch| {
            let executor = executor.clone();
            let entity = entity.clone();
            let ct = call_ct.clone();
            async move { executor.create_multiple(&entity, batch, &ct).await }
        })
        .await
    }

    pub async fn update(&self, entity: &str, records: Vec<QueryRow>, ct: &CancellationToken) -> Result<BulkResult> {
        let executor = self.executor.clone();
        let entity = entity.to_string();
        let call_ct = ct.clone();
        self.dispatch(records, ct.clone(), move |batch| {
            let executor = executor.clone();
            let entity = entity.clone();
            let ct = call_ct.clone();
            async move { executor.update_multiple(&entity, batch, &ct).await }
        })
        .await
    }

    pub async fn delete(&self, entity: &str, ids: Vec<Uuid>, ct: &CancellationToken) -> Result<BulkResult> {
        let executor = self.executor.clone();
        let entity = entity.to_string();
        let call_ct = ct.clone();
        self.dispatch(ids, ct.clone(), move |batch| {
            let executor = executor.clone();
            let entity = entity.clone();
            let ct = call_ct.clone();
            async move { executor.delete_multiple(&entity, batch, &ct).await }
        })
        .await
    }

    /// Chunks `items` into `batch_size`-sized batches and keeps up to
    /// `get_parallelism()` of them in flight at a time, re-reading the
    /// target before topping up the in-flight set so it tracks the
    /// controller's AIMD adjustments as they happen (spec §4.9).
    async fn dispatch<T, Dispatch, Fut>(
        &self,
        items: Vec<T>,
        ct: CancellationToken,
        dispatch_batch: Dispatch,
    ) -> Result<BulkResult>
    where
        T: Clone,
        Dispatch: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<BulkOutcome>>,
    {
        let mut remaining: Vec<Vec<T>> = items
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        remaining.reverse(); // pop() takes from the front in submission order

        let mut in_flight = FuturesUnordered::new();
        let mut total = BulkResult::default();

        loop {
            ct.check()?;

            while !remaining.is_empty()
                && in_flight.len() < self.rate_controller.get_parallelism() as usize
                && !self.rate_controller.is_throttled()
            {
                let batch = remaining.pop().expect("checked non-empty");
                in_flight.push(self.run_batch(&dispatch_batch, batch, &ct));
            }

            if in_flight.is_empty() {
                if remaining.is_empty() {
                    break;
                }
                // Every batch is parked behind a throttle cooldown.
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            match in_flight.next().await {
                Some(Ok(result)) => {
                    total.success_count += result.success_count;
                    total.failure_count += result.failure_count;
                    total.errors.extend(result.errors);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        Ok(total)
    }

    /// Runs one batch, retrying on a throttle response until it either
    /// completes or cancellation is observed (spec §4.9 "Never retries a
    /// cancellation").
    async fn run_batch<T, Dispatch, Fut>(
        &self,
        dispatch_batch: &Dispatch,
        batch: Vec<T>,
        ct: &CancellationToken,
    ) -> Result<BulkResult>
    where
        T: Clone,
        Dispatch: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<BulkOutcome>>,
    {
        loop {
            ct.check()?;
            let start = Instant::now();
            let outcome = dispatch_batch(batch.clone()).await?;
            self.rate_controller.record_batch_duration(start.elapsed());

            match outcome {
                BulkOutcome::Completed(result) => {
                    self.rate_controller.record_success();
                    return Ok(result);
                }
                BulkOutcome::Throttled { retry_after } => {
                    log::warn!(
                        target: "ppds_query_bulk",
                        "batch throttled, retrying after {:?}",
                        retry_after
                    );
                    self.rate_controller.record_throttle(Some(retry_after));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_catalog::fake::FakeRemoteExecutor;

    fn row(name: &str) -> QueryRow {
        let mut row = QueryRow::new("account");
        row.push("name", ppds_query_catalog::QueryValue::new(ppds_query_catalog::Scalar::String(name.to_string())));
        row
    }

    fn controller() -> Arc<RateController> {
        Arc::new(RateController::new(4, 16, ppds_common_base::RateControlOptions::default()))
    }

    #[tokio::test]
    async fn creates_all_records_in_batches() {
        let fake = Arc::new(FakeRemoteExecutor::new());
        let bulk = BulkOperationExecutor::new(fake.clone(), controller(), 2);
        let records: Vec<_> = (0..5).map(|i| row(&format!("r{i}"))).collect();
        let ct = CancellationToken::new();

        let result = bulk.create("account", records, &ct).await.unwrap();
        assert_eq!(result.success_count, 5);
        assert_eq!(result.failure_count, 0);
    }

    #[tokio::test]
    async fn deletes_all_ids() {
        let fake = Arc::new(FakeRemoteExecutor::new());
        let bulk = BulkOperationExecutor::new(fake.clone(), controller(), 3);
        let ids: Vec<_> = (0..7).map(|_| Uuid::new_v4()).collect();
        let ct = CancellationToken::new();

        let result = bulk.delete("account", ids, &ct).await.unwrap();
        assert_eq!(result.success_count, 7);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let fake = Arc::new(FakeRemoteExecutor::new());
        let bulk = BulkOperationExecutor::new(fake.clone(), controller(), 1);
        let records: Vec<_> = (0..10).map(|i| row(&format!("r{i}"))).collect();
        let ct = CancellationToken::new();
        ct.cancel();

        let result = bulk.create("account", records, &ct).await;
        assert!(result.is_err());
    }
}
