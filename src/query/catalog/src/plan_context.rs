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

use crate::executor::BulkExecutor;
use crate::executor::MetadataCatalog;
use crate::executor::RemoteQueryExecutor;
use crate::executor::TdsExecutor;
use crate::statistics::Statistics;
use crate::variables::VariableScope;
use parking_lot::Mutex;
use ppds_common_base::CancellationToken;
use ppds_common_base::EngineOptions;
use std::sync::Arc;

/// Everything passed to every plan node on execution (spec §3 "Plan
/// context"). Read-only except the statistics sink and variable scope, both
/// of which have their own internal synchronization (spec §5 "Shared
/// resource rules").
#[derive(Clone)]
pub struct PlanContext {
    pub remote: Arc<dyn RemoteQueryExecutor>,
    pub tds: Option<Arc<dyn TdsExecutor>>,
    pub bulk: Option<Arc<dyn BulkExecutor>>,
    pub metadata: Arc<dyn MetadataCatalog>,
    pub options: EngineOptions,
    pub cancellation: CancellationToken,
    pub statistics: Arc<Statistics>,
    /// Accessed only by `ScriptExecution` and the expression evaluator (spec
    /// §5); wrapped in a mutex because `Arc<PlanContext>` clones travel into
    /// spawned tasks under `ParallelPartition`, even though those tasks never
    /// touch variables themselves.
    pub variables: Arc<Mutex<VariableScope>>,
}

impl PlanContext {
    pub fn new(
        remote: Arc<dyn RemoteQueryExecutor>,
        metadata: Arc<dyn MetadataCatalog>,
        options: EngineOptions,
    ) -> Self {
        PlanContext {
            remote,
            tds: None,
            bulk: None,
            metadata,
            options,
            cancellation: CancellationToken::new(),
            statistics: Arc::new(Statistics::new()),
            variables: Arc::new(Mutex::new(VariableScope::new())),
        }
    }

    pub fn with_tds(mut self, tds: Arc<dyn TdsExecutor>) -> Self {
        self.tds = Some(tds);
        self
    }

    pub fn with_bulk(mut self, bulk: Arc<dyn BulkExecutor>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}
