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

/// Process-scoped configuration object (spec §9 "Global state" design note:
/// "there is no process-wide mutable state; a process-scoped
/// configuration/options object is passed explicitly"). One instance is
/// built per process (or per test) and threaded through `PlanContext`.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Remote FetchXML page-size cap (spec §4.3/§6): 5000.
    pub max_page_size: u32,
    /// Default DML row cap when the caller does not override it (spec §4.7).
    pub default_dml_row_cap: u64,
    /// Remote aggregate row limit that triggers date-range bisection (spec §4.4/§4.5.2): 50000.
    pub aggregate_row_limit: u64,
    /// `ParallelPartition` bounded queue capacity (spec §4.5.3): 1000.
    pub partition_queue_capacity: usize,
    /// Max `AdaptiveAggregateScan` bisection depth (spec §4.5.2): 15.
    pub max_bisection_depth: u32,
    /// Max `ScriptExecution` WHILE loop iterations (spec §4.5.14): 10000.
    pub max_script_loop_iterations: u32,
    /// `ClientWindow` materialization cap before `MemoryLimitExceeded` (spec §4.5.9): 500000.
    pub max_client_window_rows: usize,
    pub rate_control: RateControlOptions,
    /// Bulk executor default batch size (spec §4.9): 100, range 1..=1000.
    pub default_batch_size: usize,
    /// Estimated-record-count threshold above which the plan builder
    /// partitions an aggregate by date range (spec §4.4).
    pub aggregate_partition_threshold: u64,
    /// Number of `AdaptiveAggregateScan` partitions (and `ParallelPartition`
    /// concurrency) the plan builder uses when it splits an aggregate by
    /// date range (spec §4.4/§8 S4: "pool capacity = 4").
    pub pool_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_page_size: 5000,
            default_dml_row_cap: 10_000,
            aggregate_row_limit: 50_000,
            partition_queue_capacity: 1000,
            max_bisection_depth: 15,
            max_script_loop_iterations: 10_000,
            max_client_window_rows: 500_000,
            rate_control: RateControlOptions::default(),
            default_batch_size: 100,
            aggregate_partition_threshold: 1_000_000,
            pool_capacity: 4,
        }
    }
}

/// AIMD tunables for the adaptive rate controller (spec §4.8).
#[derive(Clone, Debug)]
pub struct RateControlOptions {
    pub ema_alpha: f64,
    pub exec_time_ceiling_factor: f64,
    pub slow_batch_threshold_ms: f64,
    pub min_samples_for_ceiling: u32,
}

impl Default for RateControlOptions {
    fn default() -> Self {
        RateControlOptions {
            ema_alpha: 0.3,
            exec_time_ceiling_factor: 250.0,
            slow_batch_threshold_ms: 10_000.0,
            min_samples_for_ceiling: 3,
        }
    }
}
