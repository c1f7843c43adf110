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

use crate::nodes::adaptive_aggregate_scan::AdaptiveAggregateScan;
use crate::nodes::client_aggregate::ClientAggregate;
use crate::nodes::client_filter::ClientFilter;
use crate::nodes::client_window::ClientWindow;
use crate::nodes::concatenate::Concatenate;
use crate::nodes::count_optimized::CountOptimized;
use crate::nodes::distinct::Distinct;
use crate::nodes::dml_execute::DmlExecute;
use crate::nodes::fetchxml_scan::FetchXmlScan;
use crate::nodes::merge_aggregate::MergeAggregate;
use crate::nodes::parallel_partition::ParallelPartition;
use crate::nodes::project::Project;
use crate::nodes::script_execution::ScriptExecution;
use crate::nodes::tds_scan::TdsScan;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_common_exception::Result;
use std::sync::Arc;

/// "Asynchronous row producer" (spec §3 "Plan tree") realized as a boxed,
/// owned, single-consumer stream (spec §9 "async streams with back-pressure").
pub type RowStream = futures::stream::BoxStream<'static, Result<QueryRow>>;

/// Closed variant set of plan nodes (spec §9 "Tree polymorphism": "tagged
/// variants rather than open inheritance"). Each node owns its children.
pub enum PlanNode {
    FetchXmlScan(FetchXmlScan),
    AdaptiveAggregateScan(AdaptiveAggregateScan),
    ParallelPartition(ParallelPartition),
    MergeAggregate(MergeAggregate),
    ClientFilter(ClientFilter),
    Project(Project),
    Distinct(Distinct),
    Concatenate(Concatenate),
    ClientWindow(ClientWindow),
    ClientAggregate(ClientAggregate),
    CountOptimized(CountOptimized),
    TdsScan(TdsScan),
    DmlExecute(DmlExecute),
    ScriptExecution(ScriptExecution),
}

impl PlanNode {
    pub fn description(&self) -> String {
        match self {
            PlanNode::FetchXmlScan(n) => n.description(),
            PlanNode::AdaptiveAggregateScan(n) => n.description(),
            PlanNode::ParallelPartition(n) => n.description(),
            PlanNode::MergeAggregate(n) => n.description(),
            PlanNode::ClientFilter(n) => n.description(),
            PlanNode::Project(n) => n.description(),
            PlanNode::Distinct(n) => n.description(),
            PlanNode::Concatenate(n) => n.description(),
            PlanNode::ClientWindow(n) => n.description(),
            PlanNode::ClientAggregate(n) => n.description(),
            PlanNode::CountOptimized(n) => n.description(),
            PlanNode::TdsScan(n) => n.description(),
            PlanNode::DmlExecute(n) => n.description(),
            PlanNode::ScriptExecution(n) => n.description(),
        }
    }

    /// `≥ 0` or `-1` for unknown (spec §3 "Plan tree").
    pub fn estimated_rows(&self) -> i64 {
        match self {
            PlanNode::FetchXmlScan(_) => -1,
            PlanNode::AdaptiveAggregateScan(_) => -1,
            PlanNode::ParallelPartition(n) => n.children.iter().map(|c| c.estimated_rows()).sum(),
            PlanNode::MergeAggregate(n) => n.input.estimated_rows(),
            PlanNode::ClientFilter(n) => n.input.estimated_rows(),
            PlanNode::Project(n) => n.input.estimated_rows(),
            PlanNode::Distinct(n) => n.input.estimated_rows(),
            PlanNode::Concatenate(n) => {
                let rows: Vec<i64> = n.children.iter().map(|c| c.estimated_rows()).collect();
                if rows.iter().any(|r| *r < 0) {
                    -1
                } else {
                    rows.iter().sum()
                }
            }
            PlanNode::ClientWindow(n) => n.input.estimated_rows(),
            PlanNode::ClientAggregate(_) => -1,
            PlanNode::CountOptimized(_) => 1,
            PlanNode::TdsScan(_) => -1,
            PlanNode::DmlExecute(_) => 1,
            PlanNode::ScriptExecution(_) => -1,
        }
    }

    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::FetchXmlScan(_) => vec![],
            PlanNode::AdaptiveAggregateScan(_) => vec![],
            PlanNode::ParallelPartition(n) => n.children.iter().collect(),
            PlanNode::MergeAggregate(n) => vec![n.input.as_ref()],
            PlanNode::ClientFilter(n) => vec![n.input.as_ref()],
            PlanNode::Project(n) => vec![n.input.as_ref()],
            PlanNode::Distinct(n) => vec![n.input.as_ref()],
            PlanNode::Concatenate(n) => n.children.iter().collect(),
            PlanNode::ClientWindow(n) => vec![n.input.as_ref()],
            PlanNode::ClientAggregate(n) => vec![n.input.as_ref()],
            PlanNode::CountOptimized(n) => n.fallback.iter().map(|b| b.as_ref()).collect(),
            PlanNode::TdsScan(_) => vec![],
            PlanNode::DmlExecute(n) => n.source.iter().map(|b| b.as_ref()).collect(),
            PlanNode::ScriptExecution(_) => vec![],
        }
    }

    /// Runs the node, consuming it. Recursion into children happens inside
    /// each node's own `execute`.
    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        match self {
            PlanNode::FetchXmlScan(n) => n.execute(ctx),
            PlanNode::AdaptiveAggregateScan(n) => n.execute(ctx),
            PlanNode::ParallelPartition(n) => n.execute(ctx),
            PlanNode::MergeAggregate(n) => n.execute(ctx),
            PlanNode::ClientFilter(n) => n.execute(ctx),
            PlanNode::Project(n) => n.execute(ctx),
            PlanNode::Distinct(n) => n.execute(ctx),
            PlanNode::Concatenate(n) => n.execute(ctx),
            PlanNode::ClientWindow(n) => n.execute(ctx),
            PlanNode::ClientAggregate(n) => n.execute(ctx),
            PlanNode::CountOptimized(n) => n.execute(ctx),
            PlanNode::TdsScan(n) => n.execute(ctx),
            PlanNode::DmlExecute(n) => n.execute(ctx),
            PlanNode::ScriptExecution(n) => n.execute(ctx),
        }
    }
}

/// A single `{description, estimated_rows, children}` node in an `explain`
/// response (spec §4.6/§6); `pool_capacity`/`effective_parallelism` are set
/// only on `ParallelPartition` nodes.
#[derive(Debug, Clone)]
pub struct PlanDescription {
    pub description: String,
    pub estimated_rows: i64,
    pub children: Vec<PlanDescription>,
    pub pool_capacity: Option<usize>,
    pub effective_parallelism: Option<usize>,
}

pub fn describe(node: &PlanNode) -> PlanDescription {
    let pool_capacity = match node {
        PlanNode::ParallelPartition(n) => Some(n.max_parallelism),
        _ => None,
    };
    PlanDescription {
        description: node.description(),
        estimated_rows: node.estimated_rows(),
        children: node.children().into_iter().map(describe).collect(),
        pool_capacity,
        effective_parallelism: pool_capacity,
    }
}
