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

//! Plan node library (C5) and plan executor (C6): a closed `PlanNode` enum
//! (spec §9 "tagged variants rather than open inheritance") whose variants
//! each own an asynchronous row producer, plus the walker that drives one to
//! completion or chunks it for streaming callers.

pub mod executor;
pub mod nodes;
pub mod plan_node;

pub use executor::execute_plan;
pub use executor::execute_plan_streaming;
pub use executor::ColumnInfo;
pub use executor::ColumnKind;
pub use executor::RowChunk;
pub use plan_node::describe;
pub use plan_node::PlanDescription;
pub use plan_node::PlanNode;
pub use plan_node::RowStream;
