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

//! Query data model (`Scalar`/`QueryValue`/`QueryRow`), shared execution
//! state (`PlanContext`, `Statistics`, `VariableScope`), and the remote
//! executor contracts (`RemoteQueryExecutor`/`TdsExecutor`/`BulkExecutor`/
//! `MetadataCatalog`) that a caller implements to plug in a live Dataverse
//! connection.

pub mod executor;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod plan_context;
pub mod row;
pub mod scalar;
pub mod statistics;
pub mod variables;
pub mod virtual_columns;

pub use executor::BulkExecutor;
pub use executor::BulkOutcome;
pub use executor::BulkResult;
pub use executor::FetchXmlPage;
pub use executor::MetadataCatalog;
pub use executor::RemoteQueryExecutor;
pub use executor::TdsExecutor;
pub use executor::TdsResult;
pub use plan_context::PlanContext;
pub use row::QueryRow;
pub use row::QueryValue;
pub use row::ValueMetadata;
pub use scalar::Scalar;
pub use statistics::Statistics;
pub use variables::VariableScope;
pub use variables::VariableSlot;
pub use virtual_columns::VirtualColumn;
pub use virtual_columns::VirtualColumnMap;
