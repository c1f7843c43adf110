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

//! Semantic validator (C2), FetchXML generator (C3), and plan builder (C4):
//! the layer that turns a parsed [`ppds_query_ast::ast::Script`] into the
//! diagnostics and [`ppds_query_pipeline::PlanNode`] tree the executor runs.

pub mod fetchxml;
pub mod plan_builder;
pub mod validator;

pub use fetchxml::FetchXmlGenerator;
pub use fetchxml::GeneratedFetchXml;
pub use plan_builder::PlanBuilder;
pub use plan_builder::PlanResult;
pub use validator::Diagnostic;
pub use validator::SemanticValidator;
pub use validator::Severity;
