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

//! Pure expression evaluation over a `QueryRow` and `VariableScope` (spec §9
//! "Expression evaluator"). No crate here talks to the remote service;
//! aggregate/window computation lives in `ppds-query-pipeline`'s plan nodes,
//! which call back into [`compare_scalars`] and [`evaluate`] for their
//! per-row work.

mod compare;
mod eval;
mod functions;

pub use compare::compare_scalars;
pub use eval::evaluate;
pub use eval::evaluate_condition;
pub use eval::EvalContext;
