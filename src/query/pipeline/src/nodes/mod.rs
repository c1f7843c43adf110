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

pub mod adaptive_aggregate_scan;
pub mod client_aggregate;
pub mod client_filter;
pub mod client_window;
pub mod concatenate;
pub mod count_optimized;
pub mod distinct;
pub mod dml_execute;
pub mod fetchxml_scan;
pub mod merge_aggregate;
pub mod parallel_partition;
pub mod project;
pub mod script_execution;
pub mod tds_scan;
