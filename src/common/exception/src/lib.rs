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

//! Stable, machine-readable error surface shared by every `ppds-*` crate.
//!
//! Mirrors the teacher's `ErrorCode` pattern (a code-generated enum with one
//! tuple-style constructor per variant) but scoped to the codes this engine
//! actually raises (see spec §6 "Error-code surface").

mod code;

pub use code::ErrorCode;

pub type Result<T> = std::result::Result<T, ErrorCode>;
