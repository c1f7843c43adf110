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

//! T-SQL lexing, AST, and recursive-descent parsing for the Dataverse query
//! engine. Downstream crates consume [`ast`] types and [`parse_sql`]; the
//! [`lexer`]/[`token`] modules are also exposed standalone for editor
//! highlighting use cases that never need a full parse.

pub mod ast;
pub mod error;
pub mod lexer;
mod parser;
pub mod token;

pub use error::ParseError;
pub use parser::parse_sql;
pub use token::highlight_tokens;
