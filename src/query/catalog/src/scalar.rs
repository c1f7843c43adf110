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

use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Closed value variant carried by every `QueryValue` (spec §3 "common
/// high-precision decimal type" / §9 expression evaluator note).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_) | Scalar::Decimal(_))
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, Scalar::DateTime(_))
    }

    /// Best-effort coercion into the common decimal type used for aggregate
    /// math (spec §9): non-numeric, non-null values have no decimal form.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Scalar::Int(i) => Some(Decimal::from(*i)),
            Scalar::Decimal(d) => Some(*d),
            Scalar::Float(f) => Decimal::try_from(*f).ok(),
            _ => None,
        }
    }

    /// Truthiness in a boolean context. SQL's `unknown = false` rule applies:
    /// `Null` is never true (spec §9 "Null semantics ... unknown = false").
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Null => false,
            _ => false,
        }
    }

    /// Canonical string form used by `Distinct`/`ClientWindow` composite keys
    /// (spec §4.5.7/§4.5.9).
    pub fn key_string(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Decimal(d) => d.to_string(),
            Scalar::String(s) => s.clone(),
            Scalar::DateTime(dt) => dt.to_rfc3339(),
            Scalar::Guid(g) => g.to_string(),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key_string())
    }
}
