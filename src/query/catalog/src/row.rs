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

use crate::scalar::Scalar;

/// One lookup/option-set/boolean reference a raw value carries alongside
/// itself (spec §3 `QueryValue`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMetadata {
    pub formatted_value: Option<String>,
    /// `(entity_logical_name, id)` for a lookup value.
    pub lookup_target: Option<(String, String)>,
    pub is_lookup: bool,
    pub is_option_set: bool,
    pub is_boolean: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryValue {
    pub value: Scalar,
    pub metadata: ValueMetadata,
}

impl QueryValue {
    pub fn new(value: Scalar) -> Self {
        QueryValue {
            value,
            metadata: ValueMetadata::default(),
        }
    }

    pub fn with_metadata(value: Scalar, metadata: ValueMetadata) -> Self {
        QueryValue { value, metadata }
    }

    pub fn null() -> Self {
        QueryValue::new(Scalar::Null)
    }
}

/// `QueryRow = (entity_logical_name, ordered mapping column -> value)` (spec §3).
///
/// Backed by a `Vec` rather than a map: plan nodes need to preserve column
/// order (for `Project`'s output list and streaming's "first chunk carries
/// inferred columns") and rows are narrow, so linear lookup is fine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRow {
    pub entity_logical_name: String,
    pub columns: Vec<(String, QueryValue)>,
}

impl QueryRow {
    pub fn new(entity_logical_name: impl Into<String>) -> Self {
        QueryRow {
            entity_logical_name: entity_logical_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: QueryValue) {
        self.columns.push((name.into(), value));
    }

    /// Case-insensitive fallback lookup (spec §4.5.6 `Project`: "copies
    /// renamed columns (case-insensitive fallback for source names)").
    pub fn get(&self, name: &str) -> Option<&QueryValue> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.columns.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, v)| v)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Composite key used by `Distinct`/`ClientWindow`/`ClientAggregate`
    /// (spec §4.5.7): ordered `(column_name, string(value))` pairs joined
    /// with ASCII unit/record separators, `0x00` sentinel for null.
    pub fn composite_key(&self, columns: &[String]) -> String {
        const UNIT_SEP: char = '\u{1F}';
        const NAME_SEP: char = '\u{1E}';
        const NULL_SENTINEL: char = '\u{0}';

        let mut parts = Vec::with_capacity(columns.len());
        for name in columns {
            let rendered = match self.get(name) {
                None => NULL_SENTINEL.to_string(),
                Some(v) if v.value.is_null() => NULL_SENTINEL.to_string(),
                Some(v) => v.value.key_string(),
            };
            parts.push(format!("{}{}{}", name, NAME_SEP, rendered));
        }
        parts.join(&UNIT_SEP.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_distinguishes_null_from_empty_string() {
        let mut a = QueryRow::new("account");
        a.push("name", QueryValue::null());
        let mut b = QueryRow::new("account");
        b.push("name", QueryValue::new(Scalar::String(String::new())));
        let cols = vec!["name".to_string()];
        assert_ne!(a.composite_key(&cols), b.composite_key(&cols));
    }

    #[test]
    fn get_falls_back_to_case_insensitive() {
        let mut row = QueryRow::new("account");
        row.push("Name", QueryValue::new(Scalar::String("Contoso".into())));
        assert!(row.get("name").is_some());
    }
}
