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

//! Auto-expands lookup/option-set/boolean columns on a materialized row (C10,
//! spec §4.10). Runs after `Project`, which already resolves a `*name`
//! reference in the select list down to its base attribute (the remote has no
//! such attribute to query directly) — so by the time a row reaches here, an
//! explicitly requested virtual column shows up under its *own* output name
//! but still carries the base attribute's raw value. This pass fixes those up
//! to the formatted value, and adds the sibling for every other
//! lookup/option-set/boolean column that was not named explicitly.

use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use ppds_query_catalog::VirtualColumnMap;
use std::collections::HashSet;

/// `owneridname`, `statuscodename`, … — the same `{base}name` convention
/// `virtual_base_name` recognizes in reverse during FetchXML generation.
fn virtual_output_name(base_name: &str) -> String {
    format!("{}name", base_name)
}

/// Expands one row. `virtual_columns` is the map the plan builder produced
/// for this query (empty unless a `*name` reference was explicit in the
/// select list); callers skip this entirely for aggregate results (spec
/// §4.10 "Aggregate results are not expanded").
pub fn expand_row(row: &QueryRow, virtual_columns: &VirtualColumnMap) -> QueryRow {
    let existing: HashSet<String> = row
        .columns
        .iter()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect();

    let mut out = QueryRow::new(row.entity_logical_name.clone());
    for (name, value) in &row.columns {
        if let Some(vc) = virtual_columns.get(name) {
            // This column only exists because `{vc.base_name}name` was named
            // explicitly; it carries `vc.base_name`'s raw value under the
            // virtual name, so swap in the formatted label.
            out.push(name.clone(), formatted_value(value));
            continue;
        }

        out.push(name.clone(), value.clone());

        let expandable = value.metadata.is_lookup || value.metadata.is_option_set || value.metadata.is_boolean;
        if !expandable {
            continue;
        }
        let sibling = virtual_output_name(name);
        if existing.contains(&sibling.to_ascii_lowercase()) {
            // Explicitly selected both the base and its `*name` sibling;
            // the sibling's own entry in `row.columns` will be fixed up (or
            // was already emitted, if it preceded this one) when its turn
            // comes round in this same loop.
            continue;
        }
        if let Some(formatted) = &value.metadata.formatted_value {
            out.push(sibling, QueryValue::new(Scalar::String(formatted.clone())));
        }
    }
    out
}

fn formatted_value(value: &QueryValue) -> QueryValue {
    match &value.metadata.formatted_value {
        Some(formatted) => QueryValue::new(Scalar::String(formatted.clone())),
        None => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_catalog::row::ValueMetadata;

    fn lookup_value(formatted: &str) -> QueryValue {
        QueryValue::with_metadata(
            Scalar::Guid(uuid::Uuid::nil()),
            ValueMetadata { formatted_value: Some(formatted.to_string()), is_lookup: true, ..Default::default() },
        )
    }

    fn option_set_value(formatted: &str) -> QueryValue {
        QueryValue::with_metadata(
            Scalar::Int(1),
            ValueMetadata { formatted_value: Some(formatted.to_string()), is_option_set: true, ..Default::default() },
        )
    }

    #[test]
    fn plain_lookup_gains_a_name_sibling() {
        let mut row = QueryRow::new("account");
        row.push("ownerid", lookup_value("Jim Glynn"));
        let expanded = expand_row(&row, &VirtualColumnMap::new());

        assert_eq!(expanded.get("ownerid").unwrap().value, Scalar::Guid(uuid::Uuid::nil()));
        assert_eq!(
            expanded.get("owneridname").unwrap().value,
            Scalar::String("Jim Glynn".to_string())
        );
    }

    #[test]
    fn explicit_name_only_request_hides_the_base() {
        // Project already drops the raw `ownerid` entry when only
        // `owneridname` was selected; the row arrives with just one column.
        let mut row = QueryRow::new("account");
        row.push("owneridname", lookup_value("Jim Glynn"));

        let mut virtual_columns = VirtualColumnMap::new();
        virtual_columns.insert("owneridname", "ownerid", false);

        let expanded = expand_row(&row, &virtual_columns);
        assert!(expanded.get("ownerid").is_none());
        assert_eq!(
            expanded.get("owneridname").unwrap().value,
            Scalar::String("Jim Glynn".to_string())
        );
    }

    #[test]
    fn explicit_request_of_both_keeps_both() {
        let mut row = QueryRow::new("account");
        row.push("ownerid", lookup_value("Jim Glynn"));
        row.push("owneridname", lookup_value("Jim Glynn"));

        let mut virtual_columns = VirtualColumnMap::new();
        virtual_columns.insert("owneridname", "ownerid", true);

        let expanded = expand_row(&row, &virtual_columns);
        assert_eq!(expanded.get("ownerid").unwrap().value, Scalar::Guid(uuid::Uuid::nil()));
        assert_eq!(
            expanded.get("owneridname").unwrap().value,
            Scalar::String("Jim Glynn".to_string())
        );
    }

    #[test]
    fn option_set_and_boolean_columns_expand_the_same_way() {
        let mut row = QueryRow::new("account");
        row.push("statuscode", option_set_value("Active"));
        let expanded = expand_row(&row, &VirtualColumnMap::new());
        assert_eq!(
            expanded.get("statuscodename").unwrap().value,
            Scalar::String("Active".to_string())
        );
    }

    #[test]
    fn column_without_metadata_is_untouched() {
        let mut row = QueryRow::new("account");
        row.push("name", QueryValue::new(Scalar::String("Contoso".to_string())));
        let expanded = expand_row(&row, &VirtualColumnMap::new());
        assert_eq!(expanded.columns.len(), 1);
        assert!(expanded.get("namename").is_none());
    }

    #[test]
    fn missing_formatted_value_skips_the_sibling() {
        let mut row = QueryRow::new("account");
        let mut value = lookup_value("unused");
        value.metadata.formatted_value = None;
        row.push("ownerid", value);
        let expanded = expand_row(&row, &VirtualColumnMap::new());
        assert!(expanded.get("owneridname").is_none());
    }
}
