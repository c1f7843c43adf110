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

use ppds_query_catalog::Scalar;
use std::cmp::Ordering;

/// Three-way comparison used by `ClientWindow`'s ORDER BY and by expression
/// comparisons (spec §4.5.9): numeric if both sides are numeric, `DateTime`
/// if both sides are `DateTime`, otherwise case-insensitive string. Nulls
/// sort last regardless of direction (the caller reverses for DESC).
pub fn compare_scalars(a: &Scalar, b: &Scalar) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    if a.is_numeric() && b.is_numeric() {
        if let (Some(da), Some(db)) = (a.as_decimal(), b.as_decimal()) {
            return da.cmp(&db);
        }
    }

    if let (Scalar::DateTime(da), Scalar::DateTime(db)) = (a, b) {
        return da.cmp(db);
    }

    a.key_string()
        .to_ascii_lowercase()
        .cmp(&b.key_string().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_last() {
        assert_eq!(compare_scalars(&Scalar::Null, &Scalar::Int(1)), Ordering::Greater);
        assert_eq!(compare_scalars(&Scalar::Int(1), &Scalar::Null), Ordering::Less);
    }

    #[test]
    fn numeric_compares_by_value_not_string() {
        assert_eq!(compare_scalars(&Scalar::Int(9), &Scalar::Int(10)), Ordering::Less);
    }

    #[test]
    fn string_fallback_is_case_insensitive() {
        assert_eq!(
            compare_scalars(&Scalar::String("ABC".into()), &Scalar::String("abc".into())),
            Ordering::Equal
        );
    }
}
