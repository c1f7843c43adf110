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

use crate::plan_node::RowStream;
use async_stream::try_stream;
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_catalog::plan_context::PlanContext;
use std::sync::Arc;

/// Remote exception message fragments that map to `AggregateLimitExceeded`
/// (spec §4.5.1).
const AGGREGATE_LIMIT_MARKERS: &[&str] = &[
    "AggregateQueryRecordLimit",
    "aggregate operation exceeded",
    "maximum record limit of 50000",
];

pub fn is_aggregate_limit_error(message: &str) -> bool {
    AGGREGATE_LIMIT_MARKERS.iter().any(|m| message.contains(m))
}

/// Rewrites a `TOP N` into `count=min(N, 5000)` so the request never combines
/// `top` with paging (spec §4.3/§4.5.1). A no-op if `top_n` is absent.
pub fn rewrite_top_to_count(top_n: Option<u64>, max_page_size: u32) -> Option<u32> {
    top_n.map(|n| n.min(max_page_size as u64) as u32)
}

/// Decides whether the first row of a newly fetched page shares its parent
/// with the last row the previous page emitted, in which case the caller
/// should fold it into the existing parent group instead of emitting a
/// duplicate (spec §4.5.1 "a single parent record's children may straddle a
/// page boundary").
pub fn should_merge_with_previous_page(last_parent_id: Option<&str>, first_parent_id: &str) -> bool {
    last_parent_id == Some(first_parent_id)
}

pub enum ScanMode {
    AutoPage { max_rows: Option<u64> },
    SinglePage {
        initial_page_number: Option<u32>,
        initial_paging_cookie: Option<String>,
    },
}

pub struct FetchXmlScan {
    pub fetchxml: String,
    pub entity_logical_name: String,
    pub mode: ScanMode,
    pub top_n: Option<u64>,
    pub primary_key_column: Option<String>,
}

impl FetchXmlScan {
    pub fn description(&self) -> String {
        format!("FetchXmlScan({})", self.entity_logical_name)
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            ctx.cancellation.check()?;
            let max_page_size = ctx.options.max_page_size;
            let count_override = rewrite_top_to_count(self.top_n, max_page_size);
            let fetchxml = inject_count(&self.fetchxml, count_override);

            let mut rows_emitted: u64 = 0;
            let row_limit = match &self.mode {
                ScanMode::AutoPage { max_rows } => *max_rows,
                ScanMode::SinglePage { .. } => self.top_n,
            };

            let mut page_number = match &self.mode {
                ScanMode::AutoPage { .. } => Some(1),
                ScanMode::SinglePage { initial_page_number, .. } => *initial_page_number,
            };
            let mut paging_cookie = match &self.mode {
                ScanMode::AutoPage { .. } => None,
                ScanMode::SinglePage { initial_paging_cookie, .. } => initial_paging_cookie.clone(),
            };
            let mut last_parent_id: Option<String> = None;
            let auto_page = matches!(self.mode, ScanMode::AutoPage { .. });

            loop {
                ctx.cancellation.check()?;
                let page = ctx
                    .remote
                    .fetch_xml(&fetchxml, page_number, paging_cookie.as_deref(), false, &ctx.cancellation)
                    .await
                    .map_err(|e| remap_aggregate_limit(e))?;

                ctx.statistics.add_page();
                log::debug!(
                    target: "ppds_query_pipeline::fetchxml_scan",
                    "fetched page {:?} for {} ({} rows)",
                    page.page_number, self.entity_logical_name, page.records.len()
                );

                let mut records = page.records;
                if let Some(pk) = &self.primary_key_column {
                    if let (Some(last), Some(first_row)) = (&last_parent_id, records.first()) {
                        if let Some(first_id) = first_row.get(pk) {
                            if should_merge_with_previous_page(Some(last.as_str()), &first_id.value.key_string()) {
                                records.remove(0);
                            }
                        }
                    }
                    if let Some(last_row) = records.last() {
                        if let Some(v) = last_row.get(pk) {
                            last_parent_id = Some(v.value.key_string());
                        }
                    }
                }

                for row in records {
                    if let Some(limit) = row_limit {
                        if rows_emitted >= limit {
                            return;
                        }
                    }
                    ctx.cancellation.check()?;
                    ctx.statistics.add_rows_read(1);
                    rows_emitted += 1;
                    yield row;
                }

                ctx.statistics.record_page(page.paging_cookie.clone(), page.more_records, page.page_number as u64);
                ctx.statistics.record_total_count(page.total_count);

                if !auto_page || !page.more_records {
                    break;
                }
                if let Some(limit) = row_limit {
                    if rows_emitted >= limit {
                        break;
                    }
                }
                paging_cookie = page.paging_cookie;
                page_number = Some(page.page_number + 1);
            }
        })
    }
}

fn remap_aggregate_limit(e: ErrorCode) -> ErrorCode {
    if e.is_cancelled() {
        return e;
    }
    if is_aggregate_limit_error(&e.message()) {
        ErrorCode::AggregateLimitExceeded(e.message())
    } else {
        e
    }
}

/// Minimal FetchXML text patch: sets/overrides `count="N"` on the `<fetch>`
/// root and strips any `top` attribute, since the two cannot coexist (spec
/// §4.3).
fn inject_count(fetchxml: &str, count: Option<u32>) -> String {
    let Some(count) = count else { return fetchxml.to_string() };
    let mut out = fetchxml.replacen("top=", "count=", 1);
    if !out.contains("count=") {
        out = out.replacen("<fetch ", &format!("<fetch count=\"{}\" ", count), 1);
    } else if let Some(start) = out.find("count=\"") {
        let value_start = start + "count=\"".len();
        if let Some(end_rel) = out[value_start..].find('"') {
            let end = value_start + end_rel;
            out.replace_range(value_start..end, &count.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_top_caps_at_remote_page_max() {
        assert_eq!(rewrite_top_to_count(Some(10_000), 5000), Some(5000));
        assert_eq!(rewrite_top_to_count(Some(10), 5000), Some(10));
        assert_eq!(rewrite_top_to_count(None, 5000), None);
    }

    #[test]
    fn aggregate_limit_markers_detected() {
        assert!(is_aggregate_limit_error("the maximum record limit of 50000 was exceeded"));
        assert!(!is_aggregate_limit_error("connection reset"));
    }

    #[test]
    fn merge_decision_matches_parent_id() {
        assert!(should_merge_with_previous_page(Some("abc"), "abc"));
        assert!(!should_merge_with_previous_page(Some("abc"), "def"));
        assert!(!should_merge_with_previous_page(None, "abc"));
    }

    #[test]
    fn inject_count_adds_attribute_when_absent() {
        let out = inject_count("<fetch><entity name='account'/></fetch>", Some(500));
        assert!(out.contains("count=\"500\""));
    }
}
