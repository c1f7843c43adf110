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

use crate::plan_node::PlanNode;
use crate::plan_node::RowStream;
use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use ppds_common_exception::Result;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use std::sync::Arc;

/// Walks the root node's row stream, forwarding rows and propagating
/// cancellation (spec §4.6).
pub fn execute_plan(root: PlanNode, ctx: Arc<PlanContext>) -> RowStream {
    root.execute(ctx)
}

/// Column type inferred from a value's metadata for the streaming surface's
/// first-chunk column list (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Lookup,
    OptionSet,
    Boolean,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

fn infer_columns(row: &QueryRow) -> Vec<ColumnInfo> {
    row.columns
        .iter()
        .map(|(name, value)| {
            let kind = if value.metadata.is_lookup {
                ColumnKind::Lookup
            } else if value.metadata.is_option_set {
                ColumnKind::OptionSet
            } else if value.metadata.is_boolean {
                ColumnKind::Boolean
            } else {
                ColumnKind::Unknown
            };
            ColumnInfo { name: name.clone(), kind }
        })
        .collect()
}

/// One chunk of the `execute_streaming` surface (spec §6): the first chunk
/// carries inferred columns, entity name, and the transpiled FetchXML.
#[derive(Debug, Clone)]
pub struct RowChunk {
    pub rows: Vec<QueryRow>,
    pub columns: Option<Vec<ColumnInfo>>,
    pub entity_logical_name: Option<String>,
    pub total_rows_so_far: u64,
    pub is_complete: bool,
    pub transpiled_fetchxml: Option<String>,
}

pub fn execute_plan_streaming(
    root: PlanNode,
    ctx: Arc<PlanContext>,
    chunk_size: usize,
    transpiled_fetchxml: Option<String>,
) -> BoxStream<'static, Result<RowChunk>> {
    let chunk_size = chunk_size.max(1);
    Box::pin(try_stream! {
        let mut stream = root.execute(ctx.clone());
        let mut buffer = Vec::with_capacity(chunk_size);
        let mut total: u64 = 0;
        let mut first_chunk = true;

        while let Some(row) = stream.next().await {
            ctx.cancellation.check()?;
            let row = row?;
            buffer.push(row);
            if buffer.len() >= chunk_size {
                total += buffer.len() as u64;
                let rows = std::mem::replace(&mut buffer, Vec::with_capacity(chunk_size));
                yield make_chunk(&rows, total, false, &transpiled_fetchxml, &mut first_chunk);
            }
        }

        total += buffer.len() as u64;
        yield make_chunk(&buffer, total, true, &transpiled_fetchxml, &mut first_chunk);
    })
}

fn make_chunk(
    rows: &[QueryRow],
    total_rows_so_far: u64,
    is_complete: bool,
    transpiled_fetchxml: &Option<String>,
    first_chunk: &mut bool,
) -> RowChunk {
    let (columns, entity_logical_name, fetchxml) = if *first_chunk {
        *first_chunk = false;
        (
            rows.first().map(infer_columns),
            rows.first().map(|r| r.entity_logical_name.clone()),
            transpiled_fetchxml.clone(),
        )
    } else {
        (None, None, None)
    };
    RowChunk {
        rows: rows.to_vec(),
        columns,
        entity_logical_name,
        total_rows_so_far,
        is_complete,
        transpiled_fetchxml: fetchxml,
    }
}
