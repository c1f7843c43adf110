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
use futures::StreamExt;
use ppds_common_exception::ErrorCode;
use ppds_query_ast::ast::Expr;
use ppds_query_ast::ast::OrderByItem;
use ppds_query_ast::ast::OrderDirection;
use ppds_query_ast::ast::WindowFunc;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use ppds_query_catalog::VariableScope;
use ppds_query_expression::compare_scalars;
use ppds_query_expression::evaluate;
use ppds_query_expression::EvalContext;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

pub struct WindowDefinition {
    pub output_column: String,
    pub func: WindowFunc,
    pub arg: Option<Expr>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
}

/// Materializes the whole input, partitions/sorts/computes window values,
/// then re-emits rows in original order with the window columns appended
/// (spec §4.5.9).
pub struct ClientWindow {
    pub input: Box<PlanNode>,
    pub windows: Vec<WindowDefinition>,
}

impl ClientWindow {
    pub fn description(&self) -> String {
        format!("ClientWindow(windows={})", self.windows.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let cap = ctx.options.max_client_window_rows;
            let mut rows = Vec::new();
            {
                let mut stream = self.input.execute(ctx.clone());
                while let Some(row) = stream.next().await {
                    ctx.cancellation.check()?;
                    let row = row?;
                    if rows.len() >= cap {
                        Err(ErrorCode::MemoryLimitExceeded(format!(
                            "ClientWindow materialization exceeded {} rows",
                            cap
                        )))?;
                    }
                    rows.push(row);
                }
            }

            let mut columns: Vec<Vec<QueryValue>> = vec![Vec::with_capacity(rows.len()); self.windows.len()];

            {
                let variables = ctx.variables.lock();
                for (w_idx, window) in self.windows.iter().enumerate() {
                    columns[w_idx] = compute_window(window, &rows, &variables)?;
                }
            }

            for (idx, mut row) in rows.into_iter().enumerate() {
                for (w_idx, window) in self.windows.iter().enumerate() {
                    row.push(window.output_column.clone(), columns[w_idx][idx].clone());
                }
                yield row;
            }
        })
    }
}

fn compute_window(
    window: &WindowDefinition,
    rows: &[ppds_query_catalog::QueryRow],
    variables: &VariableScope,
) -> ppds_common_exception::Result<Vec<QueryValue>> {
    let mut partitions: HashMap<String, Vec<usize>> = HashMap::new();
    let mut partition_order: Vec<String> = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let eval_ctx = EvalContext::new(Some(row), variables);
        let key = partition_key(&window.partition_by, row, &eval_ctx)?;
        partitions.entry(key.clone()).or_insert_with(|| {
            partition_order.push(key.clone());
            Vec::new()
        });
        partitions.get_mut(&key).unwrap().push(idx);
    }

    let mut out: Vec<QueryValue> = vec![QueryValue::null(); rows.len()];

    for key in partition_order {
        let mut members = partitions.remove(&key).unwrap();
        members.sort_by(|&a, &b| {
            for item in &window.order_by {
                let ctx_a = EvalContext::new(Some(&rows[a]), variables);
                let ctx_b = EvalContext::new(Some(&rows[b]), variables);
                let va = evaluate(&item.expr, &ctx_a).unwrap_or(Scalar::Null);
                let vb = evaluate(&item.expr, &ctx_b).unwrap_or(Scalar::Null);
                let ord = compare_with_direction(&va, &vb, item.direction);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });

        if window.func.is_ranking() {
            assign_ranks(window, &members, rows, variables, &mut out)?;
        } else {
            let value = compute_partition_aggregate(window, &members, rows, variables)?;
            for &idx in &members {
                out[idx] = QueryValue::new(value.clone());
            }
        }
    }

    Ok(out)
}

fn partition_key(
    partition_by: &[Expr],
    _row: &ppds_query_catalog::QueryRow,
    eval_ctx: &EvalContext,
) -> ppds_common_exception::Result<String> {
    const SEP: &str = "\u{0}SEP\u{0}";
    let mut parts = Vec::with_capacity(partition_by.len());
    for expr in partition_by {
        let value = evaluate(expr, eval_ctx)?;
        parts.push(value.key_string());
    }
    Ok(parts.join(SEP))
}

fn compare_with_direction(a: &Scalar, b: &Scalar, direction: OrderDirection) -> std::cmp::Ordering {
    let ord = compare_scalars(a, b);
    if direction == OrderDirection::Desc && !a.is_null() && !b.is_null() {
        ord.reverse()
    } else {
        ord
    }
}

fn assign_ranks(
    window: &WindowDefinition,
    members: &[usize],
    rows: &[ppds_query_catalog::QueryRow],
    variables: &VariableScope,
    out: &mut [QueryValue],
) -> ppds_common_exception::Result<()> {
    let mut row_number: i64 = 0;
    let mut rank: i64 = 0;
    let mut dense_rank: i64 = 0;
    let mut last_key: Option<Vec<Scalar>> = None;

    for &idx in members {
        row_number += 1;
        let eval_ctx = EvalContext::new(Some(&rows[idx]), variables);
        let mut current_key = Vec::with_capacity(window.order_by.len());
        for item in &window.order_by {
            current_key.push(evaluate(&item.expr, &eval_ctx)?);
        }

        let is_tie = last_key.as_ref() == Some(&current_key);
        if !is_tie {
            rank = row_number;
            dense_rank += 1;
        }
        last_key = Some(current_key);

        out[idx] = QueryValue::new(match window.func {
            WindowFunc::RowNumber => Scalar::Int(row_number),
            WindowFunc::Rank => Scalar::Int(rank),
            WindowFunc::DenseRank => Scalar::Int(dense_rank),
            _ => unreachable!("is_ranking() restricts to ranking functions"),
        });
    }
    Ok(())
}

fn compute_partition_aggregate(
    window: &WindowDefinition,
    members: &[usize],
    rows: &[ppds_query_catalog::QueryRow],
    variables: &VariableScope,
) -> ppds_common_exception::Result<Scalar> {
    if matches!(window.func, WindowFunc::Count) && matches!(window.arg.as_ref(), None | Some(Expr::Star)) {
        return Ok(Scalar::Int(members.len() as i64));
    }

    let mut sum = Decimal::ZERO;
    let mut count: i64 = 0;
    let mut min: Option<Scalar> = None;
    let mut max: Option<Scalar> = None;

    for &idx in members {
        let Some(arg) = &window.arg else { continue };
        let eval_ctx = EvalContext::new(Some(&rows[idx]), variables);
        let value = evaluate(arg, &eval_ctx)?;
        if value.is_null() {
            continue;
        }
        if let Some(d) = value.as_decimal() {
            sum += d;
        }
        count += 1;
        min = Some(match min {
            None => value.clone(),
            Some(existing) => {
                if compare_scalars(&value, &existing) == std::cmp::Ordering::Less {
                    value.clone()
                } else {
                    existing
                }
            }
        });
        max = Some(match max {
            None => value.clone(),
            Some(existing) => {
                if compare_scalars(&value, &existing) == std::cmp::Ordering::Greater {
                    value
                } else {
                    existing
                }
            }
        });
    }

    Ok(match window.func {
        WindowFunc::Sum => {
            if count == 0 {
                Scalar::Null
            } else {
                Scalar::Decimal(sum)
            }
        }
        WindowFunc::Count => Scalar::Int(count),
        WindowFunc::Avg => {
            if count == 0 {
                Scalar::Null
            } else {
                Scalar::Decimal(sum / Decimal::from(count))
            }
        }
        WindowFunc::Min => min.unwrap_or(Scalar::Null),
        WindowFunc::Max => max.unwrap_or(Scalar::Null),
        WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank => {
            unreachable!("ranking functions handled by assign_ranks")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_aware_cmp_keeps_nulls_last_in_descending_order() {
        let ord = compare_with_direction(&Scalar::Null, &Scalar::Int(1), OrderDirection::Desc);
        assert_eq!(ord, std::cmp::Ordering::Greater);
    }

    #[test]
    fn direction_aware_cmp_reverses_non_null_values() {
        let ord = compare_with_direction(&Scalar::Int(1), &Scalar::Int(2), OrderDirection::Desc);
        assert_eq!(ord, std::cmp::Ordering::Greater);
    }
}
