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
use ppds_common_exception::Result;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use ppds_query_expression::compare_scalars;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// How a single aggregate output column combines across partial rows
/// produced by different partitions (spec §4.5.4).
#[derive(Debug, Clone)]
pub enum AggregateMergeKind {
    /// `COUNT`/`SUM` both merge by summing partials.
    Sum,
    Min,
    Max,
    /// Merges as `sum(partial_avg * partial_count) / sum(partial_count)`;
    /// falls back to treating the partial as `(sum = value, count = 1)` when
    /// `count_column` is absent from a row.
    Avg,
    /// `COUNT(DISTINCT ...)` is never merged; the planner routes it to a
    /// single partition (spec §9 Open Question), so this just forwards the
    /// one value it ever sees.
    CountDistinct,
}

#[derive(Debug, Clone)]
pub struct AggregateMergeSpec {
    pub output_column: String,
    pub kind: AggregateMergeKind,
    pub count_column: Option<String>,
}

pub struct MergeAggregate {
    pub input: Box<PlanNode>,
    pub group_by: Vec<String>,
    pub specs: Vec<AggregateMergeSpec>,
}

enum Accumulated {
    Sum { sum: Decimal, was_int: bool, seen: bool },
    MinMax(Option<Scalar>),
    Avg { weighted_sum: Decimal, weighted_count: Decimal },
    First(Option<Scalar>),
}

struct GroupState {
    entity_logical_name: String,
    group_values: Vec<(String, QueryValue)>,
    acc: HashMap<String, Accumulated>,
}

impl MergeAggregate {
    pub fn description(&self) -> String {
        format!("MergeAggregate(group_by={:?}, aggregates={})", self.group_by, self.specs.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, GroupState> = HashMap::new();

            let mut stream = self.input.execute(ctx.clone());
            use futures::StreamExt;
            while let Some(row) = stream.next().await {
                ctx.cancellation.check()?;
                let row = row?;
                let key = row.composite_key(&self.group_by);
                let state = groups.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    let group_values = self
                        .group_by
                        .iter()
                        .map(|name| (name.clone(), row.get(name).cloned().unwrap_or_else(QueryValue::null)))
                        .collect();
                    GroupState {
                        entity_logical_name: row.entity_logical_name.clone(),
                        group_values,
                        acc: HashMap::new(),
                    }
                });

                for spec in &self.specs {
                    let value = row.get(&spec.output_column).map(|v| v.value.clone()).unwrap_or(Scalar::Null);
                    merge_one(state, spec, value, &row);
                }
            }

            for key in order {
                let state = groups.remove(&key).expect("group recorded in order must exist");
                let mut out = QueryRow::new(state.entity_logical_name);
                for (name, value) in state.group_values {
                    out.push(name, value);
                }
                for spec in &self.specs {
                    let final_value = state
                        .acc
                        .get(&spec.output_column)
                        .map(finalize)
                        .unwrap_or(Scalar::Null);
                    out.push(spec.output_column.clone(), QueryValue::new(final_value));
                }
                yield out;
            }
        })
    }
}

fn merge_one(state: &mut GroupState, spec: &AggregateMergeSpec, value: Scalar, row: &QueryRow) {
    match spec.kind {
        AggregateMergeKind::Sum => {
            let entry = state.acc.entry(spec.output_column.clone()).or_insert(Accumulated::Sum {
                sum: Decimal::ZERO,
                was_int: matches!(value, Scalar::Int(_)),
                seen: false,
            });
            if let Accumulated::Sum { sum, seen, .. } = entry {
                if let Some(d) = value.as_decimal() {
                    *sum += d;
                    *seen = true;
                }
            }
        }
        AggregateMergeKind::Min => {
            let entry = state
                .acc
                .entry(spec.output_column.clone())
                .or_insert(Accumulated::MinMax(None));
            if let Accumulated::MinMax(current) = entry {
                if !value.is_null() {
                    *current = Some(match current.take() {
                        None => value,
                        Some(existing) => {
                            if compare_scalars(&value, &existing) == std::cmp::Ordering::Less {
                                value
                            } else {
                                existing
                            }
                        }
                    });
                }
            }
        }
        AggregateMergeKind::Max => {
            let entry = state
                .acc
                .entry(spec.output_column.clone())
                .or_insert(Accumulated::MinMax(None));
            if let Accumulated::MinMax(current) = entry {
                if !value.is_null() {
                    *current = Some(match current.take() {
                        None => value,
                        Some(existing) => {
                            if compare_scalars(&value, &existing) == std::cmp::Ordering::Greater {
                                value
                            } else {
                                existing
                            }
                        }
                    });
                }
            }
        }
        AggregateMergeKind::Avg => {
            let entry = state.acc.entry(spec.output_column.clone()).or_insert(Accumulated::Avg {
                weighted_sum: Decimal::ZERO,
                weighted_count: Decimal::ZERO,
            });
            if let Accumulated::Avg { weighted_sum, weighted_count } = entry {
                if let Some(avg) = value.as_decimal() {
                    let count = spec
                        .count_column
                        .as_ref()
                        .and_then(|c| row.get(c))
                        .and_then(|v| v.value.as_decimal())
                        .unwrap_or(Decimal::ONE);
                    *weighted_sum += avg * count;
                    *weighted_count += count;
                }
            }
        }
        AggregateMergeKind::CountDistinct => {
            state
                .acc
                .entry(spec.output_column.clone())
                .or_insert(Accumulated::First(Some(value)));
        }
    }
}

fn finalize(acc: &Accumulated) -> Scalar {
    match acc {
        Accumulated::Sum { sum, was_int, seen } => {
            if !seen {
                Scalar::Null
            } else if *was_int {
                Scalar::Int(sum.round().to_string().parse::<i64>().unwrap_or(0))
            } else {
                Scalar::Decimal(*sum)
            }
        }
        Accumulated::MinMax(v) => v.clone().unwrap_or(Scalar::Null),
        Accumulated::Avg { weighted_sum, weighted_count } => {
            if weighted_count.is_zero() {
                Scalar::Null
            } else {
                Scalar::Decimal(weighted_sum / weighted_count)
            }
        }
        Accumulated::First(v) => v.clone().unwrap_or(Scalar::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_accumulator_finalizes_to_decimal_when_not_int() {
        let acc = Accumulated::Sum { sum: Decimal::from(7), was_int: false, seen: true };
        assert_eq!(finalize(&acc), Scalar::Decimal(Decimal::from(7)));
    }

    #[test]
    fn avg_accumulator_finalizes_to_null_with_no_samples() {
        let acc = Accumulated::Avg { weighted_sum: Decimal::ZERO, weighted_count: Decimal::ZERO };
        assert_eq!(finalize(&acc), Scalar::Null);
    }

    #[test]
    fn avg_accumulator_divides_weighted_sum_by_weighted_count() {
        let acc = Accumulated::Avg {
            weighted_sum: Decimal::from(30),
            weighted_count: Decimal::from(3),
        };
        assert_eq!(finalize(&acc), Scalar::Decimal(Decimal::from(10)));
    }
}
