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
use ppds_query_ast::ast::AggregateFunc;
use ppds_query_ast::ast::Expr;
use ppds_query_catalog::plan_context::PlanContext;
use ppds_query_catalog::QueryRow;
use ppds_query_catalog::QueryValue;
use ppds_query_catalog::Scalar;
use ppds_query_expression::compare_scalars;
use ppds_query_expression::evaluate;
use ppds_query_expression::EvalContext;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

pub struct AggregateSpec {
    pub output_column: String,
    pub func: AggregateFunc,
    pub arg: Option<Expr>,
    pub distinct: bool,
}

/// Aggregates FetchXML cannot express (`STDEV`/`VAR`, or any aggregate the
/// planner decided to compute client-side), grouped the same way as
/// `Distinct`/`ClientWindow` (spec §4.5.10).
pub struct ClientAggregate {
    pub input: Box<PlanNode>,
    pub group_by: Vec<(String, Expr)>,
    pub specs: Vec<AggregateSpec>,
}

struct GroupBuffer {
    entity_logical_name: String,
    group_values: Vec<(String, QueryValue)>,
    values: Vec<Vec<Scalar>>,
}

impl ClientAggregate {
    pub fn description(&self) -> String {
        format!("ClientAggregate(group_by={}, aggregates={})", self.group_by.len(), self.specs.len())
    }

    pub fn execute(self, ctx: Arc<PlanContext>) -> RowStream {
        Box::pin(try_stream! {
            let mut order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, GroupBuffer> = HashMap::new();

            let mut stream = self.input.execute(ctx.clone());
            while let Some(row) = stream.next().await {
                ctx.cancellation.check()?;
                let row = row?;
                let variables = ctx.variables.lock();
                let eval_ctx = EvalContext::new(Some(&row), &variables);

                let mut key_parts = Vec::with_capacity(self.group_by.len());
                let mut group_values = Vec::with_capacity(self.group_by.len());
                for (name, expr) in &self.group_by {
                    let value = evaluate(expr, &eval_ctx)?;
                    key_parts.push(value.key_string());
                    group_values.push((name.clone(), QueryValue::new(value)));
                }
                let key = key_parts.join("\u{1F}");

                if !groups.contains_key(&key) {
                    order.push(key.clone());
                    groups.insert(key.clone(), GroupBuffer {
                        entity_logical_name: row.entity_logical_name.clone(),
                        group_values,
                        values: vec![Vec::new(); self.specs.len()],
                    });
                }
                let buffer = groups.get_mut(&key).unwrap();
                for (spec_idx, spec) in self.specs.iter().enumerate() {
                    let value = match &spec.arg {
                        Some(expr) => evaluate(expr, &eval_ctx)?,
                        None => Scalar::Null,
                    };
                    buffer.values[spec_idx].push(value);
                }
            }

            for key in order {
                let buffer = groups.remove(&key).expect("group recorded in order must exist");
                let mut out = QueryRow::new(buffer.entity_logical_name);
                for (name, value) in buffer.group_values {
                    out.push(name, value);
                }
                for (spec_idx, spec) in self.specs.iter().enumerate() {
                    let value = finalize(spec, &buffer.values[spec_idx]);
                    out.push(spec.output_column.clone(), QueryValue::new(value));
                }
                yield out;
            }
        })
    }
}

fn finalize(spec: &AggregateSpec, raw_values: &[Scalar]) -> Scalar {
    let values: Vec<Scalar> = if spec.distinct {
        let mut seen = HashSet::new();
        raw_values
            .iter()
            .filter(|v| !v.is_null() && seen.insert(v.key_string()))
            .cloned()
            .collect()
    } else {
        raw_values.iter().filter(|v| !v.is_null()).cloned().collect()
    };

    match spec.func {
        AggregateFunc::Count => Scalar::Int(raw_values.len() as i64),
        AggregateFunc::CountColumn => Scalar::Int(values.len() as i64),
        AggregateFunc::Sum => {
            if values.is_empty() {
                Scalar::Null
            } else {
                Scalar::Decimal(values.iter().filter_map(|v| v.as_decimal()).sum())
            }
        }
        AggregateFunc::Avg => {
            if values.is_empty() {
                Scalar::Null
            } else {
                let sum: Decimal = values.iter().filter_map(|v| v.as_decimal()).sum();
                Scalar::Decimal(sum / Decimal::from(values.len() as i64))
            }
        }
        AggregateFunc::Min => values
            .into_iter()
            .reduce(|a, b| if compare_scalars(&b, &a) == std::cmp::Ordering::Less { b } else { a })
            .unwrap_or(Scalar::Null),
        AggregateFunc::Max => values
            .into_iter()
            .reduce(|a, b| if compare_scalars(&b, &a) == std::cmp::Ordering::Greater { b } else { a })
            .unwrap_or(Scalar::Null),
        AggregateFunc::StDev => match sample_variance(&values) {
            Some(v) => Scalar::Float(v.sqrt()),
            None => Scalar::Null,
        },
        AggregateFunc::Var => match sample_variance(&values) {
            Some(v) => Scalar::Float(v),
            None => Scalar::Null,
        },
    }
}

/// `Σ(x−μ)² / (n−1)` (spec §4.5.10); `n=0 → null`, `n=1 → 0`.
fn sample_variance(values: &[Scalar]) -> Option<f64> {
    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_decimal()).map(|d| d.to_string().parse().unwrap_or(0.0)).collect();
    match nums.len() {
        0 => None,
        1 => Some(0.0),
        n => {
            let mean = nums.iter().sum::<f64>() / n as f64;
            let sum_sq = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
            Some(sum_sq / (n as f64 - 1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_variance_is_none_for_empty_input() {
        assert_eq!(sample_variance(&[]), None);
    }

    #[test]
    fn sample_variance_is_zero_for_single_value() {
        assert_eq!(sample_variance(&[Scalar::Int(5)]), Some(0.0));
    }

    #[test]
    fn sample_variance_matches_known_formula() {
        let values = vec![Scalar::Int(2), Scalar::Int(4), Scalar::Int(4), Scalar::Int(4), Scalar::Int(5), Scalar::Int(5), Scalar::Int(7), Scalar::Int(9)];
        let variance = sample_variance(&values).unwrap();
        assert!((variance - 4.571428571428571).abs() < 1e-9);
    }
}
