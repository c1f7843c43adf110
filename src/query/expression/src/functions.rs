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

use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use ppds_query_catalog::Scalar;

/// Scalar (non-aggregate, non-window) built-ins the plan builder's
/// `Project`/`ClientFilter` expressions can reach (spec §3 "function calls
/// (scalar and aggregate)"). Aggregate and window functions are handled by
/// the dedicated plan nodes, not here.
pub fn call(name: &str, args: &[Scalar]) -> Result<Scalar> {
    match name.to_ascii_uppercase().as_str() {
        "ISNULL" => {
            expect_args(name, args, 2)?;
            Ok(if args[0].is_null() {
                args[1].clone()
            } else {
                args[0].clone()
            })
        }
        "COALESCE" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Scalar::Null)),
        "UPPER" => Ok(map_string(name, args, |s| s.to_uppercase())?),
        "LOWER" => Ok(map_string(name, args, |s| s.to_lowercase())?),
        "LTRIM" => Ok(map_string(name, args, |s| s.trim_start().to_string())?),
        "RTRIM" => Ok(map_string(name, args, |s| s.trim_end().to_string())?),
        "LEN" | "LENGTH" => {
            expect_args(name, args, 1)?;
            if args[0].is_null() {
                return Ok(Scalar::Null);
            }
            Ok(Scalar::Int(args[0].key_string().chars().count() as i64))
        }
        "ROUND" => {
            expect_args(name, args, 2)?;
            let Some(value) = args[0].as_decimal() else {
                return Ok(Scalar::Null);
            };
            let Scalar::Int(places) = args[1] else {
                return Err(ErrorCode::BadArguments(
                    "ROUND expects an integer precision argument".to_string(),
                ));
            };
            Ok(Scalar::Decimal(value.round_dp(places.max(0) as u32)))
        }
        "ABS" => {
            expect_args(name, args, 1)?;
            let Some(value) = args[0].as_decimal() else {
                return Ok(Scalar::Null);
            };
            Ok(Scalar::Decimal(value.abs()))
        }
        _ => Err(ErrorCode::Unimplemented(format!(
            "unsupported scalar function '{}'",
            name
        ))),
    }
}

fn expect_args(name: &str, args: &[Scalar], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(ErrorCode::BadArguments(format!(
            "{} expects {} argument(s), got {}",
            name,
            n,
            args.len()
        )));
    }
    Ok(())
}

fn map_string(name: &str, args: &[Scalar], f: impl Fn(&str) -> String) -> Result<Scalar> {
    expect_args(name, args, 1)?;
    if args[0].is_null() {
        return Ok(Scalar::Null);
    }
    Ok(Scalar::String(f(&args[0].key_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isnull_substitutes_on_null() {
        let v = call("ISNULL", &[Scalar::Null, Scalar::Int(5)]).unwrap();
        assert_eq!(v, Scalar::Int(5));
    }

    #[test]
    fn coalesce_returns_first_non_null() {
        let v = call("COALESCE", &[Scalar::Null, Scalar::Null, Scalar::Int(7)]).unwrap();
        assert_eq!(v, Scalar::Int(7));
    }

    #[test]
    fn upper_uppercases_strings() {
        let v = call("UPPER", &[Scalar::String("abc".into())]).unwrap();
        assert_eq!(v, Scalar::String("ABC".into()));
    }
}
