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
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use std::collections::HashMap;

/// One declared variable: type annotation (as written in `DECLARE`, may be
/// absent) plus current value (spec §3 "Variable scope").
#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub data_type: Option<String>,
    pub value: Scalar,
}

/// Stack of frames; `Declare` adds to the current frame, `Set` mutates an
/// existing declaration anywhere on the stack, block enter/leave pushes/pops
/// a frame (spec §3).
#[derive(Debug, Default)]
pub struct VariableScope {
    frames: Vec<HashMap<String, VariableSlot>>,
}

impl VariableScope {
    pub fn new() -> Self {
        VariableScope {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, data_type: Option<String>, value: Scalar) {
        let name = normalize(&name.into());
        self.frames
            .last_mut()
            .expect("variable scope always has a root frame")
            .insert(name, VariableSlot { data_type, value });
    }

    pub fn set(&mut self, name: &str, value: Scalar) -> Result<()> {
        let name = normalize(name);
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(&name) {
                slot.value = value;
                return Ok(());
            }
        }
        Err(ErrorCode::BadArguments(format!(
            "variable {} is not declared",
            name
        )))
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        let name = normalize(name);
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.get(&name))
            .map(|slot| &slot.value)
    }

    /// Populates `@@ERROR_MESSAGE`/`@@ERROR_NUMBER`/`@@ERROR_SEVERITY`/
    /// `@@ERROR_STATE` on entering a CATCH body (spec §4.5.14).
    pub fn populate_error_pseudo_vars(&mut self, error: &ErrorCode) {
        self.declare("@@ERROR_MESSAGE", None, Scalar::String(error.message()));
        self.declare("@@ERROR_NUMBER", None, Scalar::Int(50000));
        self.declare("@@ERROR_SEVERITY", None, Scalar::Int(16));
        self.declare("@@ERROR_STATE", None, Scalar::Int(1));
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_then_set_then_get() {
        let mut scope = VariableScope::new();
        scope.declare("@n", Some("INT".into()), Scalar::Int(0));
        scope.set("@n", Scalar::Int(5)).unwrap();
        assert_eq!(scope.get("@n"), Some(&Scalar::Int(5)));
    }

    #[test]
    fn set_undeclared_variable_errors() {
        let mut scope = VariableScope::new();
        assert!(scope.set("@missing", Scalar::Int(1)).is_err());
    }

    #[test]
    fn block_scoping_pops_inner_frame() {
        let mut scope = VariableScope::new();
        scope.declare("@outer", None, Scalar::Int(1));
        scope.push_frame();
        scope.declare("@inner", None, Scalar::Int(2));
        assert_eq!(scope.get("@inner"), Some(&Scalar::Int(2)));
        scope.pop_frame();
        assert_eq!(scope.get("@inner"), None);
        assert_eq!(scope.get("@outer"), Some(&Scalar::Int(1)));
    }
}
