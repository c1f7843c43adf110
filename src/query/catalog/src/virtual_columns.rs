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

use std::collections::HashMap;

/// One entry of the `{output_name -> (base_name, base_explicitly_queried?)}`
/// mapping built during lowering (spec §3 "Virtual columns").
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualColumn {
    pub base_name: String,
    pub base_explicitly_queried: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualColumnMap {
    entries: HashMap<String, VirtualColumn>,
}

impl VirtualColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output_name: impl Into<String>, base_name: impl Into<String>, base_explicitly_queried: bool) {
        self.entries.insert(
            output_name.into(),
            VirtualColumn {
                base_name: base_name.into(),
                base_explicitly_queried,
            },
        );
    }

    pub fn get(&self, output_name: &str) -> Option<&VirtualColumn> {
        self.entries.get(output_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VirtualColumn)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
