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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use parking_lot::Mutex;

/// Per-request execution counters (spec §3 "Statistics"). Single-writer under
/// non-parallel plans; under `ParallelPartition`, `suppress_paging_metadata`
/// is set so concurrent scans don't race on the paging fields (spec §5).
#[derive(Debug, Default)]
pub struct Statistics {
    pub rows_read: AtomicU64,
    pub pages_fetched: AtomicU64,
    last_paging_cookie: Mutex<Option<String>>,
    last_more_records: AtomicBool,
    last_page_number: AtomicU64,
    last_total_count: Mutex<Option<i64>>,
    pub suppress_paging_metadata: AtomicBool,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_read(&self, n: u64) {
        self.rows_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page(&self, paging_cookie: Option<String>, more_records: bool, page_number: u64) {
        if self.suppress_paging_metadata.load(Ordering::Relaxed) {
            return;
        }
        *self.last_paging_cookie.lock() = paging_cookie;
        self.last_more_records.store(more_records, Ordering::Relaxed);
        self.last_page_number.store(page_number, Ordering::Relaxed);
    }

    pub fn record_total_count(&self, total: Option<i64>) {
        if self.suppress_paging_metadata.load(Ordering::Relaxed) {
            return;
        }
        *self.last_total_count.lock() = total;
    }

    pub fn last_paging_cookie(&self) -> Option<String> {
        self.last_paging_cookie.lock().clone()
    }

    pub fn last_more_records(&self) -> bool {
        self.last_more_records.load(Ordering::Relaxed)
    }

    pub fn last_page_number(&self) -> u64 {
        self.last_page_number.load(Ordering::Relaxed)
    }

    pub fn last_total_count(&self) -> Option<i64> {
        *self.last_total_count.lock()
    }
}
