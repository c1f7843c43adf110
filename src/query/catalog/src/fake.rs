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

//! In-memory fakes used by the property and scenario tests in spec §8, and by
//! downstream crates' own `#[cfg(test)]` suites. Gated behind `test-util` so
//! non-test builds never pull this code in (spec's ambient testing posture —
//! `ppds_common_exception` callers still go through real trait objects).
use crate::executor::BulkExecutor;
use crate::executor::BulkOutcome;
use crate::executor::FetchXmlPage;
use crate::executor::MetadataCatalog;
use crate::executor::RemoteQueryExecutor;
use crate::executor::TdsResult;
use crate::executor::TdsExecutor;
use crate::row::QueryRow;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use ppds_common_base::CancellationToken;
use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A canned FetchXML response keyed by a predicate over the request. Checked
/// in registration order; the first match wins.
pub type FetchXmlHandler = Box<dyn Fn(&str, Option<u32>, Option<&str>) -> Option<Result<FetchXmlPage>> + Send + Sync>;

#[derive(Default)]
pub struct FakeRemoteExecutor {
    handlers: Mutex<Vec<FetchXmlHandler>>,
    total_record_counts: Mutex<HashMap<String, i64>>,
    min_max_created_on: Mutex<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>>,
    /// Entities whose aggregate queries raise `AggregateLimitExceeded` when
    /// the requested `[start, end)` range exceeds this many days (spec S4).
    aggregate_limit_days: Mutex<HashMap<String, i64>>,
    entities: Mutex<Vec<String>>,
    attributes: Mutex<HashMap<String, Vec<String>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_fetch_xml(&self, handler: FetchXmlHandler) {
        self.handlers.lock().push(handler);
    }

    pub fn set_total_record_count(&self, entity: &str, count: i64) {
        self.total_record_counts
            .lock()
            .insert(entity.to_string(), count);
    }

    pub fn set_min_max_created_on(&self, entity: &str, min: DateTime<Utc>, max: DateTime<Utc>) {
        self.min_max_created_on
            .lock()
            .insert(entity.to_string(), (min, max));
    }

    /// Any `<filter>` range spanning more than `limit_days` raises
    /// `AggregateLimitExceeded` when the fetchxml text is an aggregate
    /// (`aggregate="true"`), letting scenario tests exercise bisection
    /// without modeling real record counts.
    pub fn set_aggregate_limit_days(&self, entity: &str, limit_days: i64) {
        self.aggregate_limit_days
            .lock()
            .insert(entity.to_string(), limit_days);
    }

    pub fn set_entities(&self, entities: Vec<String>) {
        *self.entities.lock() = entities;
    }

    pub fn set_attributes(&self, entity: &str, attrs: Vec<String>) {
        self.attributes.lock().insert(entity.to_string(), attrs);
    }

    pub fn aggregate_limit_days(&self, entity: &str) -> Option<i64> {
        self.aggregate_limit_days.lock().get(entity).copied()
    }

    fn record_call(&self, label: impl Into<String>) {
        self.calls.lock().push(label.into());
    }
}

#[async_trait]
impl RemoteQueryExecutor for FakeRemoteExecutor {
    async fn fetch_xml(
        &self,
        xml: &str,
        page_number: Option<u32>,
        paging_cookie: Option<&str>,
        _include_count: bool,
        ct: &CancellationToken,
    ) -> Result<FetchXmlPage> {
        ct.check()?;
        self.record_call("fetch_xml");
        let handlers = self.handlers.lock();
        for handler in handlers.iter() {
            if let Some(result) = handler(xml, page_number, paging_cookie) {
                return result;
            }
        }
        Err(ErrorCode::RemoteError(
            "FakeRemoteExecutor: no handler matched the fetchxml request".to_string(),
        ))
    }

    async fn total_record_count(&self, entity: &str, ct: &CancellationToken) -> Result<i64> {
        ct.check()?;
        self.record_call("total_record_count");
        self.total_record_counts
            .lock()
            .get(entity)
            .copied()
            .ok_or_else(|| ErrorCode::RemoteError(format!("no total_record_count stub for {}", entity)))
    }

    async fn min_max_created_on(
        &self,
        entity: &str,
        ct: &CancellationToken,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        ct.check()?;
        self.record_call("min_max_created_on");
        Ok(self.min_max_created_on.lock().get(entity).copied())
    }
}

#[async_trait]
impl TdsExecutor for FakeRemoteExecutor {
    async fn tds_execute_sql(
        &self,
        _sql: &str,
        max_rows: Option<u64>,
        ct: &CancellationToken,
    ) -> Result<TdsResult> {
        ct.check()?;
        self.record_call("tds_execute_sql");
        Ok(TdsResult {
            records: Vec::new(),
            entity_logical_name: String::new(),
        }
        .clamp(max_rows))
    }
}

trait ClampRows {
    fn clamp(self, max_rows: Option<u64>) -> Self;
}

impl ClampRows for TdsResult {
    fn clamp(mut self, max_rows: Option<u64>) -> Self {
        if let Some(n) = max_rows {
            self.records.truncate(n as usize);
        }
        self
    }
}

#[async_trait]
impl BulkExecutor for FakeRemoteExecutor {
    async fn create_multiple(
        &self,
        _entity: &str,
        records: Vec<QueryRow>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome> {
        ct.check()?;
        self.record_call("create_multiple");
        Ok(BulkOutcome::Completed(crate::executor::BulkResult {
            success_count: records.len() as u64,
            failure_count: 0,
            errors: Vec::new(),
        }))
    }

    async fn update_multiple(
        &self,
        _entity: &str,
        records: Vec<QueryRow>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome> {
        ct.check()?;
        self.record_call("update_multiple");
        Ok(BulkOutcome::Completed(crate::executor::BulkResult {
            success_count: records.len() as u64,
            failure_count: 0,
            errors: Vec::new(),
        }))
    }

    async fn delete_multiple(
        &self,
        _entity: &str,
        ids: Vec<Uuid>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome> {
        ct.check()?;
        self.record_call("delete_multiple");
        Ok(BulkOutcome::Completed(crate::executor::BulkResult {
            success_count: ids.len() as u64,
            failure_count: 0,
            errors: Vec::new(),
        }))
    }
}

#[async_trait]
impl MetadataCatalog for FakeRemoteExecutor {
    async fn entities(&self) -> Result<Vec<String>> {
        Ok(self.entities.lock().clone())
    }

    async fn attributes(&self, entity: &str) -> Result<Vec<String>> {
        Ok(self
            .attributes
            .lock()
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn shared(fake: FakeRemoteExecutor) -> Arc<FakeRemoteExecutor> {
    Arc::new(fake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn total_record_count_round_trips() {
        let fake = FakeRemoteExecutor::new();
        fake.set_total_record_count("contact", 137);
        let ct = CancellationToken::new();
        let count = fake.total_record_count("contact", &ct).await.unwrap();
        assert_eq!(count, 137);
    }

    #[tokio::test]
    async fn fetch_xml_falls_through_unmatched_handlers() {
        let fake = FakeRemoteExecutor::new();
        fake.on_fetch_xml(Box::new(|xml, _, _| {
            if xml.contains("account") {
                Some(Ok(FetchXmlPage {
                    records: vec![],
                    entity_logical_name: "account".into(),
                    more_records: false,
                    paging_cookie: None,
                    page_number: 1,
                    total_count: None,
                }))
            } else {
                None
            }
        }));
        let ct = CancellationToken::new();
        let page = fake
            .fetch_xml("<fetch entity='account'/>", None, None, false, &ct)
            .await
            .unwrap();
        assert_eq!(page.entity_logical_name, "account");
    }
}
