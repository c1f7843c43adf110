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

use crate::row::QueryRow;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use ppds_common_base::CancellationToken;
use ppds_common_exception::Result;
use std::time::Duration;
use uuid::Uuid;

/// One page of `fetch_xml` results (spec §6 "Remote executor contracts").
#[derive(Debug, Clone)]
pub struct FetchXmlPage {
    pub records: Vec<QueryRow>,
    pub entity_logical_name: String,
    pub more_records: bool,
    pub paging_cookie: Option<String>,
    pub page_number: u32,
    pub total_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TdsResult {
    pub records: Vec<QueryRow>,
    pub entity_logical_name: String,
}

/// `{success_count, failure_count, errors}` (spec §4.9/§6).
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub success_count: u64,
    pub failure_count: u64,
    pub errors: Vec<String>,
}

/// A bulk call either completes (possibly with partial failures recorded in
/// `BulkResult::errors`) or is rejected by the remote's quota with a
/// `retry_after` hint (spec §4.8/§4.9 "per-request throttle response").
#[derive(Debug, Clone)]
pub enum BulkOutcome {
    Completed(BulkResult),
    Throttled { retry_after: Duration },
}

/// FetchXML execution + metadata calls the core needs from Dataverse (spec
/// §6 "Remote executor contracts consumed by the core"). Implemented by the
/// caller against a live connection; `fake::FakeRemoteExecutor` backs the
/// property tests in §8.
#[async_trait]
pub trait RemoteQueryExecutor: Send + Sync {
    async fn fetch_xml(
        &self,
        xml: &str,
        page_number: Option<u32>,
        paging_cookie: Option<&str>,
        include_count: bool,
        ct: &CancellationToken,
    ) -> Result<FetchXmlPage>;

    async fn total_record_count(&self, entity: &str, ct: &CancellationToken) -> Result<i64>;

    async fn min_max_created_on(
        &self,
        entity: &str,
        ct: &CancellationToken,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>;
}

/// Read-only ANSI SQL passthrough over the TDS endpoint (spec §4.5.12/§6).
#[async_trait]
pub trait TdsExecutor: Send + Sync {
    async fn tds_execute_sql(
        &self,
        sql: &str,
        max_rows: Option<u64>,
        ct: &CancellationToken,
    ) -> Result<TdsResult>;
}

/// Batch create/update/delete against the remote (spec §4.9/§6).
#[async_trait]
pub trait BulkExecutor: Send + Sync {
    async fn create_multiple(
        &self,
        entity: &str,
        records: Vec<QueryRow>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome>;

    async fn update_multiple(
        &self,
        entity: &str,
        records: Vec<QueryRow>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome>;

    async fn delete_multiple(
        &self,
        entity: &str,
        ids: Vec<Uuid>,
        ct: &CancellationToken,
    ) -> Result<BulkOutcome>;
}

/// Cached metadata surface consumed by the semantic validator (spec §4.2/§6).
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn entities(&self) -> Result<Vec<String>>;
    async fn attributes(&self, entity: &str) -> Result<Vec<String>>;
}
