// Landing requests: list, get, accept, reject.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use galileo_api::models::LandingRequestPayload;
use galileo_api::{Query, RequestExecutor};

use super::{Repository, SNAPSHOT_PAGE_SIZE};
use crate::error::CoreError;
use crate::model::{Family, LandingRequest, LandingRequestStatus};

/// Filter for `GET /requests`.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub ids: Vec<String>,
    pub mids: Vec<String>,
    pub statuses: Vec<LandingRequestStatus>,
}

impl RequestFilter {
    /// Requests still waiting for a decision.
    pub fn pending() -> Self {
        Self {
            statuses: vec![LandingRequestStatus::Pending],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestsRepository {
    executor: RequestExecutor,
    page_size: u32,
}

impl RequestsRepository {
    pub fn new(executor: RequestExecutor) -> Self {
        Self {
            executor,
            page_size: SNAPSHOT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub async fn accept(&self, id: &str) -> Result<Value, CoreError> {
        debug!(id, "accepting landing request");
        Ok(self.executor.put(&format!("requests/{id}/accept"), None).await?)
    }

    pub async fn reject(&self, id: &str) -> Result<Value, CoreError> {
        debug!(id, "rejecting landing request");
        Ok(self.executor.put(&format!("requests/{id}/reject"), None).await?)
    }
}

#[async_trait]
impl Repository for RequestsRepository {
    type Payload = LandingRequestPayload;
    type Entity = LandingRequest;
    type Filter = RequestFilter;

    const FAMILY: Family = Family::Request;
    const COLLECTION: &'static str = "requests";
    const ITEM: &'static str = "request";

    fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn filter_query(filter: &RequestFilter) -> Query {
        let statuses: Vec<&str> = filter.statuses.iter().map(AsRef::as_ref).collect();
        Query::new()
            .push_list("ids", filter.ids.as_slice())
            .push_list("mids", filter.mids.as_slice())
            .push_list("statuses", statuses.as_slice())
    }

    fn snapshot_page_size(&self) -> u32 {
        self.page_size
    }
}
