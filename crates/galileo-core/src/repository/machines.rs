// Machines: list, get, update.

use async_trait::async_trait;

use galileo_api::models::{MachinePayload, UpdateMachineRequest};
use galileo_api::{Method, Query, RequestExecutor};

use super::{Repository, SNAPSHOT_PAGE_SIZE};
use crate::convert::{envelope_item, parse_entity};
use crate::error::CoreError;
use crate::model::{Family, Machine};

/// Filter for `GET /machines`. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default)]
pub struct MachineFilter {
    pub mids: Vec<String>,
    pub userids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MachinesRepository {
    executor: RequestExecutor,
    page_size: u32,
}

impl MachinesRepository {
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

    /// Change a machine's settings. Only the fields set on `request` are sent.
    pub async fn update(&self, request: &UpdateMachineRequest) -> Result<Machine, CoreError> {
        let body = serde_json::to_value(request)
            .map_err(|e| CoreError::Internal(format!("encoding machine update: {e}")))?;
        let resp = self
            .executor
            .execute(
                Method::PUT,
                &format!("machines/{}", request.mid),
                Some(&body),
                None,
            )
            .await?
            .json_value()?;
        parse_entity::<MachinePayload, Machine>("machine", envelope_item(resp, "machine")?)
    }
}

#[async_trait]
impl Repository for MachinesRepository {
    type Payload = MachinePayload;
    type Entity = Machine;
    type Filter = MachineFilter;

    const FAMILY: Family = Family::Machine;
    const COLLECTION: &'static str = "machines";
    const ITEM: &'static str = "machine";

    fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn filter_query(filter: &MachineFilter) -> Query {
        Query::new()
            .push_list("mids", filter.mids.as_slice())
            .push_list("userids", filter.userids.as_slice())
    }

    fn snapshot_page_size(&self) -> u32 {
        self.page_size
    }
}
