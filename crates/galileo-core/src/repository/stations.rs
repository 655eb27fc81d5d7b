// Stations: list and get.

use async_trait::async_trait;

use galileo_api::models::StationPayload;
use galileo_api::{Query, RequestExecutor};

use super::{Repository, SNAPSHOT_PAGE_SIZE};
use crate::model::{Family, Station};

/// Filter for `GET /stations`.
#[derive(Debug, Clone, Default)]
pub struct StationFilter {
    pub stationids: Vec<String>,
    pub names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StationsRepository {
    executor: RequestExecutor,
    page_size: u32,
}

impl StationsRepository {
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
}

#[async_trait]
impl Repository for StationsRepository {
    type Payload = StationPayload;
    type Entity = Station;
    type Filter = StationFilter;

    const FAMILY: Family = Family::Station;
    const COLLECTION: &'static str = "stations";
    const ITEM: &'static str = "station";

    fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn filter_query(filter: &StationFilter) -> Query {
        Query::new()
            .push_list("stationids", filter.stationids.as_slice())
            .push_list("names", filter.names.as_slice())
    }

    fn snapshot_page_size(&self) -> u32 {
        self.page_size
    }
}
