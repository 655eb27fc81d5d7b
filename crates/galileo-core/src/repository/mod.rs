// ── Repositories ──
//
// One repository per entity family, each a thin typed layer over the
// `RequestExecutor`. `list` and `get` decode strictly: one malformed record
// fails the call. Snapshots (used by the sync engine) decode leniently: a
// malformed record is logged and skipped so the rest of the family still
// reconciles.

mod jobs;
mod machines;
mod profiles;
mod projects;
mod requests;
mod stations;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use galileo_api::{Query, RequestExecutor};

use crate::convert::{envelope_item, envelope_list, parse_entity, parse_record};
use crate::error::CoreError;
use crate::model::{Family, Record};

pub use jobs::{JobFilter, JobsRepository};
pub use machines::{MachineFilter, MachinesRepository};
pub use profiles::ProfilesRepository;
pub use projects::{ProjectFilter, ProjectsRepository};
pub use requests::{RequestFilter, RequestsRepository};
pub use stations::{StationFilter, StationsRepository};

/// Default page size when pulling a full snapshot.
pub const SNAPSHOT_PAGE_SIZE: u32 = 100;

/// Hard stop for snapshot pagination.
const MAX_SNAPSHOT_PAGES: u32 = 1000;

/// Typed list/get access to one entity family.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Wire shape of one entity.
    type Payload: DeserializeOwned + Send;
    /// Domain entity produced from the payload.
    type Entity: TryFrom<Self::Payload, Error = CoreError> + Send;
    /// List filter, encoded as query parameters.
    type Filter: Default + Send + Sync;

    const FAMILY: Family;
    /// Collection endpoint and list envelope key (`"machines"`).
    const COLLECTION: &'static str;
    /// Single-entity envelope key (`"machine"`).
    const ITEM: &'static str;

    fn executor(&self) -> &RequestExecutor;

    fn filter_query(filter: &Self::Filter) -> Query;

    /// Page size for snapshot pulls.
    fn snapshot_page_size(&self) -> u32 {
        SNAPSHOT_PAGE_SIZE
    }

    /// Raw objects of one page, in backend order.
    async fn list_raw(
        &self,
        filter: &Self::Filter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Vec<Value>, CoreError> {
        let query = Self::filter_query(filter).page(page, page_size);
        let body = self.executor().get(Self::COLLECTION, Some(&query)).await?;
        envelope_list(body, Self::COLLECTION)
    }

    /// One page of entities, in backend order.
    async fn list(
        &self,
        filter: &Self::Filter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Vec<Self::Entity>, CoreError> {
        self.list_raw(filter, page, page_size)
            .await?
            .into_iter()
            .map(|raw| parse_entity::<Self::Payload, Self::Entity>(Self::ITEM, raw))
            .collect()
    }

    /// A single entity by id.
    async fn get(&self, id: &str) -> Result<Self::Entity, CoreError> {
        let endpoint = format!("{}/{id}", Self::COLLECTION);
        let body = self
            .executor()
            .get(&endpoint, None)
            .await
            .map_err(|e| not_found(e.into(), Self::ITEM, id))?;
        parse_entity::<Self::Payload, Self::Entity>(Self::ITEM, envelope_item(body, Self::ITEM)?)
    }
}

/// Full pulls of a family, for the sync engine.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn family(&self) -> Family;

    /// Every entity of the family. Malformed records are skipped.
    async fn snapshot(&self) -> Result<Vec<Record>, CoreError>;
}

#[async_trait]
impl<R: Repository> SnapshotSource for R {
    fn family(&self) -> Family {
        R::FAMILY
    }

    async fn snapshot(&self) -> Result<Vec<Record>, CoreError> {
        let filter = R::Filter::default();
        let page_size = self.snapshot_page_size().max(1);
        let mut records = Vec::new();
        let mut previous_first: Option<Value> = None;

        for page in 1..=MAX_SNAPSHOT_PAGES {
            let raw = self
                .list_raw(&filter, Some(page), Some(page_size))
                .await?;
            let received = u32::try_from(raw.len()).unwrap_or(u32::MAX);
            if page == 1 && received > 0 && received != page_size {
                // Paging ends on the first short page, so a backend that
                // caps page size below ours truncates the snapshot here.
                debug!(
                    family = %R::FAMILY,
                    requested = page_size,
                    received,
                    "first page size differs from requested, treating it as complete"
                );
            }

            // A backend that ignores paging returns the same page forever.
            let first = raw.first().cloned();
            if page > 1 && first.is_some() && first == previous_first {
                debug!(family = %R::FAMILY, page, "backend repeated a page, stopping");
                break;
            }
            previous_first = first;

            for item in raw {
                match parse_record(R::FAMILY, item) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(family = %R::FAMILY, error = %e, "skipping malformed record"),
                }
            }

            if received < page_size {
                break;
            }
        }

        debug!(family = %R::FAMILY, count = records.len(), "snapshot pulled");
        Ok(records)
    }
}

/// Map a 404 on a single-entity lookup to `NotFound`.
fn not_found(err: CoreError, entity: &str, id: &str) -> CoreError {
    match err {
        CoreError::RequestFailed { status: 404, .. } => CoreError::NotFound {
            entity: entity.to_owned(),
            id: id.to_owned(),
        },
        other => other,
    }
}

