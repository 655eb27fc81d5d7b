// User profiles. Not a synced family: no snapshot, no push topics.

use galileo_api::models::{ProfilePayload, StationPayload};
use galileo_api::{Query, RequestExecutor};

use crate::convert::{envelope_list, parse_entity};
use crate::error::CoreError;
use crate::model::{Profile, Station};

#[derive(Debug, Clone)]
pub struct ProfilesRepository {
    executor: RequestExecutor,
}

impl ProfilesRepository {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// The authenticated user. `GET /users/self` returns a bare object.
    pub async fn self_profile(&self) -> Result<Profile, CoreError> {
        let body = self.executor.get("users/self", None).await?;
        parse_entity::<ProfilePayload, Profile>("profile", body)
    }

    /// Users matching `query`, passed through untouched.
    pub async fn list_users(&self, query: Option<&Query>) -> Result<Vec<Profile>, CoreError> {
        let body = self.executor.get("users", query).await?;
        envelope_list(body, "users")?
            .into_iter()
            .map(|raw| parse_entity::<ProfilePayload, Profile>("profile", raw))
            .collect()
    }

    /// Stations the authenticated user has been invited to.
    pub async fn invites(&self) -> Result<Vec<Station>, CoreError> {
        let body = self.executor.get("users/invites", None).await?;
        envelope_list(body, "stations")?
            .into_iter()
            .map(|raw| parse_entity::<StationPayload, Station>("station", raw))
            .collect()
    }
}
