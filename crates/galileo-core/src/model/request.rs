// ── Landing request domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LandingRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A peer's request for permission to land work on one of our machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingRequest {
    pub id: String,
    pub mid: String,
    /// The requesting user.
    pub userid: String,
    pub status: LandingRequestStatus,
    pub time_created: DateTime<Utc>,
    pub stationid: Option<String>,
}

impl LandingRequest {
    pub fn is_pending(&self) -> bool {
        self.status == LandingRequestStatus::Pending
    }
}
