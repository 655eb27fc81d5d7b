// ── Station domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StationStatus {
    Active,
    Inactive,
}

/// A user's membership in a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationMember {
    pub userid: String,
    /// Membership state as reported by the backend (`"admin"`, `"member"`, `"invited"`, ...).
    pub status: Option<String>,
}

/// A group of users sharing a pool of machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub stationid: String,
    pub name: String,
    pub status: StationStatus,
    pub description: Option<String>,
    pub mids: Vec<String>,
    pub users: Vec<StationMember>,
}
