// ── Machine domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Whether a machine is currently serving as a landing zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MachineStatus {
    Offline,
    Online,
}

impl MachineStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// A compute machine registered with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub mid: String,
    pub name: String,
    /// Owner.
    pub userid: String,
    pub status: MachineStatus,
    pub gpu: String,
    pub cpu: String,
    pub os: String,
    pub arch: String,
    pub memory: String,
    pub running_jobs_limit: u32,
}
