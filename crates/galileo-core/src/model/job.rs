// ── Job domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle status of a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Submitted,
    Initialized,
    Running,
    Paused,
    Stopped,
    Completed,
    Terminated,
    Failed,
}

impl JobStatus {
    /// No further transitions happen after a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Failed)
    }
}

/// One entry of a job's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub time: DateTime<Utc>,
    pub status: JobStatus,
    pub jobstatusid: Option<String>,
    pub jobid: Option<String>,
}

/// A unit of work sent to a landing zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub jobid: String,
    /// Machine the job runs on.
    pub receiverid: String,
    pub project_id: String,
    pub time_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: JobStatus,
    pub name: String,
    pub stationid: String,
    /// Submitter.
    pub userid: String,
    pub archived: bool,
    pub status_history: Vec<JobStatusEntry>,
    pub container: Option<String>,
    pub state: Option<String>,
    pub oaid: Option<String>,
    pub pay_status: Option<String>,
    pub pay_interval: Option<i64>,
    pub total_runtime: Option<f64>,
}
