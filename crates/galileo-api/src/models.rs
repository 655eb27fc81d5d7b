// Galileo wire payloads
//
// Shapes of the JSON objects the backend sends. Required fields carry no
// `#[serde(default)]`: a payload that lacks one fails to deserialize rather
// than producing a record with an invented value. Purely descriptive
// optional fields use `#[serde(default)]`.

use serde::{Deserialize, Serialize};

// ── Auth ─────────────────────────────────────────────────────────────

/// Body of a successful login or refresh response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent on refresh responses that keep the previous refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

// ── Machines ─────────────────────────────────────────────────────────

/// A landing-zone machine as listed by `GET /machines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachinePayload {
    pub mid: String,
    pub name: String,
    pub userid: String,
    /// `"online"` or `"offline"`.
    pub status: String,
    pub gpu: String,
    pub cpu: String,
    pub os: String,
    pub arch: String,
    pub memory: String,
    pub running_jobs_limit: u32,
}

/// Body of `PUT /machines/{mid}`. Only fields that are `Some` are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateMachineRequest {
    #[serde(skip)]
    pub mid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_jobs_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
}

impl UpdateMachineRequest {
    pub fn new(mid: impl Into<String>) -> Self {
        Self {
            mid: mid.into(),
            ..Self::default()
        }
    }
}

// ── Jobs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub jobid: String,
    pub receiverid: String,
    pub project_id: String,
    /// Epoch seconds.
    pub time_created: i64,
    /// Epoch seconds.
    pub last_updated: i64,
    pub status: String,
    pub name: String,
    pub stationid: String,
    pub userid: String,
    pub archived: bool,
    pub status_history: Vec<JobStatusPayload>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub oaid: Option<String>,
    #[serde(default)]
    pub pay_status: Option<String>,
    #[serde(default)]
    pub pay_interval: Option<i64>,
    #[serde(default)]
    pub total_runtime: Option<f64>,
}

/// One entry of a job's `status_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusPayload {
    /// Epoch seconds.
    pub time: i64,
    pub status: String,
    #[serde(default)]
    pub jobstatusid: Option<String>,
    #[serde(default)]
    pub jobid: Option<String>,
}

// ── Stations ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationPayload {
    pub stationid: String,
    pub name: String,
    /// `"active"` or `"inactive"`.
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mids: Vec<String>,
    #[serde(default)]
    pub users: Vec<StationUserPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationUserPayload {
    pub userid: String,
    #[serde(default)]
    pub status: Option<String>,
}

// ── Landing requests ─────────────────────────────────────────────────

/// A peer-to-landing-zone request: permission to run work on a machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandingRequestPayload {
    pub id: String,
    pub mid: String,
    /// The requesting user.
    pub userid: String,
    /// `"pending"`, `"accepted"` or `"rejected"`.
    pub status: String,
    /// Epoch seconds.
    pub time_created: i64,
    #[serde(default)]
    pub stationid: Option<String>,
}

// ── Profiles ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub userid: String,
    pub username: String,
    #[serde(default)]
    pub mids: Vec<String>,
}

// ── Projects ─────────────────────────────────────────────────────────

/// A project: a directory of user code that jobs are built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub id: String,
    pub name: String,
    pub user_id: String,
    /// Epoch seconds.
    pub creation_timestamp: i64,
    #[serde(default)]
    pub description: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub updated_timestamp: Option<i64>,
}

/// One uploaded file of a project, as listed by `GET /projects/{id}/files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFilePayload {
    /// `/`-separated path relative to the project root.
    pub path: String,
    pub size: u64,
    /// Epoch seconds.
    #[serde(default)]
    pub modified: Option<i64>,
}

/// Body of `POST /projects/{id}/run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunProjectRequest {
    pub station_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
}

// ── Push channel ─────────────────────────────────────────────────────

/// Envelope of every push-channel message:
/// `{"event": "<topic>", "sequence": 12, "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    /// Backend-assigned ordering number, when the backend provides one.
    #[serde(default)]
    pub sequence: Option<u64>,
    pub data: serde_json::Value,
}
