// ── Domain model ──
//
// Typed entities produced by payload conversion. `Record` is the closed
// set of entity kinds the sync engine tracks; profiles and projects are
// request/response only and never enter the entity table.

pub mod job;
pub mod machine;
pub mod profile;
pub mod project;
pub mod request;
pub mod station;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::CoreError;

pub use job::{Job, JobStatus, JobStatusEntry};
pub use machine::{Machine, MachineStatus};
pub use profile::Profile;
pub use project::{Project, ProjectFile};
pub use request::{LandingRequest, LandingRequestStatus};
pub use station::{Station, StationMember, StationStatus};

// ── Family ───────────────────────────────────────────────────────────

/// An entity family: the namespace ids are unique within.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Family {
    Machine,
    Job,
    Station,
    Request,
}

impl Family {
    /// Name of the id field in this family's payloads.
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Machine => "mid",
            Self::Job => "jobid",
            Self::Station => "stationid",
            Self::Request => "id",
        }
    }
}

/// Identity of one entity: family plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub family: Family,
    pub id: String,
}

impl EntityKey {
    pub fn new(family: Family, id: impl Into<String>) -> Self {
        Self {
            family,
            id: id.into(),
        }
    }

    pub fn machine(mid: impl Into<String>) -> Self {
        Self::new(Family::Machine, mid)
    }

    pub fn job(jobid: impl Into<String>) -> Self {
        Self::new(Family::Job, jobid)
    }

    pub fn station(stationid: impl Into<String>) -> Self {
        Self::new(Family::Station, stationid)
    }

    pub fn request(id: impl Into<String>) -> Self {
        Self::new(Family::Request, id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.id)
    }
}

// ── EntityStatus ─────────────────────────────────────────────────────

/// The mutable status of any tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    Machine(MachineStatus),
    Job(JobStatus),
    Station(StationStatus),
    Request(LandingRequestStatus),
}

impl EntityStatus {
    /// Parse a wire status string for `family`. Unknown values are rejected.
    pub fn parse(family: Family, raw: &str) -> Result<Self, CoreError> {
        fn parse_as<T: FromStr>(family: Family, raw: &str) -> Result<T, CoreError> {
            raw.parse()
                .map_err(|_| CoreError::malformed(family.as_ref(), format!("unknown status '{raw}'")))
        }

        Ok(match family {
            Family::Machine => Self::Machine(parse_as(family, raw)?),
            Family::Job => Self::Job(parse_as(family, raw)?),
            Family::Station => Self::Station(parse_as(family, raw)?),
            Family::Request => Self::Request(parse_as(family, raw)?),
        })
    }

    pub fn family(self) -> Family {
        match self {
            Self::Machine(_) => Family::Machine,
            Self::Job(_) => Family::Job,
            Self::Station(_) => Family::Station,
            Self::Request(_) => Family::Request,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Machine(s) => s.as_ref(),
            Self::Job(s) => s.as_ref(),
            Self::Station(s) => s.as_ref(),
            Self::Request(s) => s.as_ref(),
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Record ───────────────────────────────────────────────────────────

/// One tracked entity, as stored in the entity table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Machine(Machine),
    Job(Job),
    Station(Station),
    Request(LandingRequest),
}

impl Record {
    pub fn family(&self) -> Family {
        match self {
            Self::Machine(_) => Family::Machine,
            Self::Job(_) => Family::Job,
            Self::Station(_) => Family::Station,
            Self::Request(_) => Family::Request,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Machine(m) => &m.mid,
            Self::Job(j) => &j.jobid,
            Self::Station(s) => &s.stationid,
            Self::Request(r) => &r.id,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.family(), self.id())
    }

    pub fn status(&self) -> EntityStatus {
        match self {
            Self::Machine(m) => EntityStatus::Machine(m.status),
            Self::Job(j) => EntityStatus::Job(j.status),
            Self::Station(s) => EntityStatus::Station(s.status),
            Self::Request(r) => EntityStatus::Request(r.status),
        }
    }

    /// A copy with `status` substituted. `None` if `status` belongs to
    /// another family.
    pub fn with_status(&self, status: EntityStatus) -> Option<Self> {
        let mut next = self.clone();
        match (&mut next, status) {
            (Self::Machine(m), EntityStatus::Machine(s)) => m.status = s,
            (Self::Job(j), EntityStatus::Job(s)) => j.status = s,
            (Self::Station(st), EntityStatus::Station(s)) => st.status = s,
            (Self::Request(r), EntityStatus::Request(s)) => r.status = s,
            _ => return None,
        }
        Some(next)
    }

    /// Archived jobs count as deleted.
    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Job(j) if j.archived)
    }

    /// Whether `self` and `other` differ in anything besides status.
    pub fn differs_beyond_status(&self, other: &Self) -> bool {
        self.with_status(other.status())
            .is_none_or(|normalized| normalized != *other)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn as_machine(&self) -> Option<&Machine> {
        match self {
            Self::Machine(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            Self::Job(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_station(&self) -> Option<&Station> {
        match self {
            Self::Station(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&LandingRequest> {
        match self {
            Self::Request(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Machine> for Record {
    fn from(m: Machine) -> Self {
        Self::Machine(m)
    }
}

impl From<Job> for Record {
    fn from(j: Job) -> Self {
        Self::Job(j)
    }
}

impl From<Station> for Record {
    fn from(s: Station) -> Self {
        Self::Station(s)
    }
}

impl From<LandingRequest> for Record {
    fn from(r: LandingRequest) -> Self {
        Self::Request(r)
    }
}
