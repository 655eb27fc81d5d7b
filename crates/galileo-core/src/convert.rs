// ── Payload → domain conversion ──
//
// Pure functions: no I/O, no defaults for required fields. A payload that
// is missing a field, carries an unknown status, or has an out-of-range
// timestamp becomes `CoreError::MalformedPayload` and never reaches the
// entity table.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use galileo_api::models::{
    JobPayload, JobStatusPayload, LandingRequestPayload, MachinePayload, ProfilePayload,
    ProjectFilePayload, ProjectPayload, PushMessage, StationPayload, StationUserPayload,
};

use crate::error::CoreError;
use crate::model::{
    EntityKey, EntityStatus, Family, Job, JobStatus, JobStatusEntry, LandingRequest,
    LandingRequestStatus, Machine, MachineStatus, Profile, Project, ProjectFile, Record, Station,
    StationMember, StationStatus,
};
use crate::store::Update;

// ── Field helpers ────────────────────────────────────────────────────

fn timestamp(entity: &str, field: &str, secs: i64) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        CoreError::malformed(entity, format!("invalid timestamp in `{field}`: {secs}"))
    })
}

fn status<T: std::str::FromStr>(entity: &str, raw: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::malformed(entity, format!("unknown status '{raw}'")))
}

/// Deserialize `value` into a wire payload, reporting failures as malformed `entity`.
pub fn decode<P: DeserializeOwned>(entity: &str, value: Value) -> Result<P, CoreError> {
    serde_json::from_value(value).map_err(|e| CoreError::malformed(entity, e.to_string()))
}

/// Deserialize and convert a raw JSON object into a domain entity.
pub fn parse_entity<P, E>(entity: &str, value: Value) -> Result<E, CoreError>
where
    P: DeserializeOwned,
    E: TryFrom<P, Error = CoreError>,
{
    E::try_from(decode::<P>(entity, value)?)
}

// ── Envelopes ────────────────────────────────────────────────────────

/// Take the array under `key` from a list response (`{"machines": [...]}`).
pub fn envelope_list(mut body: Value, key: &str) -> Result<Vec<Value>, CoreError> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CoreError::malformed(key, format!("`{key}` is not an array"))),
        None => Err(CoreError::malformed(key, format!("response has no `{key}` field"))),
    }
}

/// Take the object under `key` from a single-entity response (`{"machine": {...}}`).
pub fn envelope_item(mut body: Value, key: &str) -> Result<Value, CoreError> {
    match body.get_mut(key).map(Value::take) {
        Some(item @ Value::Object(_)) => Ok(item),
        Some(_) => Err(CoreError::malformed(key, format!("`{key}` is not an object"))),
        None => Err(CoreError::malformed(key, format!("response has no `{key}` field"))),
    }
}

// ── Entities ─────────────────────────────────────────────────────────

impl TryFrom<MachinePayload> for Machine {
    type Error = CoreError;

    fn try_from(p: MachinePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            status: status::<MachineStatus>("machine", &p.status)?,
            mid: p.mid,
            name: p.name,
            userid: p.userid,
            gpu: p.gpu,
            cpu: p.cpu,
            os: p.os,
            arch: p.arch,
            memory: p.memory,
            running_jobs_limit: p.running_jobs_limit,
        })
    }
}

impl TryFrom<JobStatusPayload> for JobStatusEntry {
    type Error = CoreError;

    fn try_from(p: JobStatusPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            time: timestamp("job", "status_history.time", p.time)?,
            status: status::<JobStatus>("job", &p.status)?,
            jobstatusid: p.jobstatusid,
            jobid: p.jobid,
        })
    }
}

impl TryFrom<JobPayload> for Job {
    type Error = CoreError;

    fn try_from(p: JobPayload) -> Result<Self, Self::Error> {
        let status_history = p
            .status_history
            .into_iter()
            .map(JobStatusEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            time_created: timestamp("job", "time_created", p.time_created)?,
            last_updated: timestamp("job", "last_updated", p.last_updated)?,
            status: status::<JobStatus>("job", &p.status)?,
            jobid: p.jobid,
            receiverid: p.receiverid,
            project_id: p.project_id,
            name: p.name,
            stationid: p.stationid,
            userid: p.userid,
            archived: p.archived,
            status_history,
            container: p.container,
            state: p.state,
            oaid: p.oaid,
            pay_status: p.pay_status,
            pay_interval: p.pay_interval,
            total_runtime: p.total_runtime,
        })
    }
}

impl From<StationUserPayload> for StationMember {
    fn from(p: StationUserPayload) -> Self {
        Self {
            userid: p.userid,
            status: p.status,
        }
    }
}

impl TryFrom<StationPayload> for Station {
    type Error = CoreError;

    fn try_from(p: StationPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            status: status::<StationStatus>("station", &p.status)?,
            stationid: p.stationid,
            name: p.name,
            description: p.description,
            mids: p.mids,
            users: p.users.into_iter().map(StationMember::from).collect(),
        })
    }
}

impl TryFrom<LandingRequestPayload> for LandingRequest {
    type Error = CoreError;

    fn try_from(p: LandingRequestPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            status: status::<LandingRequestStatus>("request", &p.status)?,
            time_created: timestamp("request", "time_created", p.time_created)?,
            id: p.id,
            mid: p.mid,
            userid: p.userid,
            stationid: p.stationid,
        })
    }
}

impl TryFrom<ProfilePayload> for Profile {
    type Error = CoreError;

    fn try_from(p: ProfilePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            userid: p.userid,
            username: p.username,
            mids: p.mids,
        })
    }
}

impl TryFrom<ProjectPayload> for Project {
    type Error = CoreError;

    fn try_from(p: ProjectPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            created: timestamp("project", "creation_timestamp", p.creation_timestamp)?,
            updated: p
                .updated_timestamp
                .map(|secs| timestamp("project", "updated_timestamp", secs))
                .transpose()?,
            id: p.id,
            name: p.name,
            user_id: p.user_id,
            description: p.description,
        })
    }
}

impl TryFrom<ProjectFilePayload> for ProjectFile {
    type Error = CoreError;

    fn try_from(p: ProjectFilePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            modified: p
                .modified
                .map(|secs| timestamp("project_file", "modified", secs))
                .transpose()?,
            path: p.path,
            size: p.size,
        })
    }
}

/// Convert a raw JSON object of the given family into a [`Record`].
pub fn parse_record(family: Family, value: Value) -> Result<Record, CoreError> {
    Ok(match family {
        Family::Machine => Record::Machine(parse_entity::<MachinePayload, _>("machine", value)?),
        Family::Job => Record::Job(parse_entity::<JobPayload, _>("job", value)?),
        Family::Station => Record::Station(parse_entity::<StationPayload, _>("station", value)?),
        Family::Request => {
            Record::Request(parse_entity::<LandingRequestPayload, _>("request", value)?)
        }
    })
}

// ── Push messages ────────────────────────────────────────────────────

/// A push message decoded into a table update.
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub topic: String,
    pub update: Update,
    /// Backend-assigned ordering number, if present.
    pub sequence: Option<u64>,
}

fn string_field(entity: &str, data: &Value, field: &str) -> Result<String, CoreError> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CoreError::malformed(entity, format!("missing string field `{field}`")))
}

fn object_field(entity: &str, data: &mut Value, field: &str) -> Result<Value, CoreError> {
    match data.get_mut(field).map(Value::take) {
        Some(obj @ Value::Object(_)) => Ok(obj),
        _ => Err(CoreError::malformed(
            entity,
            format!("missing object field `{field}`"),
        )),
    }
}

fn status_delta(family: Family, data: &Value) -> Result<Update, CoreError> {
    let entity = family.as_ref();
    let id = string_field(entity, data, family.id_field())?;
    let raw = string_field(entity, data, "status")?;
    Ok(Update::Status {
        key: EntityKey::new(family, id),
        status: EntityStatus::parse(family, &raw)?,
    })
}

fn removal(family: Family, data: &Value) -> Result<Update, CoreError> {
    let id = string_field(family.as_ref(), data, family.id_field())?;
    Ok(Update::Remove(EntityKey::new(family, id)))
}

fn upsert(family: Family, data: &mut Value, field: &str) -> Result<Update, CoreError> {
    let object = object_field(family.as_ref(), data, field)?;
    Ok(Update::Upsert(parse_record(family, object)?))
}

/// Decode one push-channel message.
///
/// Returns `Ok(None)` for topics this client does not track.
pub fn decode_push(raw: Value) -> Result<Option<PushUpdate>, CoreError> {
    let PushMessage {
        event,
        sequence,
        mut data,
    } = decode::<PushMessage>("push message", raw)?;

    let update = match event.as_str() {
        "machine/status_updated" => status_delta(Family::Machine, &data)?,
        "machine/registered" => upsert(Family::Machine, &mut data, "machine")?,
        "machine/unregistered" => removal(Family::Machine, &data)?,
        "job/status_updated" => status_delta(Family::Job, &data)?,
        "job/archived" => removal(Family::Job, &data)?,
        "station/updated" => upsert(Family::Station, &mut data, "station")?,
        "station/removed" => removal(Family::Station, &data)?,
        "request/received" => upsert(Family::Request, &mut data, "request")?,
        "request/status_updated" => status_delta(Family::Request, &data)?,
        _ => return Ok(None),
    };

    Ok(Some(PushUpdate {
        topic: event,
        update,
        sequence,
    }))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn machine_json() -> Value {
        json!({
            "mid": "m1", "name": "lz-1", "userid": "u1", "status": "offline",
            "gpu": "1", "cpu": "8", "os": "linux", "arch": "x86_64",
            "memory": "16GB", "running_jobs_limit": 2
        })
    }

    fn job_json() -> Value {
        json!({
            "jobid": "j1", "receiverid": "m1", "project_id": "p1",
            "time_created": 1_700_000_000, "last_updated": 1_700_000_100,
            "status": "running", "name": "train", "stationid": "s1", "userid": "u2",
            "archived": false,
            "status_history": [{ "time": 1_700_000_000, "status": "uploaded" }],
            "pay_status": "unpaid"
        })
    }

    #[test]
    fn machine_converts() {
        let record = parse_record(Family::Machine, machine_json()).unwrap();
        let machine = record.as_machine().unwrap();
        assert_eq!(machine.mid, "m1");
        assert_eq!(machine.status, MachineStatus::Offline);
    }

    #[test]
    fn job_converts_with_history() {
        let record = parse_record(Family::Job, job_json()).unwrap();
        let job = record.as_job().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.status_history.len(), 1);
        assert_eq!(job.time_created.timestamp(), 1_700_000_000);
        assert_eq!(job.pay_status.as_deref(), Some("unpaid"));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut raw = machine_json();
        raw.as_object_mut().unwrap().remove("status");
        let err = parse_record(Family::Machine, raw).unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }), "{err:?}");
    }

    #[test]
    fn unknown_status_is_malformed() {
        let mut raw = job_json();
        raw["status"] = json!("exploded");
        let err = parse_record(Family::Job, raw).unwrap_err();
        assert!(err.to_string().contains("unknown status 'exploded'"));
    }

    #[test]
    fn invalid_timestamp_is_malformed() {
        let mut raw = job_json();
        raw["time_created"] = json!(i64::MAX);
        let err = parse_record(Family::Job, raw).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"), "{err}");
    }

    #[test]
    fn mistyped_field_is_malformed() {
        let mut raw = machine_json();
        raw["running_jobs_limit"] = json!("two");
        assert!(parse_record(Family::Machine, raw).is_err());
    }

    #[test]
    fn project_optional_timestamp_is_checked() {
        let raw = json!({
            "id": "p1", "name": "render", "user_id": "u1",
            "creation_timestamp": 1_700_000_000
        });
        let project = parse_entity::<ProjectPayload, Project>("project", raw.clone()).unwrap();
        assert_eq!(project.created.timestamp(), 1_700_000_000);
        assert!(project.updated.is_none());

        let mut bad = raw;
        bad["updated_timestamp"] = json!(i64::MAX);
        let err = parse_entity::<ProjectPayload, Project>("project", bad).unwrap_err();
        assert!(err.to_string().contains("updated_timestamp"), "{err}");
    }

    #[test]
    fn envelopes_are_checked() {
        let items = envelope_list(json!({ "machines": [machine_json()] }), "machines").unwrap();
        assert_eq!(items.len(), 1);
        assert!(envelope_list(json!({ "jobs": [] }), "machines").is_err());
        assert!(envelope_item(json!({ "machine": [] }), "machine").is_err());
    }

    #[test]
    fn push_status_delta_decodes() {
        let push = decode_push(json!({
            "event": "machine/status_updated",
            "sequence": 7,
            "data": { "mid": "m1", "status": "online" }
        }))
        .unwrap()
        .unwrap();

        assert_eq!(push.sequence, Some(7));
        assert_eq!(
            push.update,
            Update::Status {
                key: EntityKey::machine("m1"),
                status: EntityStatus::Machine(MachineStatus::Online),
            }
        );
    }

    #[test]
    fn push_registration_carries_full_record() {
        let push = decode_push(json!({
            "event": "machine/registered",
            "data": { "machine": machine_json() }
        }))
        .unwrap()
        .unwrap();
        assert!(matches!(push.update, Update::Upsert(Record::Machine(_))));
        assert_eq!(push.sequence, None);
    }

    #[test]
    fn push_removal_decodes() {
        let push = decode_push(json!({ "event": "job/archived", "data": { "jobid": "j1" } }))
            .unwrap()
            .unwrap();
        assert_eq!(push.update, Update::Remove(EntityKey::job("j1")));
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let decoded = decode_push(json!({ "event": "user/invited", "data": {} })).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn push_with_bad_status_is_malformed() {
        let err = decode_push(json!({
            "event": "request/status_updated",
            "data": { "id": "r1", "status": "maybe" }
        }))
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));
    }
}
