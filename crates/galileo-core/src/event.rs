// ── Domain events ──
//
// Normalized events the sync engine publishes on the bus after a
// successful reconciliation. Subscribers never see raw push messages.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::model::{EntityKey, EntityStatus, Family, Record};

/// Well-known topic names.
pub mod topics {
    pub const MACHINE_ADDED: &str = "machine/added";
    pub const MACHINE_STATUS_UPDATED: &str = "machine/status_updated";
    pub const MACHINE_UPDATED: &str = "machine/updated";
    pub const MACHINE_REMOVED: &str = "machine/removed";

    pub const JOB_ADDED: &str = "job/added";
    pub const JOB_STATUS_UPDATED: &str = "job/status_updated";
    pub const JOB_UPDATED: &str = "job/updated";
    pub const JOB_REMOVED: &str = "job/removed";

    pub const STATION_ADDED: &str = "station/added";
    pub const STATION_STATUS_UPDATED: &str = "station/status_updated";
    pub const STATION_UPDATED: &str = "station/updated";
    pub const STATION_REMOVED: &str = "station/removed";

    pub const REQUEST_RECEIVED: &str = "request/received";
    pub const REQUEST_STATUS_UPDATED: &str = "request/status_updated";
    pub const REQUEST_UPDATED: &str = "request/updated";
    pub const REQUEST_REMOVED: &str = "request/removed";
}

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    StatusUpdated,
    Updated,
    Removed,
}

/// Topic name for a change to an entity of `family`.
pub fn topic_for(family: Family, kind: ChangeKind) -> &'static str {
    use topics::{
        JOB_ADDED, JOB_REMOVED, JOB_STATUS_UPDATED, JOB_UPDATED, MACHINE_ADDED, MACHINE_REMOVED,
        MACHINE_STATUS_UPDATED, MACHINE_UPDATED, REQUEST_RECEIVED, REQUEST_REMOVED,
        REQUEST_STATUS_UPDATED, REQUEST_UPDATED, STATION_ADDED, STATION_REMOVED,
        STATION_STATUS_UPDATED, STATION_UPDATED,
    };

    match (family, kind) {
        (Family::Machine, ChangeKind::Added) => MACHINE_ADDED,
        (Family::Machine, ChangeKind::StatusUpdated) => MACHINE_STATUS_UPDATED,
        (Family::Machine, ChangeKind::Updated) => MACHINE_UPDATED,
        (Family::Machine, ChangeKind::Removed) => MACHINE_REMOVED,
        (Family::Job, ChangeKind::Added) => JOB_ADDED,
        (Family::Job, ChangeKind::StatusUpdated) => JOB_STATUS_UPDATED,
        (Family::Job, ChangeKind::Updated) => JOB_UPDATED,
        (Family::Job, ChangeKind::Removed) => JOB_REMOVED,
        (Family::Station, ChangeKind::Added) => STATION_ADDED,
        (Family::Station, ChangeKind::StatusUpdated) => STATION_STATUS_UPDATED,
        (Family::Station, ChangeKind::Updated) => STATION_UPDATED,
        (Family::Station, ChangeKind::Removed) => STATION_REMOVED,
        (Family::Request, ChangeKind::Added) => REQUEST_RECEIVED,
        (Family::Request, ChangeKind::StatusUpdated) => REQUEST_STATUS_UPDATED,
        (Family::Request, ChangeKind::Updated) => REQUEST_UPDATED,
        (Family::Request, ChangeKind::Removed) => REQUEST_REMOVED,
    }
}

/// A status change: `{"mid": "m1", "status": "online"}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDelta {
    pub key: EntityKey,
    pub status: EntityStatus,
}

impl StatusDelta {
    pub fn family(&self) -> Family {
        self.key.family
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(self.key.family.id_field().to_owned(), json!(self.key.id));
        obj.insert("status".to_owned(), json!(self.status.as_str()));
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// The full record after an add or a field change.
    Entity(Arc<Record>),
    Status(StatusDelta),
    Removed(EntityKey),
}

impl EventPayload {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Entity(record) => record.key(),
            Self::Status(delta) => delta.key.clone(),
            Self::Removed(key) => key.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Entity(record) => record.to_json(),
            Self::Status(delta) => delta.to_json(),
            Self::Removed(key) => {
                let mut obj = serde_json::Map::new();
                obj.insert(key.family.id_field().to_owned(), json!(key.id));
                Value::Object(obj)
            }
        }
    }
}

/// An event delivered to bus subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub topic: String,
    pub payload: EventPayload,
    /// Revision of the update that produced this event.
    pub sequence: u64,
}

impl DomainEvent {
    pub fn new(kind: ChangeKind, payload: EventPayload, sequence: u64) -> Self {
        let family = payload.key().family;
        Self {
            topic: topic_for(family, kind).to_owned(),
            payload,
            sequence,
        }
    }

    /// Build an event on an arbitrary topic (for callers that emit on the bus directly).
    pub fn custom(topic: impl Into<String>, payload: EventPayload, sequence: u64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            sequence,
        }
    }

    pub fn status_delta(&self) -> Option<&StatusDelta> {
        match &self.payload {
            EventPayload::Status(delta) => Some(delta),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&Arc<Record>> {
        match &self.payload {
            EventPayload::Entity(record) => Some(record),
            _ => None,
        }
    }
}
