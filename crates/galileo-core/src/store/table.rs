// ── Entity table ──
//
// (family, id) → slot + revision. Reads go straight to the `DashMap`;
// writes arrive through `apply`, which the sync engine serializes under
// its reconciliation lock. An update lands iff its revision is strictly
// greater than the stored one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::event::{ChangeKind, DomainEvent, EventPayload, StatusDelta};
use crate::model::{EntityKey, EntityStatus, Family, Record};

// ── RevisionClock ────────────────────────────────────────────────────

/// Lamport-style clock shared by snapshots and push events.
///
/// Every explicit revision seen is folded in with [`observe`](Self::observe),
/// so a locally assigned revision always exceeds all observed ones.
#[derive(Debug, Default)]
pub struct RevisionClock(AtomicU64);

impl RevisionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next local revision.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advance to at least `revision`.
    pub fn observe(&self, revision: u64) {
        self.0.fetch_max(revision, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Updates ──────────────────────────────────────────────────────────

/// A single change to apply to the table.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A full record, from a snapshot or a push carrying the entity.
    /// An archived job counts as a removal.
    Upsert(Record),
    /// A status change without the rest of the record.
    Status { key: EntityKey, status: EntityStatus },
    /// The backend deleted the entity.
    Remove(EntityKey),
}

impl Update {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Upsert(record) => record.key(),
            Self::Status { key, .. } | Self::Remove(key) => key.clone(),
        }
    }
}

/// Result of [`EntityTable::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The revision was not newer than the stored one; nothing changed.
    Stale,
    /// The update was recorded. `events` is empty when the observed state
    /// equals the stored state.
    Changed { events: Vec<DomainEvent> },
}

impl Applied {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }

    pub fn into_events(self) -> Vec<DomainEvent> {
        match self {
            Self::Stale => Vec::new(),
            Self::Changed { events } => events,
        }
    }
}

// ── Slots ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Slot {
    Live(Arc<Record>),
    /// A status arrived before any full record for the id.
    Pending(EntityStatus),
    /// Deleted on the backend. Kept so an older snapshot cannot bring it back.
    Removed,
}

#[derive(Debug, Clone)]
struct Slotted {
    slot: Slot,
    revision: u64,
}

// ── EntityTable ──────────────────────────────────────────────────────

/// The local view of every tracked entity.
pub struct EntityTable {
    entries: DashMap<EntityKey, Slotted>,
    /// Bumped on every applied change.
    version: watch::Sender<u64>,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            entries: DashMap::new(),
            version,
        }
    }

    /// Apply `update` at `revision`.
    ///
    /// Callers must serialize calls per key; the sync engine holds its
    /// reconciliation lock across `apply` and the emission of the events.
    pub fn apply(&self, update: Update, revision: u64) -> Applied {
        let key = update.key();
        let applied = match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                let (slot, events) = first_observation(update, revision);
                vacant.insert(Slotted { slot, revision });
                Applied::Changed { events }
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if revision > current.revision {
                    let events = advance(current, update, revision);
                    Applied::Changed { events }
                } else {
                    Applied::Stale
                }
            }
        };

        if let Applied::Changed { events } = &applied {
            if !events.is_empty() {
                self.version.send_modify(|v| *v += 1);
            }
        } else {
            tracing::debug!(%key, revision, "dropping stale update");
        }
        applied
    }

    /// The live record for `key`, if any.
    pub fn get(&self, key: &EntityKey) -> Option<Arc<Record>> {
        self.entries.get(key).and_then(|e| match &e.slot {
            Slot::Live(record) => Some(Arc::clone(record)),
            Slot::Pending(_) | Slot::Removed => None,
        })
    }

    /// The last observed status for `key`, even if no full record exists yet.
    pub fn status_of(&self, key: &EntityKey) -> Option<EntityStatus> {
        self.entries.get(key).and_then(|e| match &e.slot {
            Slot::Live(record) => Some(record.status()),
            Slot::Pending(status) => Some(*status),
            Slot::Removed => None,
        })
    }

    /// The stored revision for `key`, including tombstones.
    pub fn revision_of(&self, key: &EntityKey) -> Option<u64> {
        self.entries.get(key).map(|e| e.revision)
    }

    pub fn is_removed(&self, key: &EntityKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| matches!(e.slot, Slot::Removed))
    }

    /// Every live record of `family`, ordered by id.
    pub fn records(&self, family: Family) -> Vec<Arc<Record>> {
        let mut records: Vec<Arc<Record>> = self
            .entries
            .iter()
            .filter(|e| e.key().family == family)
            .filter_map(|e| match &e.value().slot {
                Slot::Live(record) => Some(Arc::clone(record)),
                Slot::Pending(_) | Slot::Removed => None,
            })
            .collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    /// Number of live records of `family`.
    pub fn len(&self, family: Family) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().family == family && matches!(e.value().slot, Slot::Live(_)))
            .count()
    }

    /// Watch the change counter; it increments whenever an applied update
    /// produced at least one event.
    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl std::fmt::Debug for EntityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTable")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ── Transition rules ─────────────────────────────────────────────────

fn event(kind: ChangeKind, payload: EventPayload, revision: u64) -> DomainEvent {
    DomainEvent::new(kind, payload, revision)
}

fn status_event(key: EntityKey, status: EntityStatus, revision: u64) -> DomainEvent {
    event(
        ChangeKind::StatusUpdated,
        EventPayload::Status(StatusDelta { key, status }),
        revision,
    )
}

/// Slot and events for an id never seen before.
fn first_observation(update: Update, revision: u64) -> (Slot, Vec<DomainEvent>) {
    match update {
        Update::Upsert(record) if record.is_archived() => (Slot::Removed, Vec::new()),
        Update::Upsert(record) => {
            let record = Arc::new(record);
            let added = event(
                ChangeKind::Added,
                EventPayload::Entity(Arc::clone(&record)),
                revision,
            );
            (Slot::Live(record), vec![added])
        }
        Update::Status { key, status } => {
            (Slot::Pending(status), vec![status_event(key, status, revision)])
        }
        Update::Remove(_) => (Slot::Removed, Vec::new()),
    }
}

/// Apply a strictly newer update to an existing entry.
fn advance(current: &mut Slotted, update: Update, revision: u64) -> Vec<DomainEvent> {
    current.revision = revision;

    match update {
        Update::Upsert(record) if record.is_archived() => remove(current, record.key(), revision),
        Update::Upsert(record) => {
            let record = Arc::new(record);
            let events = match &current.slot {
                Slot::Live(old) => {
                    let mut events = Vec::new();
                    if old.status() != record.status() {
                        events.push(status_event(record.key(), record.status(), revision));
                    }
                    if old.differs_beyond_status(&record) {
                        events.push(event(
                            ChangeKind::Updated,
                            EventPayload::Entity(Arc::clone(&record)),
                            revision,
                        ));
                    }
                    events
                }
                Slot::Pending(_) | Slot::Removed => vec![event(
                    ChangeKind::Added,
                    EventPayload::Entity(Arc::clone(&record)),
                    revision,
                )],
            };
            current.slot = Slot::Live(record);
            events
        }
        Update::Status { key, status } => {
            let next = match &current.slot {
                Slot::Live(old) if old.status() == status => None,
                Slot::Live(old) => old.with_status(status).map(|r| Slot::Live(Arc::new(r))),
                Slot::Pending(old) if *old == status => None,
                Slot::Pending(_) => Some(Slot::Pending(status)),
                // A deleted entity only comes back with a full record.
                Slot::Removed => None,
            };
            match next {
                Some(slot) => {
                    current.slot = slot;
                    vec![status_event(key, status, revision)]
                }
                None => Vec::new(),
            }
        }
        Update::Remove(key) => remove(current, key, revision),
    }
}

fn remove(current: &mut Slotted, key: EntityKey, revision: u64) -> Vec<DomainEvent> {
    let was_present = !matches!(current.slot, Slot::Removed);
    current.slot = Slot::Removed;
    if was_present {
        vec![event(ChangeKind::Removed, EventPayload::Removed(key), revision)]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Machine, MachineStatus};
    use crate::testing::{job, machine};

    fn online() -> EntityStatus {
        EntityStatus::Machine(MachineStatus::Online)
    }

    fn offline() -> EntityStatus {
        EntityStatus::Machine(MachineStatus::Offline)
    }

    fn status(mid: &str, status: EntityStatus) -> Update {
        Update::Status {
            key: EntityKey::machine(mid),
            status,
        }
    }

    fn topics(applied: Applied) -> Vec<String> {
        applied.into_events().into_iter().map(|e| e.topic).collect()
    }

    #[test]
    fn clock_ticks_past_observed_revisions() {
        let clock = RevisionClock::new();
        assert_eq!(clock.tick(), 1);
        clock.observe(41);
        assert_eq!(clock.tick(), 42);
        clock.observe(10);
        assert_eq!(clock.current(), 42);
    }

    #[test]
    fn first_record_is_added() {
        let table = EntityTable::new();
        let applied = table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 1);
        assert_eq!(topics(applied), vec!["machine/added"]);
        assert_eq!(table.revision_of(&EntityKey::machine("m1")), Some(1));
        assert_eq!(table.len(Family::Machine), 1);
    }

    #[test]
    fn newer_status_applies_and_emits_delta() {
        let table = EntityTable::new();
        table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 1);

        let events = table.apply(status("m1", online()), 2).into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "machine/status_updated");
        assert_eq!(
            events[0].payload.to_json(),
            serde_json::json!({ "mid": "m1", "status": "online" })
        );
        assert_eq!(events[0].sequence, 2);
    }

    #[test]
    fn stale_status_is_dropped_without_events() {
        let table = EntityTable::new();
        table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 1);
        table.apply(status("m1", online()), 2);

        let applied = table.apply(status("m1", offline()), 1);
        assert!(applied.is_stale());
        let equal = table.apply(status("m1", offline()), 2);
        assert!(equal.is_stale());
        assert_eq!(table.status_of(&EntityKey::machine("m1")), Some(online()));
    }

    #[test]
    fn identical_state_emits_nothing_but_advances_revision() {
        let table = EntityTable::new();
        let m1: Record = machine("m1", MachineStatus::Offline).into();
        table.apply(Update::Upsert(m1.clone()), 1);

        let applied = table.apply(Update::Upsert(m1), 5);
        assert_eq!(applied, Applied::Changed { events: Vec::new() });
        assert_eq!(table.revision_of(&EntityKey::machine("m1")), Some(5));
    }

    #[test]
    fn field_and_status_change_emit_both_topics() {
        let table = EntityTable::new();
        table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 1);

        let mut renamed: Machine = machine("m1", MachineStatus::Online);
        renamed.name = "renamed".into();
        let applied = table.apply(Update::Upsert(renamed.into()), 2);
        assert_eq!(
            topics(applied),
            vec!["machine/status_updated", "machine/updated"]
        );
    }

    #[test]
    fn tombstone_blocks_stale_snapshot() {
        let table = EntityTable::new();
        let key = EntityKey::machine("m1");
        table.apply(Update::Upsert(machine("m1", MachineStatus::Online).into()), 1);

        assert_eq!(
            topics(table.apply(Update::Remove(key.clone()), 3)),
            vec!["machine/removed"]
        );
        assert!(
            table
                .apply(Update::Upsert(machine("m1", MachineStatus::Online).into()), 2)
                .is_stale()
        );
        assert!(table.get(&key).is_none());
        assert!(table.is_removed(&key));

        // A newer full record brings it back.
        let applied = table.apply(Update::Upsert(machine("m1", MachineStatus::Online).into()), 4);
        assert_eq!(topics(applied), vec!["machine/added"]);
    }

    #[test]
    fn archived_job_counts_as_removal() {
        let table = EntityTable::new();
        table.apply(Update::Upsert(job("j1", false).into()), 1);

        let applied = table.apply(Update::Upsert(job("j1", true).into()), 2);
        assert_eq!(topics(applied), vec!["job/removed"]);
        assert!(table.records(Family::Job).is_empty());

        // First seen already archived: tracked as removed, nothing emitted.
        let applied = table.apply(Update::Upsert(job("j2", true).into()), 3);
        assert_eq!(applied, Applied::Changed { events: Vec::new() });
        assert!(table.is_removed(&EntityKey::job("j2")));
    }

    #[test]
    fn older_record_never_touches_pending_status() {
        let table = EntityTable::new();
        let key = EntityKey::machine("m1");
        let version = table.subscribe_version();

        table.apply(status("m1", online()), 5);
        assert_eq!(*version.borrow(), 1);

        let applied = table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 3);
        assert!(applied.is_stale());
        assert!(table.get(&key).is_none());
        assert_eq!(table.status_of(&key), Some(online()));
        assert_eq!(table.revision_of(&key), Some(5));
        assert_eq!(*version.borrow(), 1);

        // Only a newer full record turns the pending status into a record.
        let applied = table.apply(Update::Upsert(machine("m1", MachineStatus::Offline).into()), 6);
        assert_eq!(topics(applied), vec!["machine/added"]);
        assert_eq!(table.get(&key).unwrap().status(), offline());
    }

    #[test]
    fn result_is_independent_of_arrival_order() {
        let updates = vec![
            (Update::Upsert(machine("m1", MachineStatus::Offline).into()), 1),
            (status("m1", online()), 2),
            (status("m1", offline()), 3),
            (Update::Upsert(machine("m2", MachineStatus::Online).into()), 4),
            (Update::Remove(EntityKey::machine("m2")), 6),
            (status("m3", online()), 5),
            (Update::Upsert(machine("m3", MachineStatus::Offline).into()), 7),
        ];

        let final_state = |order: &[usize]| {
            let table = EntityTable::new();
            for &i in order {
                let (update, revision) = updates[i].clone();
                table.apply(update, revision);
            }
            ["m1", "m2", "m3"]
                .iter()
                .map(|mid| {
                    let key = EntityKey::machine(*mid);
                    (
                        table.status_of(&key),
                        table.is_removed(&key),
                        table.revision_of(&key),
                    )
                })
                .collect::<Vec<_>>()
        };

        let in_revision_order = final_state(&[0, 1, 2, 3, 5, 4, 6]);
        let orders: [&[usize]; 4] = [
            &[6, 5, 4, 3, 2, 1, 0],
            &[2, 0, 1, 4, 3, 6, 5],
            &[5, 6, 1, 2, 0, 4, 3],
            &[3, 4, 0, 2, 1, 6, 5],
        ];
        for order in orders {
            assert_eq!(final_state(order), in_revision_order, "order {order:?}");
        }
    }

    #[test]
    fn version_bumps_only_on_visible_changes() {
        let table = EntityTable::new();
        let rx = table.subscribe_version();
        let m1: Record = machine("m1", MachineStatus::Offline).into();

        table.apply(Update::Upsert(m1.clone()), 1);
        table.apply(Update::Upsert(m1), 2);
        assert_eq!(*rx.borrow(), 1);
    }
}
