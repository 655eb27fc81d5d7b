// ── Sync engine ──
//
// Merges REST snapshots and push-channel messages into the entity table
// and republishes the resulting domain events on the bus.
//
// Every update carries a revision from one Lamport-style clock. Snapshot
// pulls take their revision before the REST call goes out; push messages
// use the backend sequence when present and a fresh tick otherwise. The
// table applies an update only when its revision is newer than the stored
// one, and the apply + publish pair runs under a single mutex so subscribers
// see the events for any one id in revision order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use galileo_api::{PushSignal, PushSource, PushStream, ReconnectConfig, backoff_delay};

use crate::bus::EventBus;
use crate::convert::decode_push;
use crate::error::CoreError;
use crate::event::DomainEvent;
use crate::model::{
    EntityKey, EntityStatus, Family, Job, LandingRequest, Machine, Record, Station,
};
use crate::repository::SnapshotSource;
use crate::store::{EntityTable, RevisionClock, Update};

// ── ConnectionState ──────────────────────────────────────────────────

/// Push-channel connection state, observable through
/// [`SyncEngine::connection_state`].
///
/// A session runs `Connecting → Connected → Resyncing → Connected`. The
/// first `Connected` means the handshake succeeded; use
/// [`SyncEngine::wait_until_synced`] to wait for the resync that follows.
/// Without a push source the same sequence is reported around the
/// initial snapshot pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, pulling one snapshot per tracked family.
    Resyncing,
}

// ── EngineConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Backoff for push reconnects and failed resync retries.
    pub reconnect: ReconnectConfig,
    /// Period of the background snapshot poll. `None` disables it.
    pub poll_interval: Option<Duration>,
}

// ── SyncEngine ───────────────────────────────────────────────────────

/// Keeps the local entity view in step with the backend.
///
/// Cheaply cloneable; clones share the same table, bus and tasks.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    table: Arc<EntityTable>,
    bus: Arc<EventBus>,
    clock: RevisionClock,
    sources: Vec<Arc<dyn SnapshotSource>>,
    push: Option<Arc<dyn PushSource>>,
    state: watch::Sender<ConnectionState>,
    /// True once every family was pulled since the last (re)connect.
    synced: watch::Sender<bool>,
    /// Serializes check-and-apply with the publish that follows it.
    reconcile: Mutex<()>,
    cancel: tokio::sync::Mutex<CancellationToken>,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Build an engine over `sources` (one per tracked family). Without a
    /// push source the engine keeps up to date through snapshots only.
    pub fn new(
        config: EngineConfig,
        sources: Vec<Arc<dyn SnapshotSource>>,
        push: Option<Arc<dyn PushSource>>,
    ) -> Self {
        Self::with_bus(config, sources, push, Arc::new(EventBus::new()))
    }

    /// Like [`new`](Self::new), publishing on an existing bus.
    pub fn with_bus(
        config: EngineConfig,
        sources: Vec<Arc<dyn SnapshotSource>>,
        push: Option<Arc<dyn PushSource>>,
        bus: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (synced, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                config,
                table: Arc::new(EntityTable::new()),
                bus,
                clock: RevisionClock::new(),
                sources,
                push,
                state,
                synced,
                reconcile: Mutex::new(()),
                cancel: tokio::sync::Mutex::new(CancellationToken::new()),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn table(&self) -> &Arc<EntityTable> {
        &self.inner.table
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn clock(&self) -> &RevisionClock {
        &self.inner.clock
    }

    /// Families pulled on every resync.
    pub fn tracked_families(&self) -> Vec<Family> {
        self.inner.sources.iter().map(|s| s.family()).collect()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// State changes as a stream, starting with the current state.
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.connection_state())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Whether the last resync finished and the engine is still connected.
    pub fn is_synced(&self) -> bool {
        *self.inner.synced.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        if matches!(state, ConnectionState::Disconnected | ConnectionState::Connecting) {
            self.inner.synced.send_replace(false);
        }
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "connection state changed");
        }
    }

    /// Report `Connected` after a completed resync.
    fn mark_synced(&self) {
        self.set_state(ConnectionState::Connected);
        self.inner.synced.send_replace(true);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the background tasks: the push loop (or a one-shot snapshot
    /// pull when there is no push source) and the optional poller.
    ///
    /// Calling `start` on a running engine does nothing.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("sync engine already running");
            return;
        }
        let cancel = self.inner.cancel.lock().await.clone();

        match &self.inner.push {
            Some(source) => {
                handles.push(tokio::spawn(push_task(
                    self.clone(),
                    Arc::clone(source),
                    cancel.clone(),
                )));
            }
            None => {
                let engine = self.clone();
                let task_cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    engine.set_state(ConnectionState::Connecting);
                    engine.set_state(ConnectionState::Connected);
                    engine.set_state(ConnectionState::Resyncing);
                    if engine.resync_until_done(&task_cancel).await {
                        engine.mark_synced();
                    }
                }));
            }
        }

        if let Some(period) = self.inner.config.poll_interval {
            handles.push(tokio::spawn(poll_task(self.clone(), period, cancel)));
        }
        info!(
            families = self.inner.sources.len(),
            push = self.inner.push.is_some(),
            "sync engine started"
        );
    }

    /// Cancel reconnects, backoff sleeps and the poller, then wait for the
    /// tasks to finish. The table keeps its contents; the engine may be
    /// started again.
    pub async fn shutdown(&self) {
        {
            let mut cancel = self.inner.cancel.lock().await;
            cancel.cancel();
            *cancel = CancellationToken::new();
        }

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("sync engine stopped");
    }

    /// Resolves once the engine reports `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), CoreError> {
        let mut rx = self.connection_state();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| CoreError::Shutdown)
    }

    /// Resolves once a resync has completed on the current connection.
    pub async fn wait_until_synced(&self) -> Result<(), CoreError> {
        let mut rx = self.inner.synced.subscribe();
        rx.wait_for(|synced| *synced)
            .await
            .map(|_| ())
            .map_err(|_| CoreError::Shutdown)
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Apply one update at `revision` and publish what it produced.
    ///
    /// Returns the published events; a stale update returns none.
    /// Subscribers run while the reconciliation lock is held and must not
    /// feed updates back into the engine.
    pub fn apply(&self, update: Update, revision: u64) -> Vec<DomainEvent> {
        let _guard = self
            .inner
            .reconcile
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.inner.clock.observe(revision);
        let events = self.inner.table.apply(update, revision).into_events();
        for event in &events {
            self.inner.bus.publish(event);
        }
        events
    }

    /// Decode and apply one raw push message.
    ///
    /// Unknown topics are ignored. A message that fails to decode is
    /// reported and leaves the table untouched.
    pub fn handle_push(&self, raw: Value) -> Result<Vec<DomainEvent>, CoreError> {
        let Some(push) = decode_push(raw)? else {
            debug!("ignoring push message with an untracked topic");
            return Ok(Vec::new());
        };

        let revision = match push.sequence {
            Some(sequence) => sequence,
            None => self.inner.clock.tick(),
        };
        debug!(topic = %push.topic, revision, "push message");
        Ok(self.apply(push.update, revision))
    }

    /// Pull every tracked family once.
    ///
    /// All families are attempted; the first failure is returned after the
    /// rest have been pulled.
    pub async fn resync(&self) -> Result<(), CoreError> {
        let mut first_error = None;
        for source in &self.inner.sources {
            if let Err(e) = self.resync_source(source.as_ref()).await {
                warn!(family = %source.family(), error = %e, "resync failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Pull one family. Returns the number of events published.
    pub async fn resync_family(&self, family: Family) -> Result<usize, CoreError> {
        let source = self
            .inner
            .sources
            .iter()
            .find(|s| s.family() == family)
            .ok_or_else(|| CoreError::Config {
                message: format!("family '{family}' is not tracked"),
            })?;
        self.resync_source(source.as_ref()).await
    }

    async fn resync_source(&self, source: &dyn SnapshotSource) -> Result<usize, CoreError> {
        // The revision is taken before the request so that any push
        // received while the snapshot is in flight wins over it.
        let revision = self.inner.clock.tick();
        let records = source.snapshot().await?;

        let count = records.len();
        let published: usize = records
            .into_iter()
            .map(|record| self.apply(Update::Upsert(record), revision).len())
            .sum();
        debug!(family = %source.family(), revision, count, published, "snapshot applied");
        Ok(published)
    }

    /// Pull every family, retrying transient failures with backoff.
    ///
    /// Returns `false` if cancelled before every family was pulled. A
    /// family that fails with a non-transient error is logged and left
    /// for the next resync.
    async fn resync_until_done(&self, cancel: &CancellationToken) -> bool {
        let mut pending: Vec<Arc<dyn SnapshotSource>> = self.inner.sources.clone();
        let mut attempt: u32 = 0;

        loop {
            let mut failed = Vec::new();
            for source in pending {
                match self.resync_source(source.as_ref()).await {
                    Ok(_) => {}
                    Err(e) if e.is_transient() => {
                        warn!(family = %source.family(), attempt, error = %e, "resync failed, will retry");
                        failed.push(source);
                    }
                    Err(e) => {
                        warn!(family = %source.family(), error = %e, "resync failed, skipping family");
                    }
                }
            }
            if failed.is_empty() {
                return true;
            }

            let delay = backoff_delay(attempt, &self.inner.config.reconnect);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(delay) => {}
            }
            pending = failed;
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn machine(&self, mid: &str) -> Option<Machine> {
        self.record(&EntityKey::machine(mid))
            .and_then(|r| r.as_machine().cloned())
    }

    pub fn machines(&self) -> Vec<Machine> {
        self.family_records(Family::Machine, Record::as_machine)
    }

    pub fn job(&self, jobid: &str) -> Option<Job> {
        self.record(&EntityKey::job(jobid))
            .and_then(|r| r.as_job().cloned())
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.family_records(Family::Job, Record::as_job)
    }

    pub fn station(&self, stationid: &str) -> Option<Station> {
        self.record(&EntityKey::station(stationid))
            .and_then(|r| r.as_station().cloned())
    }

    pub fn stations(&self) -> Vec<Station> {
        self.family_records(Family::Station, Record::as_station)
    }

    pub fn request(&self, id: &str) -> Option<LandingRequest> {
        self.record(&EntityKey::request(id))
            .and_then(|r| r.as_request().cloned())
    }

    pub fn requests(&self) -> Vec<LandingRequest> {
        self.family_records(Family::Request, Record::as_request)
    }

    pub fn record(&self, key: &EntityKey) -> Option<Arc<Record>> {
        self.inner.table.get(key)
    }

    /// Last known status, including statuses seen before the full record.
    pub fn status_of(&self, key: &EntityKey) -> Option<EntityStatus> {
        self.inner.table.status_of(key)
    }

    pub fn revision_of(&self, key: &EntityKey) -> Option<u64> {
        self.inner.table.revision_of(key)
    }

    fn family_records<T: Clone>(&self, family: Family, pick: fn(&Record) -> Option<&T>) -> Vec<T> {
        self.inner
            .table
            .records(family)
            .iter()
            .filter_map(|r| pick(r).cloned())
            .collect()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("families", &self.tracked_families())
            .field("push", &self.inner.push.is_some())
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Connect, resync, consume; on any drop wait out the backoff and repeat.
async fn push_task(engine: SyncEngine, source: Arc<dyn PushSource>, cancel: CancellationToken) {
    let reconnect = engine.inner.config.reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        engine.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = source.connect() => result,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                engine.set_state(ConnectionState::Connected);
                info!("push channel up, resyncing");
                if !consume(&engine, stream, &cancel).await {
                    break;
                }
                engine.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                engine.set_state(ConnectionState::Disconnected);
                attempt = attempt.saturating_add(1);
                warn!(attempt, error = %e, "push handshake failed");
                if reconnect.max_retries.is_some_and(|max| attempt >= max) {
                    warn!(attempt, "giving up on the push channel");
                    break;
                }
            }
        }

        let delay = backoff_delay(attempt, &reconnect);
        debug!(attempt, delay_ms = delay.as_millis(), "waiting before reconnect");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    debug!("push task exiting");
}

/// Resync, then apply messages until the channel drops.
///
/// The engine is synced again once the resync is done. Messages that
/// arrive while it runs are applied as they come. Returns `false` when
/// cancelled.
async fn consume(engine: &SyncEngine, mut stream: PushStream, cancel: &CancellationToken) -> bool {
    engine.set_state(ConnectionState::Resyncing);
    let resync = engine.resync_until_done(cancel);
    tokio::pin!(resync);
    let mut resynced = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            done = &mut resync, if !resynced => {
                if !done {
                    return false;
                }
                resynced = true;
                engine.mark_synced();
                info!("resync complete");
            }
            signal = stream.next() => match signal {
                Some(PushSignal::Event(raw)) => {
                    if let Err(e) = engine.handle_push(raw) {
                        warn!(error = %e, "dropping push message");
                    }
                }
                Some(PushSignal::Disconnected { reason }) => {
                    warn!(%reason, "push channel dropped");
                    return true;
                }
                None => {
                    warn!("push channel ended");
                    return true;
                }
            },
        }
    }
}

/// Pull every family on a fixed period.
async fn poll_task(engine: SyncEngine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = engine.resync().await {
                    warn!(error = %e, "periodic resync failed");
                }
            }
        }
    }
}
