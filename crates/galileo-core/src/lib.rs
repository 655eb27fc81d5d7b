//! Synchronized client view of a Galileo backend.
//!
//! Sits between `galileo-api` (HTTP, tokens, push socket) and applications:
//!
//! - **[`Galileo`]**: facade owning the token store, repositories and sync
//!   engine. [`connect()`](Galileo::connect) authenticates and starts the
//!   background sync.
//!
//! - **Repositories** ([`repository`]): typed `list`/`get`/action calls per
//!   entity family over the shared [`RequestExecutor`](galileo_api::RequestExecutor).
//!
//! - **[`SyncEngine`]**: merges REST snapshots and push messages into the
//!   [`EntityTable`] under a single revision clock and publishes the
//!   resulting [`DomainEvent`]s on the [`EventBus`].
//!
//! - **[`AutoAcceptAgent`]**: poller that accepts pending landing requests.

pub mod agent;
pub mod bus;
pub mod config;
pub mod convert;
pub mod error;
pub mod event;
pub mod model;
pub mod repository;
pub mod sdk;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use agent::{AgentStats, AutoAcceptAgent, CycleReport};
pub use bus::{CallbackError, Delivery, EventBus, SubscriptionId};
pub use config::{SdkConfig, SdkCredentials, TlsVerification};
pub use error::CoreError;
pub use event::{ChangeKind, DomainEvent, EventPayload, StatusDelta, topics};
pub use repository::{
    JobFilter, JobsRepository, MachineFilter, MachinesRepository, ProfilesRepository,
    ProjectFilter, ProjectsRepository, Repository, RequestFilter, RequestsRepository,
    SnapshotSource, StationFilter, StationsRepository,
};
pub use sdk::Galileo;
pub use store::{Applied, EntityTable, RevisionClock, Update};
pub use sync::{ConnectionState, EngineConfig, SyncEngine};

pub use model::{
    EntityKey, EntityStatus, Family, Job, JobStatus, JobStatusEntry, LandingRequest,
    LandingRequestStatus, Machine, MachineStatus, Profile, Project, ProjectFile, Record, Station,
    StationMember, StationStatus,
};

// Re-exported so callers can configure reconnects without naming galileo-api.
pub use galileo_api::ReconnectConfig;
