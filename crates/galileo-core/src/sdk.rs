// ── Galileo SDK facade ──
//
// One handle over the whole client: token store, request executor,
// repositories, and the sync engine with its event bus. Cheap to clone.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use galileo_api::{
    ApiBase, Credential, HttpTransport, PushSource, RequestExecutor, TokenStore, Transport,
    WebSocketPushSource,
};

use crate::bus::{CallbackError, SubscriptionId};
use crate::config::{SdkConfig, SdkCredentials};
use crate::error::CoreError;
use crate::event::DomainEvent;
use crate::repository::{
    JobsRepository, MachinesRepository, ProfilesRepository, ProjectsRepository,
    RequestsRepository, SnapshotSource, StationsRepository,
};
use crate::sync::{ConnectionState, SyncEngine};

/// Entry point for applications.
///
/// [`connect`](Self::connect) authenticates and starts keeping the local
/// view in sync; repositories can be used directly once authenticated.
#[derive(Clone)]
pub struct Galileo {
    inner: Arc<GalileoInner>,
}

struct GalileoInner {
    config: SdkConfig,
    tokens: Arc<TokenStore>,
    executor: RequestExecutor,
    machines: MachinesRepository,
    jobs: JobsRepository,
    stations: StationsRepository,
    requests: RequestsRepository,
    profiles: ProfilesRepository,
    projects: ProjectsRepository,
    engine: SyncEngine,
}

impl Galileo {
    /// Build the client over reqwest and, when enabled, the WebSocket push
    /// channel. Does not touch the network.
    pub fn new(config: SdkConfig) -> Result<Self, CoreError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.transport())?);
        let base = ApiBase::new(&config.url)?;
        let tokens = Arc::new(TokenStore::new(transport, base));

        let push = if config.push_enabled {
            let source = WebSocketPushSource::new(Arc::clone(&tokens))?;
            Some(Arc::new(source) as Arc<dyn PushSource>)
        } else {
            None
        };
        Ok(Self::assemble(config, tokens, push))
    }

    /// Build the client over caller-supplied transport and push source.
    /// `push_enabled` in `config` is ignored; `push` decides.
    pub fn with_parts(
        config: SdkConfig,
        transport: Arc<dyn Transport>,
        push: Option<Arc<dyn PushSource>>,
    ) -> Result<Self, CoreError> {
        let base = ApiBase::new(&config.url)?;
        let tokens = Arc::new(TokenStore::new(transport, base));
        Ok(Self::assemble(config, tokens, push))
    }

    fn assemble(
        config: SdkConfig,
        tokens: Arc<TokenStore>,
        push: Option<Arc<dyn PushSource>>,
    ) -> Self {
        let executor = RequestExecutor::new(Arc::clone(&tokens));
        let machines = MachinesRepository::new(executor.clone()).with_page_size(config.page_size);
        let jobs = JobsRepository::new(executor.clone()).with_page_size(config.page_size);
        let stations = StationsRepository::new(executor.clone()).with_page_size(config.page_size);
        let requests = RequestsRepository::new(executor.clone()).with_page_size(config.page_size);
        let profiles = ProfilesRepository::new(executor.clone());
        let projects = ProjectsRepository::new(executor.clone());

        let sources: Vec<Arc<dyn SnapshotSource>> = vec![
            Arc::new(machines.clone()),
            Arc::new(jobs.clone()),
            Arc::new(stations.clone()),
            Arc::new(requests.clone()),
        ];
        let engine = SyncEngine::new(config.engine(), sources, push);

        Self {
            inner: Arc::new(GalileoInner {
                config,
                tokens,
                executor,
                machines,
                jobs,
                stations,
                requests,
                profiles,
                projects,
                engine,
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate with the configured credentials and start the sync
    /// engine. Returns once authenticated; the initial snapshot arrives in
    /// the background (see [`wait_until_synced`](Self::wait_until_synced)).
    pub async fn connect(&self) -> Result<(), CoreError> {
        match &self.inner.config.credentials {
            SdkCredentials::Password { username, password } => {
                self.inner.tokens.login(username, password).await?;
            }
            SdkCredentials::Tokens { access, refresh } => {
                let credential = Credential::new(access.clone(), refresh.clone(), None)?;
                self.inner.tokens.set_credential(credential);
            }
        }
        info!(url = %self.inner.config.url, "authenticated");

        self.inner.engine.start().await;
        Ok(())
    }

    /// Stop the sync engine and drop the credential. Entity reads keep
    /// serving the last known state.
    pub async fn disconnect(&self) {
        self.inner.engine.shutdown().await;
        self.inner.tokens.logout();
        debug!("disconnected");
    }

    /// Wait for the first complete snapshot after [`connect`](Self::connect).
    pub async fn wait_until_synced(&self) -> Result<(), CoreError> {
        self.inner.engine.wait_until_synced().await
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.engine.connection_state()
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Subscribe to a topic such as `machine/status_updated`.
    pub fn on<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.inner.engine.bus().on(topic, callback)
    }

    pub fn off(&self, topic: &str, id: SubscriptionId) {
        self.inner.engine.bus().off(topic, id);
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.inner.executor
    }

    pub fn machines(&self) -> &MachinesRepository {
        &self.inner.machines
    }

    pub fn jobs(&self) -> &JobsRepository {
        &self.inner.jobs
    }

    pub fn stations(&self) -> &StationsRepository {
        &self.inner.stations
    }

    pub fn requests(&self) -> &RequestsRepository {
        &self.inner.requests
    }

    pub fn profiles(&self) -> &ProfilesRepository {
        &self.inner.profiles
    }

    pub fn projects(&self) -> &ProjectsRepository {
        &self.inner.projects
    }

    /// The synchronized local view.
    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }
}

impl std::fmt::Debug for Galileo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Galileo")
            .field("url", &self.inner.config.url.as_str())
            .field("authenticated", &self.inner.tokens.is_authenticated())
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}
