//! Connection supervisor.
//!
//! A small state machine keeps one session with the remote tool alive:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Disconnected
//!                           \-> Reconnecting
//! ```
//!
//! State and session live together behind one lock so that a session exists
//! exactly while the state is `Connected`. Transitions wake the driving loop
//! through a [`Notify`], which coalesces to a single pending wake-up.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use scenesched_shared::events::{
    OutputStateChanged, RemoteConnected, RemoteDisconnected, StatusReply, StatusRequested,
    TargetProgramState,
};
use scenesched_shared::{BusError, SignalBus, SubscriptionId};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RemoteConfig;
use crate::engine::Switcher;
use crate::remote::{Connector, ProductionApi, RemoteError, RemoteEvent};

const STATUS_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub version: Option<String>,
    pub output_active: bool,
}

/// One open session. Subordinate tasks hold this and nothing else of the
/// supervisor: they can use the API and end the session, no more.
pub struct Session {
    api: Arc<dyn ProductionApi>,
    version: String,
    cancel: CancellationToken,
    ready: AtomicBool,
    end_reason: OnceLock<String>,
    events: Mutex<Option<mpsc::Receiver<RemoteEvent>>>,
}

impl Session {
    fn new(
        api: Arc<dyn ProductionApi>,
        version: String,
        cancel: CancellationToken,
        events: mpsc::Receiver<RemoteEvent>,
    ) -> Self {
        Self {
            api,
            version,
            cancel,
            ready: AtomicBool::new(false),
            end_reason: OnceLock::new(),
            events: Mutex::new(Some(events)),
        }
    }

    pub fn api(&self) -> &dyn ProductionApi {
        self.api.as_ref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// End the session. The first reason given wins.
    pub fn end(&self, reason: impl Into<String>) {
        let _ = self.end_reason.set(reason.into());
        self.cancel.cancel();
    }

    fn reason(&self) -> String {
        self.end_reason
            .get()
            .cloned()
            .unwrap_or_else(|| "shutdown".to_string())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<RemoteEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

struct Fsm {
    state: ConnectionState,
    session: Option<Arc<Session>>,
}

pub struct Supervisor {
    bus: Arc<SignalBus>,
    connector: Arc<dyn Connector>,
    config: RemoteConfig,
    switcher: Arc<Switcher>,
    fsm: RwLock<Fsm>,
    wake: Notify,
    declarations: watch::Sender<Option<TargetProgramState>>,
    status_tx: mpsc::Sender<String>,
    status_rx: Mutex<Option<mpsc::Receiver<String>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Supervisor {
    pub fn new(
        bus: Arc<SignalBus>,
        connector: Arc<dyn Connector>,
        config: RemoteConfig,
    ) -> Arc<Self> {
        let switcher = Arc::new(Switcher::new(config.scenes()));
        let (declarations, _) = watch::channel(None);
        let (status_tx, status_rx) = mpsc::channel(STATUS_QUEUE);
        Arc::new(Self {
            bus,
            connector,
            config,
            switcher,
            fsm: RwLock::new(Fsm {
                state: ConnectionState::Disconnected,
                session: None,
            }),
            wake: Notify::new(),
            declarations,
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.fsm.read().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn switcher(&self) -> &Arc<Switcher> {
        &self.switcher
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.fsm
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .clone()
    }

    /// The session, if connected and bootstrapped.
    fn ready_session(&self) -> Option<Arc<Session>> {
        let fsm = self.fsm.read().unwrap_or_else(PoisonError::into_inner);
        if fsm.state != ConnectionState::Connected {
            return None;
        }
        fsm.session
            .clone()
            .filter(|session| session.ready.load(Ordering::Acquire))
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = {
            let mut fsm = self.fsm.write().unwrap_or_else(PoisonError::into_inner);
            if fsm.state == next {
                return;
            }
            std::mem::replace(&mut fsm.state, next)
        };
        debug!(from = %previous, to = %next, "connection state transitioned");
        self.wake.notify_one();
    }

    /// Connected flag, negotiated version and the dependent output's state,
    /// queried on demand.
    pub async fn status(&self) -> SessionStatus {
        let Some(session) = self.session() else {
            return SessionStatus {
                connected: false,
                version: None,
                output_active: false,
            };
        };
        let output_active = match session.api.output_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "failed to query output state");
                false
            }
        };
        SessionStatus {
            connected: true,
            version: Some(session.version.clone()),
            output_active,
        }
    }

    /// Subscribe to declarations and status requests. Both handlers only
    /// hand the request off; the work happens on the supervisor's tasks.
    pub fn attach(&self) -> Result<(), BusError> {
        let declarations = self.declarations.clone();
        let on_declaration = self
            .bus
            .subscribe::<TargetProgramState, _>("connection-supervisor", move |state| {
                declarations.send_replace(Some(state.clone()));
            })?;

        let status_tx = self.status_tx.clone();
        let on_status = self
            .bus
            .subscribe::<StatusRequested, _>("connection-supervisor", move |request| {
                if let Err(e) = status_tx.try_send(request.client_id.clone()) {
                    warn!(client_id = %request.client_id, error = %e, "status request dropped");
                }
            })?;

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([on_declaration, on_status]);
        Ok(())
    }

    pub fn detach(&self) {
        let subscriptions: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in subscriptions {
            self.bus.unsubscribe(subscription);
        }
    }

    /// Drive the state machine until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), BusError> {
        let Some(status_rx) = self
            .status_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            warn!("connection supervisor is already running");
            return Ok(());
        };
        self.attach()?;

        let workers = cancel.child_token();
        let convergence = tokio::spawn(
            Arc::clone(&self).converge_declarations(self.declarations.subscribe(), workers.clone()),
        );
        let status = tokio::spawn(Arc::clone(&self).answer_status(status_rx, workers.clone()));

        info!(
            address = %self.config.endpoint().address(),
            main_scene = %self.config.schedule_scene,
            staging_scene = %self.config.schedule_scene_aux,
            "connection supervisor started"
        );
        self.wake.notify_one();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
            }
            match self.state() {
                ConnectionState::Disconnected => self.set_state(ConnectionState::Connecting),
                ConnectionState::Connecting => self.handle_connecting(&cancel).await,
                ConnectionState::Connected => self.handle_connected().await,
                ConnectionState::Reconnecting => self.handle_reconnecting(&cancel).await,
            }
        }

        self.leave_connected("shutdown", ConnectionState::Disconnected).await;
        workers.cancel();
        for task in [convergence, status] {
            if let Err(e) = task.await {
                warn!(error = %e, "supervisor task ended abnormally");
            }
        }
        self.detach();
        info!("connection supervisor stopped");
        Ok(())
    }

    async fn handle_connecting(&self, cancel: &CancellationToken) {
        let endpoint = self.config.endpoint();
        debug!(address = %endpoint.address(), "connecting to remote");

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return,
            attempt = self.open_session(&endpoint) => attempt,
        };

        match attempt {
            Ok((connection_api, version, events)) => {
                let session = Arc::new(Session::new(
                    connection_api,
                    version.clone(),
                    cancel.child_token(),
                    events,
                ));
                {
                    let mut fsm = self.fsm.write().unwrap_or_else(PoisonError::into_inner);
                    fsm.session = Some(session);
                    fsm.state = ConnectionState::Connected;
                }
                self.wake.notify_one();
                info!(version = %version, "connected to remote");
                self.bus.publish(RemoteConnected {
                    version,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(address = %endpoint.address(), error = %e, "connection attempt failed");
                self.set_state(ConnectionState::Reconnecting);
            }
        }
    }

    async fn open_session(
        &self,
        endpoint: &crate::remote::Endpoint,
    ) -> Result<(Arc<dyn ProductionApi>, String, mpsc::Receiver<RemoteEvent>), RemoteError> {
        let connection = self.connector.connect(endpoint).await?;
        match connection.api.version().await {
            Ok(version) => Ok((connection.api, version, connection.events)),
            Err(e) => {
                connection.api.disconnect().await;
                Err(e)
            }
        }
    }

    /// Bootstrap the scenes, start the session tasks and block until the
    /// session ends.
    async fn handle_connected(&self) {
        let Some(session) = self.session() else {
            error!("entered connected state without a session");
            self.set_state(ConnectionState::Reconnecting);
            return;
        };

        if let Err(e) = self.bootstrap(session.api()).await {
            error!(error = %e, "scene setup failed, disconnecting");
            session.end(format!("scene setup failed: {e}"));
            self.leave_connected("scene setup failed", ConnectionState::Reconnecting)
                .await;
            return;
        }
        self.switcher.reset().await;
        session.ready.store(true, Ordering::Release);
        self.sync_output_state(&session).await;

        let mut tasks: Vec<JoinHandle<()>> = vec![tokio::spawn(keepalive(
            Arc::clone(&session),
            self.config.keepalive_interval(),
        ))];
        match session.take_events() {
            Some(events) => tasks.push(tokio::spawn(listen(
                Arc::clone(&session),
                events,
                Arc::clone(&self.bus),
            ))),
            None => warn!("session event stream already taken"),
        }

        session.cancel.cancelled().await;
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
        self.leave_connected("session ended", ConnectionState::Reconnecting)
            .await;
    }

    async fn handle_reconnecting(&self, cancel: &CancellationToken) {
        let interval = self.config.reconnect_interval();
        debug!(interval_secs = interval.as_secs(), "waiting before next connection attempt");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(interval) => self.set_state(ConnectionState::Disconnected),
        }
    }

    /// Drop the session and move to `next` in one step, then close the
    /// remote side and announce the disconnect.
    async fn leave_connected(&self, fallback_reason: &str, next: ConnectionState) {
        let session = {
            let mut fsm = self.fsm.write().unwrap_or_else(PoisonError::into_inner);
            let session = fsm.session.take();
            if fsm.state == ConnectionState::Connected || session.is_some() {
                fsm.state = next;
            }
            session
        };
        let Some(session) = session else {
            return;
        };
        self.wake.notify_one();

        session.end(fallback_reason);
        let reason = session.reason();
        session.api.disconnect().await;
        info!(reason = %reason, "disconnected from remote");
        self.bus.publish(RemoteDisconnected {
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Make sure both scenes exist, then empty them.
    async fn bootstrap(&self, api: &dyn ProductionApi) -> Result<(), RemoteError> {
        let main = &self.config.schedule_scene;
        let staging = &self.config.schedule_scene_aux;
        debug!(main_scene = %main, staging_scene = %staging, "starting scene setup");

        let existing = api.scene_names().await?;
        for scene in [main, staging] {
            if !existing.contains(scene) {
                info!(scene = %scene, "required scene not found, creating it");
                api.create_scene(scene).await?;
            }
        }

        for scene in [staging, main] {
            let items = api.scene_items(scene).await?;
            if !items.is_empty() {
                debug!(scene = %scene, items = items.len(), "clearing scene");
            }
            for item in items {
                if let Err(e) = api.remove_scene_item(scene, item.id).await {
                    debug!(
                        scene = %scene,
                        item = item.id,
                        error = %e,
                        "could not remove item during setup"
                    );
                }
            }
        }
        Ok(())
    }

    /// Publish a synthetic output event when the output is already running.
    async fn sync_output_state(&self, session: &Session) {
        match session.api.output_active().await {
            Ok(true) => {
                debug!("output already active on connect");
                self.bus.publish(OutputStateChanged {
                    active: true,
                    timestamp: Utc::now(),
                });
            }
            Ok(false) => debug!("output inactive on connect"),
            Err(e) => warn!(error = %e, "could not read initial output state"),
        }
    }

    async fn converge_declarations(
        self: Arc<Self>,
        mut declarations: watch::Receiver<Option<TargetProgramState>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = declarations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let declaration = declarations.borrow_and_update().clone();
                    if let Some(declaration) = declaration {
                        self.apply(&declaration).await;
                    }
                }
            }
        }
    }

    /// Forward a declaration to the engine. Dropped unless connected.
    async fn apply(&self, declaration: &TargetProgramState) {
        let Some(session) = self.ready_session() else {
            return;
        };
        match self.switcher.converge(session.api(), declaration).await {
            Ok(Some(outcome)) => self.bus.publish(outcome.to_event()),
            Ok(None) => {}
            Err(e) => error!(error = %e, "program switch failed"),
        }
    }

    async fn answer_status(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => {
                    let Some(client_id) = request else {
                        break;
                    };
                    let status = self.status().await;
                    self.bus.publish(StatusReply {
                        client_id,
                        connected: status.connected,
                        version: status.version,
                        output_active: status.output_active,
                    });
                }
            }
        }
    }
}

async fn keepalive(session: Arc<Session>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    debug!(period_secs = period.as_secs(), "keepalive started");

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = session.api.ping().await {
                    warn!(error = %e, "keepalive failed");
                    session.end(format!("health check failed: {e}"));
                    break;
                }
            }
        }
    }
    debug!("keepalive stopped");
}

async fn listen(
    session: Arc<Session>,
    mut events: mpsc::Receiver<RemoteEvent>,
    bus: Arc<SignalBus>,
) {
    debug!("remote event listener started");
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(RemoteEvent::OutputStateChanged { active }) => {
                    debug!(active, "output state changed");
                    bus.publish(OutputStateChanged {
                        active,
                        timestamp: Utc::now(),
                    });
                }
                Some(RemoteEvent::Other(name)) => debug!(event = %name, "ignoring remote event"),
                None => {
                    session.end("event channel closed");
                    break;
                }
            },
        }
    }
    debug!("remote event listener stopped");
}
