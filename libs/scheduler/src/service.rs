//! The scheduler service: owns the in-memory schedule, ticks the evaluator
//! and answers schedule requests from the bus.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::{DateTime, Local, TimeZone, Utc};
use scenesched_shared::events::{
    CommitResult, CommitScheduleRequested, CurrentScheduleReply, GetScheduleRequested,
    ScheduleReloaded, TargetProgramState,
};
use scenesched_shared::{BusError, Program, SignalBus, SubscriptionId, display_title};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::evaluator::evaluate;
use crate::model::Schedule;
use crate::store::{CommitError, ScheduleStore, StoreError};
use crate::watcher::{FileWatch, ScheduleFileChanged};

const REQUEST_QUEUE: usize = 32;
const CHANGE_QUEUE: usize = 8;

#[derive(Debug)]
enum Request {
    Commit { client_id: String, payload: String },
}

pub struct Scheduler {
    bus: Arc<SignalBus>,
    store: ScheduleStore,
    config: SchedulerConfig,
    default_program: Option<Program>,
    schedule: RwLock<Option<Arc<Schedule>>>,
    last_target: Mutex<Option<String>>,
    requests_tx: mpsc::Sender<Request>,
    requests_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Scheduler {
    pub fn new(bus: Arc<SignalBus>, store: ScheduleStore, config: SchedulerConfig) -> Arc<Self> {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let default_program = config.default_program();
        Arc::new(Self {
            bus,
            store,
            config,
            default_program,
            schedule: RwLock::new(None),
            last_target: Mutex::new(None),
            requests_tx,
            requests_rx: Mutex::new(Some(requests_rx)),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn current_schedule(&self) -> Option<Arc<Schedule>> {
        self.schedule
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load the document from disk and swap it in. On failure the previous
    /// schedule stays in place.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let schedule = self.store.load().await?;
        let program_count = schedule.programs.len();
        for program in schedule.reserved_id_programs() {
            warn!(
                id = %program.id,
                title = %program.title,
                "program uses the id reserved for the default source and will never play"
            );
        }
        *self.schedule.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(schedule));
        info!(
            path = %self.store.path().display(),
            programs = program_count,
            "schedule loaded"
        );
        self.bus.publish(ScheduleReloaded {
            program_count,
            timestamp: Utc::now(),
        });
        Ok(program_count)
    }

    /// Evaluate against `now` and publish the declaration.
    pub fn evaluate_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TargetProgramState {
        let schedule = self.current_schedule();
        let state = evaluate(schedule.as_deref(), self.default_program.as_ref(), now);
        self.log_transition(&state);
        self.bus.publish(state.clone());
        state
    }

    pub fn evaluate_now(&self) -> TargetProgramState {
        self.evaluate_at(&Local::now())
    }

    /// Validate and write a client-supplied document, then report the
    /// outcome on the bus. Does not evaluate.
    pub async fn commit(&self, client_id: &str, payload: &str) -> Result<(), CommitError> {
        let outcome = self.store.commit(payload).await;
        let message = match &outcome {
            Ok(()) => {
                info!(client_id, "schedule committed");
                None
            }
            Err(e) => {
                warn!(client_id, error = %e, "schedule commit rejected");
                Some(e.client_message().to_string())
            }
        };
        self.bus.publish(CommitResult {
            client_id: client_id.to_string(),
            success: outcome.is_ok(),
            message,
        });
        outcome
    }

    /// Publish the in-memory document for `client_id`. Nothing is sent when
    /// no schedule has been loaded yet.
    pub fn reply_schedule(&self, client_id: &str) {
        let Some(schedule) = self.current_schedule() else {
            warn!(client_id, "schedule requested before any was loaded");
            return;
        };
        match serde_json::to_value(schedule.as_ref()) {
            Ok(document) => self.bus.publish(CurrentScheduleReply {
                client_id: client_id.to_string(),
                schedule: document,
            }),
            Err(e) => error!(client_id, error = %e, "failed to serialize schedule"),
        }
    }

    /// Subscribe the request handlers. Commits are queued for [`Self::run`];
    /// schedule reads are answered inline.
    pub fn attach(self: &Arc<Self>) -> Result<(), BusError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let get = self
            .bus
            .subscribe::<GetScheduleRequested, _>("scheduler", move |request| {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.reply_schedule(&request.client_id);
                }
            })?;

        let requests = self.requests_tx.clone();
        let bus = Arc::downgrade(&self.bus);
        let commit = self
            .bus
            .subscribe::<CommitScheduleRequested, _>("scheduler", move |request| {
                let queued = requests.try_send(Request::Commit {
                    client_id: request.client_id.clone(),
                    payload: request.payload.clone(),
                });
                if let Err(e) = queued {
                    warn!(client_id = %request.client_id, error = %e, "commit request dropped");
                    if let Some(bus) = bus.upgrade() {
                        bus.publish(CommitResult {
                            client_id: request.client_id.clone(),
                            success: false,
                            message: Some("Scheduler busy".to_string()),
                        });
                    }
                }
            })?;

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([get, commit]);
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

    /// Load, evaluate, then keep evaluating on every tick and after every
    /// settled change of the schedule file until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), BusError> {
        let Some(mut requests) = self
            .requests_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            warn!("scheduler is already running");
            return Ok(());
        };
        self.attach()?;

        self.reload_and_evaluate().await;

        let (change_tx, mut change_rx) = mpsc::channel::<ScheduleFileChanged>(CHANGE_QUEUE);
        let watch = FileWatch::new(self.store.path(), self.config.watch_debounce());
        let watch_cancel = cancel.child_token();
        let watch_task = tokio::spawn(async move {
            if let Err(e) = watch.run(change_tx, watch_cancel).await {
                error!(error = %e, "schedule file watcher failed");
            }
        });

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and the startup evaluation
        // already covered it.
        ticker.tick().await;

        info!(
            tick_ms = self.config.tick_interval_ms,
            default_source = self.default_program.is_some(),
            "scheduler started"
        );

        let mut watching = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate_now();
                }
                maybe_change = change_rx.recv(), if watching => {
                    let Some(change) = maybe_change else {
                        warn!("schedule watcher stopped, file changes are no longer picked up");
                        watching = false;
                        continue;
                    };
                    info!(path = %change.path.display(), "schedule file changed, reloading");
                    self.reload_and_evaluate().await;
                }
                maybe_request = requests.recv() => {
                    let Some(Request::Commit { client_id, payload }) = maybe_request else {
                        continue;
                    };
                    let _ = self.commit(&client_id, &payload).await;
                }
            }
        }

        if let Err(e) = watch_task.await {
            warn!(error = %e, "schedule watcher task ended abnormally");
        }
        self.detach();
        info!("scheduler stopped");
        Ok(())
    }

    async fn reload_and_evaluate(&self) {
        match self.reload().await {
            Ok(_) => {
                self.evaluate_now();
            }
            Err(e) => {
                error!(error = %e, "failed to load schedule, keeping previous");
                if self.current_schedule().is_none() {
                    self.evaluate_now();
                }
            }
        }
    }

    fn log_transition(&self, state: &TargetProgramState) {
        let target_id = state.target.as_ref().map(|program| program.id.clone());
        let mut last = self.last_target.lock().unwrap_or_else(PoisonError::into_inner);
        if *last == target_id {
            debug!(target = %display_title(state.target.as_ref()), "evaluation unchanged");
            return;
        }
        info!(
            target = %display_title(state.target.as_ref()),
            next = %display_title(state.next.as_ref()),
            seek_secs = state.seek_offset.as_secs(),
            "target program changed"
        );
        *last = target_id;
    }
}
