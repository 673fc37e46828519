//! # Print Service
//!
//! Background scheduler between callers that want things printed and a
//! printer that overheats when rushed and drops its link without warning.
//!
//! Callers only ever touch [`PrintService::enqueue`] and
//! [`PrintService::stop`]; one worker owns the [`DeviceSession`] and runs
//! every protocol exchange on the blocking pool, one at a time.
//!
//! ## Scheduling Loop
//!
//! ```text
//! Reconnecting ──ok──> Idle <───────────────────────────┐
//!     ^                 │ task due        │ ping due      │
//!     │                 v                 v               │
//!     │              Sending ──ok──>   Pinging ──ok──> ───┘
//!     │                 │ link error      │ link error
//!     └─────────────────┴─────────────────┘
//! ```
//!
//! - The service starts in `Reconnecting`; the first attempt skips the
//!   `reconnect_wait` delay.
//! - Tasks run in enqueue order, at most one per `task_interval`.
//! - A battery query runs every `ping_interval` to keep the link awake.
//! - After a link failure the worker waits `reconnect_wait`, reconnects,
//!   resets the printer and waits `post_connect_wait` before the next task.
//!   The failed task is reported and dropped, never re-sent.
//! - Validation failures are reported and the loop carries on.
//!
//! ## Observing
//!
//! Failures never surface at `enqueue`; watch [`PrintService::status`] or
//! [`PrintService::subscribe`] to events instead.
//!
//! ## Example
//!
//! ```no_run
//! use peripage::printer::ProfileId;
//! use peripage::service::{PrintService, PrintTask, ServiceConfig};
//! use peripage::transport::RfcommConnector;
//!
//! # async fn example() {
//! let service = PrintService::start(
//!     RfcommConnector::default(),
//!     "00:15:83:15:BC:5F",
//!     ProfileId::A6p,
//!     ServiceConfig::default(),
//! );
//!
//! service.enqueue(PrintTask::ascii("Hello"), true);
//! service.stop().await;
//! # }
//! ```

mod config;
mod status;
mod task;

pub use config::ServiceConfig;
pub use status::{ServiceEvent, ServiceState, ServiceStatus};
pub use task::{PrintTask, TaskId, TaskKind};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

use crate::error::{PeripageError, Result};
use crate::printer::{DeviceSession, PrinterProfile};
use crate::transport::Connector;

/// Buffered events per subscriber before old ones are dropped.
const EVENT_CAPACITY: usize = 256;

struct Queued {
    id: TaskId,
    task: PrintTask,
    flush: bool,
}

/// Status and event fan-out, shared by the handle and the worker.
#[derive(Clone)]
struct Reporter {
    status: Arc<watch::Sender<ServiceStatus>>,
    events: broadcast::Sender<ServiceEvent>,
}

impl Reporter {
    fn update(&self, f: impl FnOnce(&mut ServiceStatus)) {
        self.status.send_modify(f);
    }

    fn emit(&self, event: ServiceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ServiceState) {
        let mut changed = false;
        self.status.send_modify(|status| {
            changed = status.state != state;
            status.state = state;
        });
        if changed {
            tracing::debug!(%state, "Print service state");
            self.emit(ServiceEvent::StateChanged { state });
        }
    }

    fn discard(&self, id: TaskId) {
        tracing::info!(task = %id, "Task discarded");
        self.update(|status| status.discarded += 1);
        self.emit(ServiceEvent::TaskDiscarded { id });
    }
}

/// # Print Service
///
/// Handle to the background worker. Must be created inside a tokio runtime.
pub struct PrintService {
    queue: mpsc::UnboundedSender<Queued>,
    reporter: Reporter,
    stop: watch::Sender<bool>,
    stopping: AtomicBool,
    next_id: AtomicU64,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    config: ServiceConfig,
}

impl PrintService {
    /// Spawn the worker for the printer at `address` and start connecting.
    pub fn start<C>(
        connector: C,
        address: impl Into<String>,
        profile: impl Into<PrinterProfile>,
        config: ServiceConfig,
    ) -> Self
    where
        C: Connector + 'static,
        C::Channel: 'static,
    {
        Self::with_session(DeviceSession::new(connector, address, profile), config)
    }

    /// Spawn the worker around an existing (usually disconnected) session.
    pub fn with_session<C>(session: DeviceSession<C>, config: ServiceConfig) -> Self
    where
        C: Connector + 'static,
        C::Channel: 'static,
    {
        let (queue, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ServiceStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stop, stop_rx) = watch::channel(false);

        let reporter = Reporter {
            status: Arc::new(status),
            events,
        };

        tracing::info!(
            address = session.address(),
            profile = %session.profile().id,
            "Starting print service"
        );

        let worker = Worker {
            session: Arc::new(Mutex::new(session)),
            config,
            rx,
            stop: stop_rx,
            reporter: reporter.clone(),
            pending: None,
            last_task: None,
            last_ping: Instant::now(),
        };

        Self {
            queue,
            reporter,
            stop,
            stopping: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            worker: tokio::sync::Mutex::new(Some(tokio::spawn(worker.run()))),
            config,
        }
    }

    /// Queue a task; never blocks. With `flush`, the line buffer is flushed
    /// right after the task's content, in the same dispatch.
    ///
    /// After [`stop`](Self::stop) the task is reported discarded at once.
    pub fn enqueue(&self, task: PrintTask, flush: bool) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        if self.stopping.load(Ordering::Acquire) {
            self.reporter.discard(id);
            return id;
        }

        tracing::debug!(task = %id, kind = task.kind.name(), flush, "Task queued");
        self.reporter.update(|status| status.queued += 1);
        if self.queue.send(Queued { id, task, flush }).is_err() {
            self.reporter
                .update(|status| status.queued = status.queued.saturating_sub(1));
            self.reporter.discard(id);
        }
        id
    }

    pub fn status(&self) -> ServiceStatus {
        self.reporter.status.borrow().clone()
    }

    /// Receiver that sees every status change.
    pub fn watch_status(&self) -> watch::Receiver<ServiceStatus> {
        self.reporter.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.reporter.events.subscribe()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Stop dispatching, let an in-flight exchange finish, discard what is
    /// still queued and disconnect. Returns once the worker has exited.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        // Errs only when the worker is already gone
        let _ = self.stop.send(true);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Print service worker panicked");
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

enum Wake {
    Stop,
    Task,
    Ping,
    Queued(Queued),
}

struct Worker<C: Connector> {
    session: Arc<Mutex<DeviceSession<C>>>,
    config: ServiceConfig,
    rx: mpsc::UnboundedReceiver<Queued>,
    stop: watch::Receiver<bool>,
    reporter: Reporter,
    /// Next task, taken off the queue but not yet due
    pending: Option<Queued>,
    last_task: Option<Instant>,
    last_ping: Instant,
}

impl<C> Worker<C>
where
    C: Connector + 'static,
    C::Channel: 'static,
{
    async fn run(mut self) {
        if self.connect(true).await {
            loop {
                if self.stopped() {
                    break;
                }

                let next_ping = self.last_ping + self.config.ping_interval();
                let next_task = self
                    .last_task
                    .map(|at| at + self.config.task_interval())
                    .unwrap_or_else(Instant::now);
                let has_pending = self.pending.is_some();

                let wake = tokio::select! {
                    biased;
                    _ = self.stop.changed() => Wake::Stop,
                    _ = sleep_until(next_task), if has_pending => Wake::Task,
                    _ = sleep_until(next_ping) => Wake::Ping,
                    queued = self.rx.recv(), if !has_pending => match queued {
                        Some(queued) => Wake::Queued(queued),
                        None => Wake::Stop,
                    },
                };

                let healthy = match wake {
                    Wake::Stop => break,
                    Wake::Queued(queued) => {
                        self.pending = Some(queued);
                        true
                    }
                    Wake::Task => match self.pending.take() {
                        Some(queued) => self.dispatch(queued).await,
                        None => true,
                    },
                    Wake::Ping => self.ping().await,
                };

                if !healthy && !self.connect(false).await {
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep unless stopped first. Returns `false` on stop.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.stopped() {
            return false;
        }
        tokio::select! {
            _ = sleep(duration) => !self.stopped(),
            _ = self.stop.changed() => false,
        }
    }

    /// Run one blocking session operation and mirror the link state.
    async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DeviceSession<C>) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let joined = tokio::task::spawn_blocking(move || {
            let mut session = session.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let result = f(&mut session);
            (result, session.is_connected())
        })
        .await;

        match joined {
            Ok((result, connected)) => {
                self.reporter.update(|status| status.connected = connected);
                result
            }
            Err(e) => Err(PeripageError::Transport(format!(
                "Session operation aborted: {}",
                e
            ))),
        }
    }

    /// (Re)connect until it works or the service stops. Returns `false` on stop.
    async fn connect(&mut self, initial: bool) -> bool {
        let mut wait = !initial;
        loop {
            if self.stopped() {
                return false;
            }
            self.reporter.set_state(ServiceState::Reconnecting);

            if wait && !self.pause(self.config.reconnect_wait()).await {
                return false;
            }

            let result = self
                .with_session(|session| {
                    session.reconnect()?;
                    session.reset()
                })
                .await;

            match result {
                Ok(()) => {
                    tracing::info!("Printer ready");
                    if !self.pause(self.config.post_connect_wait()).await {
                        return false;
                    }
                    self.last_ping = Instant::now();
                    self.reporter.set_state(ServiceState::Idle);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?self.config.reconnect_wait(), "Printer unreachable");
                    self.reporter
                        .update(|status| status.last_error = Some(e.to_string()));
                    wait = true;
                }
            }
        }
    }

    /// Run one task. Returns `false` when the link needs reconnecting.
    async fn dispatch(&mut self, queued: Queued) -> bool {
        let Queued { id, task, flush } = queued;

        self.reporter
            .update(|status| status.queued = status.queued.saturating_sub(1));
        self.reporter.set_state(ServiceState::Sending);
        tracing::info!(task = %id, kind = task.kind.name(), "Dispatching task");

        let result = self
            .with_session(move |session| task.execute(session, flush))
            .await;
        self.last_task = Some(Instant::now());

        match result {
            Ok(()) => {
                tracing::info!(task = %id, "Task completed");
                self.reporter.update(|status| status.completed += 1);
                self.reporter.emit(ServiceEvent::TaskCompleted { id });
                self.reporter.set_state(ServiceState::Idle);
                true
            }
            Err(e) => {
                tracing::warn!(task = %id, error = %e, "Task failed");
                let error = e.to_string();
                self.reporter.update(|status| {
                    status.failed += 1;
                    status.last_error = Some(error.clone());
                });
                self.reporter.emit(ServiceEvent::TaskFailed { id, error });

                if e.is_link_failure() {
                    false
                } else {
                    self.reporter.set_state(ServiceState::Idle);
                    true
                }
            }
        }
    }

    /// Liveness query. Returns `false` when the link needs reconnecting.
    async fn ping(&mut self) -> bool {
        self.reporter.set_state(ServiceState::Pinging);
        let result = self.with_session(|session| session.device_battery()).await;
        self.last_ping = Instant::now();

        match result {
            Ok(battery) => {
                tracing::debug!(battery, "Ping");
                self.reporter.update(|status| status.battery = Some(battery));
                self.reporter.emit(ServiceEvent::Pinged { battery });
                self.reporter.set_state(ServiceState::Idle);
                true
            }
            Err(e) if e.is_link_failure() => {
                tracing::warn!(error = %e, "Ping failed");
                self.reporter
                    .update(|status| status.last_error = Some(e.to_string()));
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ping answered with garbage");
                self.reporter.set_state(ServiceState::Idle);
                true
            }
        }
    }

    async fn shutdown(mut self) {
        self.rx.close();

        let mut discarded: Vec<TaskId> = self.pending.take().map(|q| q.id).into_iter().collect();
        while let Ok(queued) = self.rx.try_recv() {
            discarded.push(queued.id);
        }
        for id in discarded {
            self.reporter
                .update(|status| status.queued = status.queued.saturating_sub(1));
            self.reporter.discard(id);
        }

        let _ = self
            .with_session(|session| {
                session.disconnect();
                Ok(())
            })
            .await;

        self.reporter.set_state(ServiceState::Stopped);
        tracing::info!("Print service stopped");
    }
}
