//! Run controller - routes work to per-Run actors.
//!
//! The controller merges three trigger sources into dispatches:
//! - Store change feed (new Runs)
//! - Requeue timers
//! - Periodic resync of every non-terminal Run
//!
//! Each dispatch lands in the mailbox of the Run's actor. Mailboxes hold a
//! single pending pass, so a burst of triggers for one Run collapses into
//! at most one running and one pending pass. Requeue timers are kept to one
//! per Run, and resync leaves Runs with a pending timer alone, so a Run is
//! polled at its requeue delay however often it is resynced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use runrelay_reconcile::{Reconciler, RunKey};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::actors::{
    ActorError, ActorHandle, BackoffPolicy, Cause, PassContext, RunActor, RunMessage, Supervisor,
};
use crate::events::EventRecorder;
use crate::requeue::TimerRequeue;
use crate::store::{ChangeKind, RunStore};

/// Pending passes per Run beyond the one executing.
const RUN_MAILBOX_SIZE: usize = 1;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Maximum passes executing at once.
    pub max_concurrent_reconciles: usize,

    /// Deadline for a single pass.
    pub pass_deadline: Duration,

    /// Interval between full resyncs.
    pub resync_interval: Duration,

    /// Retry spacing for failed passes.
    pub backoff: BackoffPolicy,

    /// How long in-flight passes may run after shutdown is signaled.
    pub shutdown_grace: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 4,
            pass_deadline: Duration::from_secs(90),
            resync_interval: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Dispatches reconciliation passes, one actor per Run.
pub struct RunController {
    ctx: Arc<PassContext>,
    supervisor: Supervisor<RunKey>,
    handles: HashMap<RunKey, ActorHandle<RunMessage>>,
    requeue: TimerRequeue,
    requeue_rx: mpsc::UnboundedReceiver<RunKey>,
    settings: ControllerSettings,
}

impl RunController {
    pub fn new(
        store: Arc<dyn RunStore>,
        reconciler: Reconciler,
        events: Arc<dyn EventRecorder>,
        settings: ControllerSettings,
    ) -> Self {
        let (requeue, requeue_rx) = TimerRequeue::new();
        let ctx = Arc::new(PassContext {
            store,
            reconciler: Arc::new(reconciler),
            requeue: Arc::new(requeue.clone()),
            events,
            workers: Arc::new(Semaphore::new(settings.max_concurrent_reconciles.max(1))),
            pass_deadline: settings.pass_deadline,
            backoff: settings.backoff.clone(),
        });

        Self {
            ctx,
            supervisor: Supervisor::new(),
            handles: HashMap::new(),
            requeue,
            requeue_rx,
            settings,
        }
    }

    /// Number of Runs with a live actor.
    pub fn active_count(&self) -> usize {
        self.supervisor.running_count()
    }

    /// Request a pass for `key`.
    ///
    /// Coalesces with a pass already pending for the same Run.
    pub fn dispatch(&mut self, key: RunKey, cause: Cause) {
        if let Some(handle) = self.handles.get(&key) {
            match handle.try_send(RunMessage::Reconcile { cause }) {
                Ok(()) => {
                    trace!(run = %key, cause = ?cause, "Dispatched");
                    return;
                }
                Err(ActorError::MailboxFull) => {
                    trace!(run = %key, cause = ?cause, "Coalesced with pending pass");
                    return;
                }
                Err(_) => {
                    // Actor stopped; a new one picks up from the stored state.
                    self.handles.remove(&key);
                }
            }
        }

        let actor = RunActor::new(key.clone(), self.ctx.clone());
        let handle = self.supervisor.spawn(key.clone(), actor, RUN_MAILBOX_SIZE);
        if let Err(e) = handle.try_send(RunMessage::Reconcile { cause }) {
            warn!(run = %key, error = %e, "Failed to dispatch to new actor");
            return;
        }
        debug!(
            run = %key,
            cause = ?cause,
            actor_id = handle.actor_id(),
            "Dispatched to new actor"
        );
        self.handles.insert(key, handle);
    }

    /// Dispatch every non-terminal Run without a pending requeue, and forget
    /// finished actors.
    async fn resync(&mut self) {
        for key in self.supervisor.reap() {
            self.handles.remove(&key);
        }

        let runs = match self.ctx.store.list().await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "Resync failed to list runs");
                return;
            }
        };

        let mut dispatched = 0usize;
        let mut waiting = 0usize;
        for run in runs.into_iter().filter(|r| !r.is_done()) {
            if self.requeue.is_pending(&run.key) {
                waiting += 1;
                continue;
            }
            self.dispatch(run.key, Cause::Resync);
            dispatched += 1;
        }
        debug!(
            dispatched,
            waiting,
            active = self.active_count(),
            "Resync complete"
        );
    }

    /// Run until `shutdown` flips to true, then stop all actors.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent_reconciles = self.settings.max_concurrent_reconciles,
            resync_interval_secs = self.settings.resync_interval.as_secs(),
            "Starting run controller"
        );

        // Subscribe before the initial listing so no creation is missed.
        let mut changes = self.ctx.store.subscribe();
        self.resync().await;

        let mut resync = tokio::time::interval(self.settings.resync_interval);
        // First tick completes immediately; the initial resync already ran.
        resync.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Run controller received shutdown signal");
                        break;
                    }
                }

                change = changes.recv() => match change {
                    Ok(event) if event.kind == ChangeKind::Created => {
                        self.dispatch(event.key, Cause::Created);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged, resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Change feed closed");
                        break;
                    }
                },

                Some(key) = self.requeue_rx.recv() => {
                    self.dispatch(key, Cause::Requeue);
                }

                _ = resync.tick() => {
                    self.resync().await;
                }
            }
        }

        self.supervisor.stop_all(self.settings.shutdown_grace).await;
        info!("Run controller stopped");
    }
}
