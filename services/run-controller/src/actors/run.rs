//! Run actor - the single writer for one Run identity.
//!
//! The RunActor:
//! - Executes reconciliation passes for one Run, one at a time
//! - Reads the Run fresh from the store on every pass (level-triggered)
//! - Applies at most one status write per pass, compare-and-swap on version
//! - Retries failed passes with backoff, never individual calls
//! - Stops once the Run is terminal or gone
//!
//! ## Pass
//!
//! ```text
//! acquire worker permit -> load run -> reconcile (deadline) -> CAS status
//!                                                         -> record event
//!                                                         -> deliver requeue
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runrelay_reconcile::{Reconciler, RequeueScheduler, RunKey};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::framework::{Actor, ActorContext, ActorError, BackoffPolicy};
use crate::events::EventRecorder;
use crate::store::{RunStore, StoreError};

// =============================================================================
// Messages
// =============================================================================

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// The Run was just created.
    Created,
    /// A requeue timer fired.
    Requeue,
    /// Periodic or startup resync.
    Resync,
}

/// Messages handled by RunActor.
#[derive(Debug)]
pub enum RunMessage {
    /// Run one reconciliation pass.
    Reconcile { cause: Cause },
}

// =============================================================================
// Pass errors
// =============================================================================

/// Failures that abort a pass before its result is applied.
#[derive(Debug, Error)]
pub enum PassError {
    /// Reading or writing the Run failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The pass did not finish in time; nothing was applied.
    #[error("pass exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The worker pool has been shut down.
    #[error("worker pool closed")]
    PoolClosed,
}

impl PassError {
    /// Returns true if the pass should be run again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::DeadlineExceeded(_) => true,
            Self::PoolClosed => false,
        }
    }
}

/// Whether the actor has more work for its Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Continue,
    Finished,
}

// =============================================================================
// Shared dependencies
// =============================================================================

/// Collaborators shared by all Run actors.
pub struct PassContext {
    pub store: Arc<dyn RunStore>,
    pub reconciler: Arc<Reconciler>,
    pub requeue: Arc<dyn RequeueScheduler>,
    pub events: Arc<dyn EventRecorder>,

    /// Bounds passes executing concurrently across all actors.
    pub workers: Arc<Semaphore>,

    pub pass_deadline: Duration,
    pub backoff: BackoffPolicy,
}

// =============================================================================
// Run Actor
// =============================================================================

/// Actor owning reconciliation of a single Run.
pub struct RunActor {
    key: RunKey,
    ctx: Arc<PassContext>,

    /// Consecutive retryable failures, for backoff.
    failures: u32,
}

impl RunActor {
    pub fn new(key: RunKey, ctx: Arc<PassContext>) -> Self {
        Self {
            key,
            ctx,
            failures: 0,
        }
    }

    /// Execute one pass.
    pub async fn run_pass(&self) -> Result<PassStatus, PassError> {
        let _permit = self
            .ctx
            .workers
            .acquire()
            .await
            .map_err(|_| PassError::PoolClosed)?;

        let Some(run) = self.ctx.store.get(&self.key).await? else {
            debug!(run = %self.key, "Run no longer exists");
            return Ok(PassStatus::Finished);
        };

        let outcome = tokio::time::timeout(
            self.ctx.pass_deadline,
            self.ctx.reconciler.reconcile(&run),
        )
        .await
        .map_err(|_| PassError::DeadlineExceeded(self.ctx.pass_deadline))?;

        let mut done = run.is_done();

        if let Some(update) = &outcome.update {
            let status = update.apply(&run.status);
            let state = status.condition.state;
            done = state.is_terminal() || status.completion_time.is_some();

            match self
                .ctx
                .store
                .update_status(&self.key, run.resource_version, status)
                .await
            {
                Ok(updated) => {
                    info!(
                        run = %self.key,
                        state = ?state,
                        reason = %updated.status.condition.reason,
                        resource_version = updated.resource_version,
                        "Run status updated"
                    );
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(run = %self.key, "Run deleted during pass");
                    return Ok(PassStatus::Finished);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(event) = &outcome.event {
            self.ctx.events.record(&self.key, event);
        }

        if let Some(requeue) = &outcome.requeue {
            requeue.deliver(self.ctx.requeue.as_ref());
        }

        Ok(if done {
            PassStatus::Finished
        } else {
            PassStatus::Continue
        })
    }

    async fn handle_reconcile(&mut self, cause: Cause) -> Result<bool, ActorError> {
        debug!(run = %self.key, cause = ?cause, "Starting pass");

        match self.run_pass().await {
            Ok(PassStatus::Continue) => {
                self.failures = 0;
                Ok(true)
            }
            Ok(PassStatus::Finished) => {
                debug!(run = %self.key, "Run finished, stopping actor");
                Ok(false)
            }
            Err(e) if e.is_retryable() => {
                let delay = self.ctx.backoff.delay(self.failures);
                self.failures = self.failures.saturating_add(1);
                warn!(
                    run = %self.key,
                    error = %e,
                    attempt = self.failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Pass failed, will retry"
                );
                self.ctx.requeue.schedule(&self.key, delay);
                Ok(true)
            }
            Err(e) => Err(ActorError::Permanent(e.to_string())),
        }
    }
}

#[async_trait]
impl Actor for RunActor {
    type Message = RunMessage;

    fn name(&self) -> &str {
        "run"
    }

    async fn handle(
        &mut self,
        msg: RunMessage,
        _ctx: &mut ActorContext,
    ) -> Result<bool, ActorError> {
        match msg {
            RunMessage::Reconcile { cause } => self.handle_reconcile(cause).await,
        }
    }
}
