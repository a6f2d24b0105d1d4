//! The reconciliation state machine.
//!
//! ## States
//!
//! ```text
//! NotStarted --trigger--> AwaitingResult --poll(complete)--> Terminal
//!     |                        |    ^
//!     |                        +----+ poll(not complete): requeue
//!     +--(invalid / POST error)--> Terminal <--(GET error)--+
//! ```
//!
//! The state is re-derived from the persisted status on every pass. A pass
//! never mutates its input; it returns a [`ReconcileOutcome`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::client::JobClient;
use crate::clock::Clock;
use crate::completion::CompletionPredicate;
use crate::requeue::{Requeue, RequeuePolicy};
use crate::run::{Condition, Run, RunResult, RunStatus, StatusUpdate};
use crate::validate::{validate, JobReference};

/// Reason set while waiting for the job.
pub const REASON_WAITING: &str = "Waiting";

/// Reason set when the trigger request fails.
pub const REASON_TRIGGER_FAILED: &str = "UnexpectedErrorPOST";

/// Reason set when the status query fails.
pub const REASON_POLL_FAILED: &str = "UnexpectedErrorGET";

/// Reason set when the job reports completion.
pub const REASON_COMPLETED: &str = "JenkinsJobCompleted";

/// Reason of the event emitted after a processed pass.
pub const EVENT_REASON_RECONCILED: &str = "RunReconciled";

/// Name of the result holding the trigger response body.
pub const JOB_STATUS_RESULT: &str = "job-status";

/// Lifecycle phase derived from a persisted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    AwaitingResult,
    Terminal,
}

impl Phase {
    pub fn of(status: &RunStatus) -> Self {
        if status.completion_time.is_some() || status.condition.state.is_terminal() {
            Self::Terminal
        } else if status.start_time.is_some() {
            Self::AwaitingResult
        } else {
            Self::NotStarted
        }
    }
}

/// Event severity. Failures are reported through the Run's condition, so
/// passes only ever emit normal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
}

/// An event to report to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Status mutation to apply, if anything changed.
    pub update: Option<StatusUpdate>,

    /// Follow-up pass to schedule.
    pub requeue: Option<Requeue>,

    /// Event to report.
    pub event: Option<RunEvent>,
}

impl ReconcileOutcome {
    /// An outcome that changes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true if the pass produced no mutation, requeue, or event.
    pub fn is_noop(&self) -> bool {
        self.update.is_none() && self.requeue.is_none() && self.event.is_none()
    }

    fn finish(update: StatusUpdate) -> Self {
        Self {
            update: Some(update),
            ..Self::default()
        }
    }
}

/// Drives a Run through trigger and poll against the external job system.
pub struct Reconciler {
    client: Arc<dyn JobClient>,
    completion: Arc<dyn CompletionPredicate>,
    clock: Arc<dyn Clock>,
    reference: JobReference,
    policy: RequeuePolicy,
}

impl Reconciler {
    /// Create a reconciler with the default job reference and requeue policy.
    pub fn new(
        client: Arc<dyn JobClient>,
        completion: Arc<dyn CompletionPredicate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            completion,
            clock,
            reference: JobReference::default(),
            policy: RequeuePolicy::default(),
        }
    }

    /// Accept Runs referencing a different job type.
    pub fn with_reference(mut self, reference: JobReference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_policy(mut self, policy: RequeuePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one pass against the given snapshot.
    pub async fn reconcile(&self, run: &Run) -> ReconcileOutcome {
        let phase = Phase::of(&run.status);
        info!(run = %run.key, phase = ?phase, "Reconciling run");

        if phase == Phase::Terminal {
            debug!(run = %run.key, "Run is finished, done reconciling");
            return ReconcileOutcome::none();
        }

        let now = self.clock.now();
        let url = match validate(run, &self.reference) {
            Ok(url) => url,
            Err(rejection) => {
                warn!(
                    run = %run.key,
                    reason = %rejection.reason,
                    message = %rejection.message,
                    "Rejecting run"
                );
                return ReconcileOutcome::finish(failed(
                    StatusUpdate::default(),
                    rejection.reason.code(),
                    rejection.message,
                    now,
                ));
            }
        };

        let mut update = StatusUpdate::default();
        let start = match run.status.start_time {
            Some(start) => start,
            None => {
                update.start_time = Some(now);
                info!(run = %run.key, url = %url, "Triggering job");

                match self.client.trigger(url).await {
                    Ok(body) => {
                        update.append_results.push(RunResult {
                            name: JOB_STATUS_RESULT.to_string(),
                            value: body,
                        });
                        update.condition = Some(Condition::running(
                            REASON_WAITING,
                            "waiting for job to complete",
                            now,
                        ));
                    }
                    Err(e) => {
                        warn!(run = %run.key, error = %e, "Job trigger failed");
                        return ReconcileOutcome::finish(failed(
                            update,
                            REASON_TRIGGER_FAILED,
                            format!("unexpected error: {e}"),
                            now,
                        ));
                    }
                }
                now
            }
        };

        let response = match self.client.query_status(url).await {
            Ok(response) => response,
            Err(e) => {
                warn!(run = %run.key, error = %e, "Job status query failed");
                return ReconcileOutcome::finish(failed(
                    update,
                    REASON_POLL_FAILED,
                    format!("found unexpected error: {e}"),
                    self.clock.now(),
                ));
            }
        };

        let now = self.clock.now();
        let mut outcome = ReconcileOutcome {
            event: Some(RunEvent {
                event_type: EventType::Normal,
                reason: EVENT_REASON_RECONCILED.to_string(),
                message: format!("Run reconciled: \"{}\"", run.key),
            }),
            ..ReconcileOutcome::default()
        };

        if self.completion.is_complete(&response) {
            info!(run = %run.key, status = response.status, "Job completed");
            update.completion_time = Some(now);
            update.condition = Some(Condition::succeeded(
                REASON_COMPLETED,
                "jenkins job has finished executing",
                now,
            ));
        } else {
            let after = self.policy.delay(start, now);
            debug!(
                run = %run.key,
                status = response.status,
                requeue_ms = after.as_millis() as u64,
                "Job still running"
            );
            outcome.requeue = Some(Requeue {
                key: run.key.clone(),
                after,
            });
        }

        if !update.is_empty() {
            outcome.update = Some(update);
        }
        outcome
    }
}

fn failed(
    mut update: StatusUpdate,
    reason: &str,
    message: String,
    now: DateTime<Utc>,
) -> StatusUpdate {
    update.completion_time = Some(now);
    update.condition = Some(Condition::failed(reason, message, now));
    update
}
