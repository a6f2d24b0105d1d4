//! Reconciliation core for externally executed Runs.
//!
//! This library decides, one pass at a time, what to do with a Run whose
//! work is carried out by an external job system that can only be polled.
//! Key concepts:
//!
//! - **Run**: a request to drive an external job to completion.
//! - **Pass**: one invocation of the state machine against the Run's
//!   current persisted status.
//! - **Level-triggered**: every pass reads the full current state; it does
//!   not care which change caused it.
//! - **Requeue**: a follow-up pass scheduled without any external change.
//!
//! # Invariants
//!
//! - A pass against a terminal Run produces no mutation and no requeue
//! - Invalid Runs never reach the job system
//! - A Run is triggered at most once: `startTime` is recorded by the
//!   triggering pass whatever the trigger's outcome
//! - Trigger and status-query failures are terminal; only whole passes are
//!   retried, and only by the caller
//! - Results are append-only
//!
//! The core performs no locking. Callers must ensure at most one active pass
//! per Run identity.

pub mod client;
pub mod clock;
pub mod completion;
pub mod machine;
pub mod requeue;
pub mod run;
pub mod validate;

pub use client::{JobCall, JobClient, JobClientError, JobResponse, ScriptedJobClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{CompletionPredicate, JsonFieldMatches, NeverComplete};
pub use machine::{EventType, Phase, ReconcileOutcome, Reconciler, RunEvent};
pub use requeue::{Requeue, RequeuePolicy, RequeueScheduler};
pub use run::{
    Condition, Param, Run, RunRef, RunResult, RunSpec, RunState, RunStatus, StatusUpdate,
};
pub use runrelay_id::RunKey;
pub use validate::{validate, JobReference, RejectReason, Rejection};
