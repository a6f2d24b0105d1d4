//! Actor framework for the run controller.
//!
//! ## Design Principles
//!
//! - **One actor per Run**: each actor is the only writer for its Run, so at
//!   most one pass per identity is ever in flight
//! - **Message coalescing**: mailboxes hold a single pending pass; further
//!   requests while one is pending are absorbed, since the pass reads the
//!   latest state anyway
//! - **Bounded work**: a shared semaphore limits concurrent passes across
//!   all actors
//! - **Short-lived**: actors stop once their Run is terminal
//!
//! ## Actor Types
//!
//! - `RunActor`: reconciles a single Run

mod framework;
mod run;

pub use framework::{
    Actor, ActorContext, ActorError, ActorHandle, ActorRef, ActorState, BackoffPolicy, Message,
    Supervisor,
};
pub use run::{Cause, PassContext, PassError, PassStatus, RunActor, RunMessage};
