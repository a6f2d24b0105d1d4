//! Core actor framework types and traits.
//!
//! Provides the building blocks for per-Run serialization:
//! - `Actor` trait for defining actor behavior
//! - `Supervisor` for tracking keyed actor lifecycles
//! - `ActorHandle` for sending messages to actors
//! - `BackoffPolicy` for spacing out retries

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for an actor.
///
/// Actors:
/// - Process messages one at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Communicate only via message passing
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message.
    ///
    /// Returns `Ok(true)` to continue, `Ok(false)` to stop, or `Err` on failure.
    async fn handle(&mut self, msg: Self::Message, ctx: &mut ActorContext) -> Result<bool, ActorError>;

    /// Called when the actor starts.
    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called when the actor is about to stop.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}
}

/// Context provided to actors during message handling.
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Shutdown signal receiver.
    pub shutdown: watch::Receiver<bool>,

    /// Messages handled so far.
    pub messages_processed: u64,

    /// When the last message arrived.
    pub last_message_at: Option<Instant>,

    /// Current actor state.
    pub state: ActorState,
}

impl ActorContext {
    /// Create a new actor context.
    pub fn new(actor_id: String, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actor_id,
            shutdown,
            messages_processed: 0,
            last_message_at: None,
            state: ActorState::Starting,
        }
    }

    /// Check if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in actors.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Transient error; the actor keeps running.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permanent error; the actor stops.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Actor mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// Actor has stopped.
    #[error("actor stopped")]
    ActorStopped,
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Send a message to the actor, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }

    /// Returns true once the actor has dropped its mailbox.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Get the actor ID.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

/// Type-erased actor reference for supervision.
pub struct ActorRef {
    pub actor_id: String,
    task_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if the actor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Abort the actor task immediately.
    pub fn abort(&self) {
        self.task_handle.abort();
    }
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Tracks one actor per key.
pub struct Supervisor<K> {
    children: HashMap<K, ActorRef>,
}

impl<K> Default for Supervisor<K> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
        }
    }
}

impl<K> Supervisor<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and supervise an actor for `key`, replacing any finished one.
    pub fn spawn<A>(&mut self, key: K, actor: A, mailbox_size: usize) -> ActorHandle<A::Message>
    where
        A: Actor,
    {
        let actor_id = format!("{}_{}", actor.name(), generate_actor_id());
        let (tx, rx) = mpsc::channel(mailbox_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loop_id = actor_id.clone();
        let task_handle = tokio::spawn(async move {
            run_actor_loop(actor, rx, shutdown_rx, loop_id).await;
        });

        debug!(actor_id = %actor_id, key = %key, "Spawned actor");

        if let Some(previous) = self.children.insert(
            key,
            ActorRef {
                actor_id: actor_id.clone(),
                task_handle,
                shutdown_tx,
            },
        ) {
            previous.stop();
        }

        ActorHandle { tx, actor_id }
    }

    /// Remove actors whose task has finished. Returns their keys.
    pub fn reap(&mut self) -> Vec<K> {
        let finished: Vec<K> = self
            .children
            .iter()
            .filter(|(_, child)| !child.is_running())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &finished {
            self.children.remove(key);
        }
        finished
    }

    /// Stop all supervised actors, aborting those that do not exit in time.
    pub async fn stop_all(&mut self, grace: Duration) {
        info!(count = self.children.len(), "Stopping all actors");

        for child in self.children.values() {
            child.stop();
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.children.values().all(|c| !c.is_running()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        for (key, child) in &self.children {
            if child.is_running() {
                warn!(key = %key, actor_id = %child.actor_id, "Force aborting actor");
                child.abort();
            }
        }

        self.children.clear();
    }

    /// Get count of running actors.
    pub fn running_count(&self) -> usize {
        self.children.values().filter(|c| c.is_running()).count()
    }

    /// Get count of tracked actors, running or not.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

// =============================================================================
// Actor Loop
// =============================================================================

async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) {
    let mut ctx = ActorContext::new(actor_id.clone(), shutdown.clone());

    if let Err(e) = actor.on_start(&mut ctx).await {
        error!(actor_id = %actor_id, error = %e, "Actor failed to start");
        return;
    }

    ctx.state = ActorState::Running;
    debug!(actor_id = %actor_id, "Actor started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!(actor_id = %actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %actor_id, "Actor mailbox closed");
                    break;
                };

                ctx.messages_processed += 1;
                ctx.last_message_at = Some(Instant::now());

                match actor.handle(msg, &mut ctx).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(actor_id = %actor_id, "Actor requested stop");
                        break;
                    }
                    Err(e) => {
                        error!(actor_id = %actor_id, error = %e, "Actor error");
                        if matches!(e, ActorError::Permanent(_)) {
                            ctx.state = ActorState::Failed;
                            break;
                        }
                    }
                }
            }
        }
    }

    // Refuse further messages before cleanup so senders see the actor as gone.
    rx.close();

    if ctx.state != ActorState::Failed {
        ctx.state = ActorState::Stopping;
    }
    actor.on_stop(&mut ctx).await;
    if ctx.state != ActorState::Failed {
        ctx.state = ActorState::Stopped;
    }

    debug!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        state = ?ctx.state,
        "Actor stopped"
    );
}

// =============================================================================
// Helpers
// =============================================================================

static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_actor_id() -> u64 {
    ACTOR_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================
