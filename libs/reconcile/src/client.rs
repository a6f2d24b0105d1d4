//! External job client interface.
//!
//! The state machine issues at most one trigger and one status query per
//! pass. Both calls are awaited in place; any error is terminal for the Run,
//! so implementations must not retry internally.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Response to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResponse {
    /// HTTP status code.
    pub status: u16,

    /// Raw response body.
    pub body: String,
}

impl JobResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Transport-level failures talking to the job system.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobClientError {
    /// The request could not be sent or no response arrived.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// A response arrived but its body could not be read.
    #[error("reading response from {url} failed: {message}")]
    Body { url: String, message: String },
}

/// Client for the external job system.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Trigger the job at `url` (POST `{url}/build`). Returns the raw body.
    async fn trigger(&self, url: &str) -> Result<String, JobClientError>;

    /// Query job status at `url` (GET `{url}`).
    async fn query_status(&self, url: &str) -> Result<JobResponse, JobClientError>;
}

/// Calls observed by [`ScriptedJobClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCall {
    Trigger(String),
    Query(String),
}

/// In-memory job client that replays scripted replies and records calls.
///
/// When a script runs dry the client answers triggers with `"queued"` and
/// queries with `200 {}`.
#[derive(Debug, Default)]
pub struct ScriptedJobClient {
    triggers: Mutex<VecDeque<Result<String, JobClientError>>>,
    queries: Mutex<VecDeque<Result<JobResponse, JobClientError>>>,
    calls: Mutex<Vec<JobCall>>,
}

impl ScriptedJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next trigger call.
    pub fn push_trigger(&self, reply: Result<String, JobClientError>) -> &Self {
        lock(&self.triggers).push_back(reply);
        self
    }

    /// Queue a reply for the next status query.
    pub fn push_query(&self, reply: Result<JobResponse, JobClientError>) -> &Self {
        lock(&self.queries).push_back(reply);
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<JobCall> {
        lock(&self.calls).clone()
    }

    pub fn trigger_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, JobCall::Trigger(_)))
            .count()
    }

    pub fn query_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, JobCall::Query(_)))
            .count()
    }
}

#[async_trait]
impl JobClient for ScriptedJobClient {
    async fn trigger(&self, url: &str) -> Result<String, JobClientError> {
        lock(&self.calls).push(JobCall::Trigger(format!("{url}/build")));
        lock(&self.triggers)
            .pop_front()
            .unwrap_or_else(|| Ok("queued".to_string()))
    }

    async fn query_status(&self, url: &str) -> Result<JobResponse, JobClientError> {
        lock(&self.calls).push(JobCall::Query(url.to_string()));
        lock(&self.queries)
            .pop_front()
            .unwrap_or_else(|| Ok(JobResponse::new(200, "{}")))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
