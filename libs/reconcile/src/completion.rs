//! Completion predicates.
//!
//! How a status response says "the job finished" depends on the job system.
//! The integration supplies a predicate; nothing here assumes a field name.

use crate::client::JobResponse;

/// Decides from a status response whether the job has finished.
pub trait CompletionPredicate: Send + Sync {
    fn is_complete(&self, response: &JobResponse) -> bool;
}

/// Never reports completion. Runs keep polling until stopped externally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverComplete;

impl CompletionPredicate for NeverComplete {
    fn is_complete(&self, _response: &JobResponse) -> bool {
        false
    }
}

/// Reports completion when a JSON pointer in a 2xx body holds one of the
/// accepted values.
///
/// String values are compared as-is; numbers and booleans by their JSON text.
#[derive(Debug, Clone)]
pub struct JsonFieldMatches {
    pointer: String,
    accepted: Vec<String>,
}

impl JsonFieldMatches {
    /// `pointer` uses RFC 6901 syntax, e.g. `/result`.
    pub fn new(pointer: impl Into<String>, accepted: Vec<String>) -> Self {
        Self {
            pointer: pointer.into(),
            accepted,
        }
    }
}

impl CompletionPredicate for JsonFieldMatches {
    fn is_complete(&self, response: &JobResponse) -> bool {
        if !(200..300).contains(&response.status) {
            return false;
        }
        let Ok(body) = serde_json::from_str::<serde_json::Value>(&response.body) else {
            return false;
        };
        let value = match body.pointer(&self.pointer) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => return false,
            Some(other) => other.to_string(),
        };
        self.accepted.iter().any(|a| *a == value)
    }
}

impl<F> CompletionPredicate for F
where
    F: Fn(&JobResponse) -> bool + Send + Sync,
{
    fn is_complete(&self, response: &JobResponse) -> bool {
        self(response)
    }
}
