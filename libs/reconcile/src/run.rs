//! Run data model.
//!
//! A Run is created by an external caller and observed by the reconciler on
//! every pass. The reconciler never mutates a `Run` in place: it reads the
//! persisted snapshot and returns a [`StatusUpdate`] for the store to apply.

use chrono::{DateTime, Utc};
use runrelay_id::RunKey;
use serde::{Deserialize, Serialize};

/// A unit of externally delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Identity (`namespace/name`).
    pub key: RunKey,

    /// Store-assigned version for compare-and-swap status writes.
    #[serde(default)]
    pub resource_version: u64,

    /// Caller-supplied specification.
    pub spec: RunSpec,

    /// Mutable status projection.
    #[serde(default)]
    pub status: RunStatus,
}

impl Run {
    /// Create a new Run with an empty (Pending) status.
    pub fn new(key: RunKey, spec: RunSpec) -> Self {
        Self {
            key,
            resource_version: 0,
            spec,
            status: RunStatus::default(),
        }
    }

    /// Returns true once the Run has reached a terminal condition.
    pub fn is_done(&self) -> bool {
        self.status.condition.state.is_terminal() || self.status.completion_time.is_some()
    }
}

/// Caller-supplied part of a Run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    /// Which kind of external job this Run addresses.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<RunRef>,

    /// Ordered parameters.
    #[serde(default)]
    pub params: Vec<Param>,
}

impl RunSpec {
    /// Returns the first parameter with the given name.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Reference to the external job type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRef {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// A named parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle state reported by the condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// Not yet picked up.
    #[default]
    Pending,
    /// Job triggered, waiting for completion.
    Running,
    /// Job reported completion.
    Succeeded,
    /// Rejected or failed talking to the job system.
    Failed,
}

impl RunState {
    /// Returns true for Succeeded and Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Current condition of a Run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub state: RunState,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn running(reason: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::with_state(RunState::Running, reason, message, at)
    }

    pub fn succeeded(reason: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::with_state(RunState::Succeeded, reason, message, at)
    }

    pub fn failed(reason: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::with_state(RunState::Failed, reason, message, at)
    }

    fn with_state(
        state: RunState,
        reason: &str,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            state,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Some(at),
        }
    }
}

/// A named string output of a Run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub name: String,
    pub value: String,
}

/// Mutable status projection of a Run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// Set when triggering begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Set when the Run becomes terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub condition: Condition,

    /// Append-only outputs.
    #[serde(default)]
    pub results: Vec<RunResult>,
}

/// A status mutation produced by one reconciliation pass.
///
/// Fields left as `None` keep their current value. Results are only ever
/// appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub condition: Option<Condition>,
    pub append_results: Vec<RunResult>,
}

impl StatusUpdate {
    /// Returns true if applying this update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.completion_time.is_none()
            && self.condition.is_none()
            && self.append_results.is_empty()
    }

    /// Compute the status that results from applying this update.
    pub fn apply(&self, current: &RunStatus) -> RunStatus {
        let mut next = current.clone();
        if let Some(start) = self.start_time {
            next.start_time = Some(start);
        }
        if let Some(done) = self.completion_time {
            next.completion_time = Some(done);
        }
        if let Some(condition) = &self.condition {
            next.condition = condition.clone();
        }
        next.results.extend(self.append_results.iter().cloned());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = Run::new(RunKey::parse("default/r1").unwrap(), RunSpec::default());
        assert_eq!(run.status.condition.state, RunState::Pending);
        assert!(!run.is_done());
    }

    #[test]
    fn test_is_done() {
        let mut run = Run::new(RunKey::parse("default/r1").unwrap(), RunSpec::default());
        run.status.condition = Condition::failed("MissingURL", "url param was not passed", at(0));
        assert!(run.is_done());

        let mut run = Run::new(RunKey::parse("default/r2").unwrap(), RunSpec::default());
        run.status.completion_time = Some(at(1));
        assert!(run.is_done());
    }

    #[test]
    fn test_apply_appends_results() {
        let current = RunStatus {
            results: vec![RunResult {
                name: "job-status".into(),
                value: "queued".into(),
            }],
            ..Default::default()
        };
        let update = StatusUpdate {
            start_time: Some(at(5)),
            append_results: vec![RunResult {
                name: "extra".into(),
                value: "x".into(),
            }],
            ..Default::default()
        };

        let next = update.apply(&current);
        assert_eq!(next.start_time, Some(at(5)));
        assert_eq!(next.results.len(), 2);
        assert_eq!(next.results[0].value, "queued");
        assert_eq!(next.condition, current.condition);
    }

    #[test]
    fn test_empty_update_is_identity() {
        let current = RunStatus {
            start_time: Some(at(0)),
            ..Default::default()
        };
        let update = StatusUpdate::default();
        assert!(update.is_empty());
        assert_eq!(update.apply(&current), current);
    }

    #[test]
    fn test_json_shape() {
        let spec: RunSpec = serde_json::from_value(serde_json::json!({
            "ref": {"apiVersion": "jenkins.tekton.dev/v0", "kind": "JenkinsJob"},
            "params": [{"name": "url", "value": "http://svc"}]
        }))
        .unwrap();
        let reference = spec.reference.as_ref().unwrap();
        assert_eq!(reference.kind, "JenkinsJob");
        assert!(reference.name.is_empty());
        assert_eq!(spec.param("url").unwrap().value, "http://svc");
        assert!(spec.param("other").is_none());
    }
}
