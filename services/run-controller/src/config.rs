//! Configuration for the run controller.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use runrelay_reconcile::{
    CompletionPredicate, JobReference, JsonFieldMatches, NeverComplete, RequeuePolicy,
};

use crate::controller::ControllerSettings;

/// Headroom a pass needs beyond its two job system calls.
const PASS_DEADLINE_MARGIN: Duration = Duration::from_secs(5);

/// Run controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API listen address.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Upper bound on passes executing at the same time.
    pub max_concurrent_reconciles: usize,

    /// Expected job latency; the first re-check happens this long after start.
    pub job_timeout: Duration,

    /// Re-check interval once `job_timeout` has passed.
    pub poll_interval: Duration,

    /// Per-request timeout for calls to the job system.
    pub http_timeout: Duration,

    /// Deadline for a whole pass. Passes exceeding it are discarded.
    ///
    /// Must cover a trigger and a status query at `http_timeout` each, plus
    /// `PASS_DEADLINE_MARGIN`.
    pub pass_deadline: Duration,

    /// Interval between full resyncs of all Runs.
    pub resync_interval: Duration,

    /// The job type Runs must reference.
    pub job_reference: JobReference,

    /// JSON pointer into the status body that signals completion.
    pub completion_pointer: Option<String>,

    /// Values at `completion_pointer` that mean the job finished.
    pub completion_values: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            max_concurrent_reconciles: 4,
            job_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(5000),
            http_timeout: Duration::from_secs(30),
            pass_deadline: Duration::from_secs(90),
            resync_interval: Duration::from_secs(300),
            job_reference: JobReference::default(),
            completion_pointer: None,
            completion_values: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = parse_or(&lookup, "RUNRELAY_LISTEN_ADDR", defaults.listen_addr)?;
        let log_level = lookup("RUNRELAY_LOG_LEVEL").unwrap_or(defaults.log_level);

        let max_concurrent_reconciles = parse_or(
            &lookup,
            "RUNRELAY_MAX_CONCURRENT_RECONCILES",
            defaults.max_concurrent_reconciles,
        )?;
        if max_concurrent_reconciles == 0 {
            anyhow::bail!("RUNRELAY_MAX_CONCURRENT_RECONCILES must be at least 1");
        }

        let job_timeout = Duration::from_millis(parse_or(
            &lookup,
            "RUNRELAY_JOB_TIMEOUT_MS",
            defaults.job_timeout.as_millis() as u64,
        )?);
        let poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "RUNRELAY_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?);
        if poll_interval.is_zero() {
            anyhow::bail!("RUNRELAY_POLL_INTERVAL_MS must be greater than zero");
        }

        let http_timeout = Duration::from_secs(parse_or(
            &lookup,
            "RUNRELAY_HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        )?);
        let pass_deadline = Duration::from_secs(parse_or(
            &lookup,
            "RUNRELAY_PASS_DEADLINE_SECS",
            defaults.pass_deadline.as_secs(),
        )?);
        let resync_interval = Duration::from_secs(parse_or(
            &lookup,
            "RUNRELAY_RESYNC_INTERVAL_SECS",
            defaults.resync_interval.as_secs(),
        )?);
        if pass_deadline.is_zero() || resync_interval.is_zero() {
            anyhow::bail!(
                "RUNRELAY_PASS_DEADLINE_SECS and RUNRELAY_RESYNC_INTERVAL_SECS must be greater than zero"
            );
        }
        // A pass cut off after the trigger but before its status write would
        // trigger the job again on the next pass.
        let min_deadline = http_timeout * 2 + PASS_DEADLINE_MARGIN;
        if pass_deadline < min_deadline {
            anyhow::bail!(
                "RUNRELAY_PASS_DEADLINE_SECS ({}) must be at least {}s (twice RUNRELAY_HTTP_TIMEOUT_SECS plus {}s)",
                pass_deadline.as_secs(),
                min_deadline.as_secs(),
                PASS_DEADLINE_MARGIN.as_secs()
            );
        }

        let job_reference = JobReference {
            api_version: lookup("RUNRELAY_JOB_API_VERSION")
                .unwrap_or(defaults.job_reference.api_version),
            kind: lookup("RUNRELAY_JOB_KIND").unwrap_or(defaults.job_reference.kind),
        };

        let completion_pointer = lookup("RUNRELAY_COMPLETION_POINTER").filter(|p| !p.is_empty());
        let completion_values: Vec<String> = lookup("RUNRELAY_COMPLETION_VALUES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if completion_pointer.is_some() && completion_values.is_empty() {
            anyhow::bail!("RUNRELAY_COMPLETION_VALUES is required with RUNRELAY_COMPLETION_POINTER");
        }

        Ok(Self {
            listen_addr,
            log_level,
            max_concurrent_reconciles,
            job_timeout,
            poll_interval,
            http_timeout,
            pass_deadline,
            resync_interval,
            job_reference,
            completion_pointer,
            completion_values,
        })
    }

    /// Requeue policy derived from the timing settings.
    pub fn requeue_policy(&self) -> RequeuePolicy {
        RequeuePolicy {
            job_timeout: self.job_timeout,
            poll_interval: self.poll_interval,
        }
    }

    /// Completion predicate for status responses.
    ///
    /// Without a configured pointer no response counts as complete.
    pub fn completion_predicate(&self) -> Arc<dyn CompletionPredicate> {
        match &self.completion_pointer {
            Some(pointer) => Arc::new(JsonFieldMatches::new(
                pointer.clone(),
                self.completion_values.clone(),
            )),
            None => Arc::new(NeverComplete),
        }
    }

    /// Controller tuning derived from this configuration.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            pass_deadline: self.pass_deadline,
            resync_interval: self.resync_interval,
            ..ControllerSettings::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
