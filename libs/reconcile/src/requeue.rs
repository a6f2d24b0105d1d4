//! Requeue scheduling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use runrelay_id::RunKey;

/// Default upper bound on expected job latency.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5);

/// Default re-check interval once the job timeout window has passed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Schedules future reconciliation passes.
///
/// A call guarantees at least one later pass for `key` no earlier than
/// `delay` from now. Schedules may coalesce or fire independently; the
/// state machine absorbs duplicates.
pub trait RequeueScheduler: Send + Sync {
    fn schedule(&self, key: &RunKey, delay: Duration);
}

/// A requeue instruction produced by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requeue {
    pub key: RunKey,
    pub after: Duration,
}

impl Requeue {
    /// Hand this instruction to a scheduler.
    pub fn deliver(&self, scheduler: &dyn RequeueScheduler) {
        scheduler.schedule(&self.key, self.after);
    }
}

/// When to look at a Run that is still waiting for its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeuePolicy {
    /// Window after `startTime` within which the job is expected to finish.
    pub job_timeout: Duration,

    /// Interval between checks after the window has elapsed.
    pub poll_interval: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RequeuePolicy {
    /// Delay until the next pass.
    ///
    /// Inside the window this is `start + job_timeout - now`. Past it the Run
    /// is not failed; it is checked again every `poll_interval`.
    pub fn delay(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let deadline = chrono::Duration::from_std(self.job_timeout)
            .ok()
            .and_then(|timeout| start.checked_add_signed(timeout));

        match deadline.map(|d| d - now).and_then(|left| left.to_std().ok()) {
            Some(left) if !left.is_zero() => left,
            _ => self.poll_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_delay_inside_window() {
        let policy = RequeuePolicy::default();
        assert_eq!(policy.delay(t0(), t0()), Duration::from_secs(5));
        assert_eq!(
            policy.delay(t0(), t0() + chrono::Duration::seconds(2)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_delay_after_window_falls_back_to_poll_interval() {
        let policy = RequeuePolicy {
            job_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
        };
        assert_eq!(
            policy.delay(t0(), t0() + chrono::Duration::seconds(5)),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.delay(t0(), t0() + chrono::Duration::hours(1)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_deliver() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<(RunKey, Duration)>>);
        impl RequeueScheduler for Recorder {
            fn schedule(&self, key: &RunKey, delay: Duration) {
                self.0.lock().unwrap().push((key.clone(), delay));
            }
        }

        let recorder = Recorder::default();
        let key = RunKey::parse("default/r1").unwrap();
        Requeue {
            key: key.clone(),
            after: Duration::from_millis(250),
        }
        .deliver(&recorder);

        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[(key, Duration::from_millis(250))]
        );
    }
}
