//! Timer-backed requeue scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use runrelay_reconcile::{RequeueScheduler, RunKey};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Feeds Run keys back to the controller once their delay has elapsed.
///
/// At most one firing is pending per key. A schedule call for a key that
/// already has an earlier or equal deadline is absorbed; an earlier deadline
/// supersedes the pending one. Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TimerRequeue {
    tx: mpsc::UnboundedSender<RunKey>,
    pending: Arc<Mutex<HashMap<RunKey, Instant>>>,
}

impl TimerRequeue {
    /// Create a scheduler and the receiver its firings are delivered to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let requeue = Self {
            tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        (requeue, rx)
    }

    /// Returns true if a firing is pending for `key`.
    pub fn is_pending(&self, key: &RunKey) -> bool {
        self.pending().contains_key(key)
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RunKey, Instant>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RequeueScheduler for TimerRequeue {
    fn schedule(&self, key: &RunKey, delay: Duration) {
        let deadline = Instant::now() + delay;

        {
            let mut pending = self.pending();
            match pending.get(key) {
                Some(existing) if *existing <= deadline => {
                    trace!(run = %key, "Requeue already pending");
                    return;
                }
                _ => {
                    pending.insert(key.clone(), deadline);
                }
            }
        }

        let tx = self.tx.clone();
        let pending = self.pending.clone();
        let key = key.clone();

        trace!(run = %key, delay_ms = delay.as_millis() as u64, "Requeue scheduled");
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            {
                let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                if pending.get(&key) != Some(&deadline) {
                    // Superseded by an earlier deadline.
                    return;
                }
                pending.remove(&key);
            }

            if tx.send(key.clone()).is_err() {
                debug!(run = %key, "Requeue dropped, controller stopped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_no_earlier_than_delay() {
        let (scheduler, mut rx) = TimerRequeue::new();
        let key = RunKey::new("default", "r1").unwrap();
        let start = Instant::now();

        scheduler.schedule(&key, Duration::from_secs(5));
        assert!(scheduler.is_pending(&key));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, key);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!scheduler.is_pending(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_in_deadline_order() {
        let (scheduler, mut rx) = TimerRequeue::new();
        let slow = RunKey::new("default", "slow").unwrap();
        let fast = RunKey::new("default", "fast").unwrap();

        scheduler.schedule(&slow, Duration::from_secs(10));
        scheduler.schedule(&fast, Duration::from_secs(1));

        assert_eq!(rx.recv().await.unwrap(), fast);
        assert_eq!(rx.recv().await.unwrap(), slow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_duplicate_is_absorbed() {
        let (scheduler, mut rx) = TimerRequeue::new();
        let key = RunKey::new("default", "r1").unwrap();
        let start = Instant::now();

        scheduler.schedule(&key, Duration::from_secs(1));
        scheduler.schedule(&key, Duration::from_secs(2));
        scheduler.schedule(&key, Duration::from_secs(1));
        assert_eq!(scheduler.pending_count(), 1);

        assert_eq!(rx.recv().await.unwrap(), key);
        assert!(start.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_supersedes() {
        let (scheduler, mut rx) = TimerRequeue::new();
        let key = RunKey::new("default", "r1").unwrap();
        let start = Instant::now();

        scheduler.schedule(&key, Duration::from_secs(10));
        scheduler.schedule(&key, Duration::from_secs(1));

        assert_eq!(rx.recv().await.unwrap(), key);
        let fired_after = start.elapsed();
        assert!(fired_after >= Duration::from_secs(1));
        assert!(fired_after < Duration::from_secs(10));

        // The superseded timer never fires.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_firing() {
        let (scheduler, mut rx) = TimerRequeue::new();
        let key = RunKey::new("default", "r1").unwrap();

        scheduler.schedule(&key, Duration::from_secs(1));
        assert_eq!(rx.recv().await.unwrap(), key);

        scheduler.schedule(&key, Duration::from_secs(1));
        assert_eq!(rx.recv().await.unwrap(), key);
    }
}
