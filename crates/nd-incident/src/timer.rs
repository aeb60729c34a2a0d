//! The incident's single deferred re-evaluation timer (spec §4.G "Timer
//! re-arming"): firing synthesizes an `internal` event that re-enters the
//! ingest pipeline. Re-arming replaces whatever timer was previously
//! scheduled, matching the one-timer-per-incident invariant.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;

pub struct IncidentTimer {
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl IncidentTimer {
    pub fn new() -> Self {
        Self { handle: Mutex::new(None) }
    }

    /// Cancels any previously armed timer and schedules `on_fire` to run at
    /// `at`. A target in the past fires immediately.
    pub fn arm<F, Fut>(&self, at: DateTime<Utc>, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        });
        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.handle.lock().take() {
            previous.abort();
        }
    }
}

impl Default for IncidentTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// The earliest of every candidate re-evaluation time (matched rules' time
/// period transitions, plus escalation-entry age hints), or `None` if
/// nothing is pending (spec §4.G: "the minimum of (a) ... and (b) ...
/// yields a single per-incident next re-evaluation at timestamp").
pub fn earliest(candidates: impl IntoIterator<Item = Option<DateTime<Utc>>>) -> Option<DateTime<Utc>> {
    candidates.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn at(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn earliest_picks_the_minimum_and_ignores_none() {
        assert_eq!(earliest([Some(at(30)), None, Some(at(10))]), Some(at(10)));
        assert_eq!(earliest([None, None]), None);
    }

    #[tokio::test]
    async fn arming_replaces_a_pending_timer() {
        let timer = IncidentTimer::new();
        let fired_first = Arc::new(AtomicBool::new(false));
        let fired_second = Arc::new(AtomicBool::new(false));

        let f1 = fired_first.clone();
        timer.arm(Utc::now() + chrono::Duration::seconds(60), move || {
            let f1 = f1.clone();
            async move {
                f1.store(true, Ordering::SeqCst);
            }
        });

        let f2 = fired_second.clone();
        timer.arm(Utc::now() + chrono::Duration::milliseconds(5), move || {
            let f2 = f2.clone();
            async move {
                f2.store(true, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!fired_first.load(Ordering::SeqCst));
        assert!(fired_second.load(Ordering::SeqCst));
    }
}
