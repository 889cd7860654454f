// Callback scheduler for wall-clock timed effects

//! # Callback Scheduler
//!
//! Fires a callback at an absolute wall-clock time. A single long sleep can
//! drift (timer coalescing, a suspended laptop in a rehearsal room), so the
//! scheduler sleeps half of the remaining time, re-reads the clock, and
//! repeats until the target is within a couple of milliseconds.
//!
//! Targets already in the past are skipped and logged, never fired late.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::Clock;

const DEFAULT_THRESHOLD: Duration = Duration::from_millis(2);

#[derive(Clone)]
pub struct CallbackScheduler {
    clock: Arc<dyn Clock>,
    threshold: Duration,
}

impl CallbackScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Run `callback` at `target`; `None` when the target has already passed
    pub fn schedule_at<F, Fut>(&self, target: DateTime<Utc>, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let now = self.clock.now();
        if target <= now {
            warn!(
                target = %target,
                late_ms = (now - target).num_milliseconds(),
                "Scheduled time already passed, callback skipped"
            );
            return None;
        }

        let clock = self.clock.clone();
        let threshold = self.threshold;
        debug!(target = %target, "Callback scheduled");

        Some(tokio::spawn(async move {
            loop {
                let remaining = (target - clock.now()).to_std().unwrap_or(Duration::ZERO);
                if remaining <= threshold {
                    if !remaining.is_zero() {
                        tokio::time::sleep(remaining).await;
                    }
                    break;
                }
                tokio::time::sleep(remaining / 2).await;
            }
            callback().await;
        }))
    }
}
