// Automatic takes for parts flagged autonext

//! # Auto-Next Driver
//!
//! Listens for [`EngineEvent::PartTaken`] events carrying an `auto_next_at`
//! deadline and schedules a `take_next` for that moment. The take goes
//! through whatever [`RundownService`] the driver was given, normally the
//! throttled one, so an automatic take and a manual one can't both land.
//!
//! When the deadline fires the driver asks for
//! [`RundownService::take_next_if_on_air`], so the "is the part still on
//! air" check and the take run under the same rundown lock. If an operator
//! took manually in the meantime the stale deadline is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{EngineEvent, EventBus};
use super::rundown::RundownService;
use super::scheduler::CallbackScheduler;
use crate::models::{PartId, RundownId};
use crate::RundownError;

pub struct AutoNextDriver {
    rundowns: Arc<dyn RundownService>,
    scheduler: CallbackScheduler,
}

impl AutoNextDriver {
    /// `rundowns` should be the throttled service so an automatic take counts
    /// against the same guard as an operator's
    pub fn new(rundowns: Arc<dyn RundownService>, scheduler: CallbackScheduler) -> Self {
        Self { rundowns, scheduler }
    }

    /// Follow the bus until it closes
    pub fn spawn(self: Arc<Self>, events: &EventBus) -> JoinHandle<()> {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let EngineEvent::PartTaken {
                            rundown_id,
                            part_id,
                            auto_next_at: Some(at),
                            ..
                        } = envelope.event
                        {
                            self.schedule_take(rundown_id, part_id, at);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auto-next driver lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Take `part_id` off air at `at`, if it is still on air then
    pub fn schedule_take(&self, rundown_id: RundownId, part_id: PartId, at: DateTime<Utc>) -> Option<JoinHandle<()>> {
        let rundowns = self.rundowns.clone();
        debug!(rundown_id = %rundown_id, part_id = %part_id, at = %at, "Auto-next scheduled");

        self.scheduler.schedule_at(at, move || async move {
            match rundowns.take_next_if_on_air(&rundown_id, &part_id).await {
                Ok(Some(rundown)) => info!(
                    rundown_id = %rundown_id,
                    part_id = ?rundown.active_part_id,
                    "Auto-next took part"
                ),
                Ok(None) => {
                    debug!(rundown_id = %rundown_id, part_id = %part_id, "Auto-next deadline is stale")
                }
                Err(RundownError::EndOfRundown(_)) => {
                    debug!(rundown_id = %rundown_id, "Auto-next reached end of rundown")
                }
                Err(e) => warn!(rundown_id = %rundown_id, error = %e, "Auto-next take failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::SystemClock;
    use crate::engine::storage::RundownStorage;
    use crate::engine::test_support::{harness, sample_rundown};
    use std::time::Duration;

    #[tokio::test]
    async fn test_autonext_part_is_followed_automatically() {
        let h = harness().await;
        let mut rundown = sample_rundown("R1");
        {
            let p1 = rundown.find_part_mut(&PartId::from("P1")).unwrap();
            p1.autonext = true;
            p1.expected_duration_ms = Some(30);
        }
        h.storage.save_rundown(rundown).await.unwrap();
        h.clock.set(Utc::now());

        let driver = Arc::new(AutoNextDriver::new(
            h.engine.clone(),
            CallbackScheduler::new(Arc::new(SystemClock)),
        ));
        let task = driver.spawn(&h.events);
        let mut rx = h.events.subscribe();

        let id = RundownId::from("R1");
        h.engine.activate_rundown(&id).await.unwrap();
        h.engine.take_next(&id).await.unwrap();

        let followed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(envelope) = rx.recv().await {
                    if let EngineEvent::PartTaken { part_id, .. } = envelope.event {
                        if part_id == PartId::from("P2") {
                            return;
                        }
                    }
                }
            }
        })
        .await;
        assert!(followed.is_ok());
        task.abort();
    }

    #[tokio::test]
    async fn test_stale_deadline_is_ignored() {
        let h = harness().await;
        let id = RundownId::from("R1");
        h.engine.activate_rundown(&id).await.unwrap();
        h.engine.take_next(&id).await.unwrap();
        h.engine.take_next(&id).await.unwrap();

        let driver = AutoNextDriver::new(h.engine.clone(), CallbackScheduler::new(Arc::new(SystemClock)));
        let handle = driver
            .schedule_take(id.clone(), PartId::from("P1"), Utc::now() + chrono::Duration::milliseconds(10))
            .unwrap();
        handle.await.unwrap();

        let rundown = h.engine.get_rundown(&id).await.unwrap();
        assert_eq!(rundown.active_part_id, Some(PartId::from("P2")));
    }
}
