// Throttling guard for live-critical rundown operations

//! # Throttling Guard
//!
//! Operators double-press. Automation retries. A second take arriving a few
//! milliseconds after the first would skip a part on air, so the guarded
//! operations share one "last accepted" timestamp and anything arriving
//! within the interval is rejected with [`RundownError::Throttled`] without
//! reaching the wrapped service.
//!
//! Guarded: `take_next`, `take_next_if_on_air`, `activate_rundown`,
//! `deactivate_rundown`, `reset_rundown`, `enter_rehearsal`. Everything else
//! passes straight through.
//!
//! ## Rust Learning Notes:
//!
//! ### Decorator via trait objects
//! `ThrottledRundownService` implements the same [`RundownService`] trait it
//! wraps. Callers hold an `Arc<dyn RundownService>` and cannot tell whether
//! they got the guard or the engine, which keeps wiring decisions in `main`.
//!
//! ### Scope of the shared timestamp
//! With [`ThrottleScope::Global`] one take on rundown A blocks an immediate
//! activation of rundown B. [`ThrottleScope::PerRundown`] keeps a timestamp
//! per rundown id in a `DashMap`, the same way per-tenant buckets are kept.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use super::clock::Clock;
use super::rundown::RundownService;
use crate::models::{NextOwner, Part, PartId, PartTransition, Piece, PieceId, Rundown, RundownId, SegmentId, Timeline};
use crate::settings::ThrottleScope;
use crate::{Result, RundownError};

pub struct ThrottledRundownService {
    inner: Arc<dyn RundownService>,
    clock: Arc<dyn Clock>,
    interval: chrono::Duration,
    scope: ThrottleScope,
    last_global: Mutex<Option<DateTime<Utc>>>,
    last_per_rundown: DashMap<RundownId, DateTime<Utc>>,
}

impl ThrottledRundownService {
    pub fn new(inner: Arc<dyn RundownService>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            inner,
            clock,
            interval: chrono::Duration::milliseconds(interval.as_millis() as i64),
            scope: ThrottleScope::Global,
            last_global: Mutex::new(None),
            last_per_rundown: DashMap::new(),
        }
    }

    pub fn with_scope(mut self, scope: ThrottleScope) -> Self {
        self.scope = scope;
        self
    }

    /// Accept the call and record its time, or reject it
    fn check(&self, id: &RundownId, operation: &str) -> Result<()> {
        let now = self.clock.now();
        let too_soon = |last: DateTime<Utc>| now - last < self.interval;

        let rejected = match self.scope {
            ThrottleScope::Global => {
                let mut last = self.last_global.lock().unwrap_or_else(|e| e.into_inner());
                match *last {
                    Some(previous) if too_soon(previous) => true,
                    _ => {
                        *last = Some(now);
                        false
                    }
                }
            }
            ThrottleScope::PerRundown => match self.last_per_rundown.entry(id.clone()) {
                Entry::Occupied(entry) if too_soon(*entry.get()) => true,
                Entry::Occupied(mut entry) => {
                    entry.insert(now);
                    false
                }
                Entry::Vacant(entry) => {
                    entry.insert(now);
                    false
                }
            },
        };

        if rejected {
            warn!(rundown_id = %id, operation, "Ignoring event that came in too fast");
            return Err(RundownError::Throttled(format!(
                "{} on rundown {} within {} ms of the previous operation",
                operation,
                id,
                self.interval.num_milliseconds()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RundownService for ThrottledRundownService {
    async fn get_rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.inner.get_rundown(id).await
    }

    async fn activate_rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.check(id, "activate_rundown")?;
        self.inner.activate_rundown(id).await
    }

    async fn enter_rehearsal(&self, id: &RundownId) -> Result<Rundown> {
        self.check(id, "enter_rehearsal")?;
        self.inner.enter_rehearsal(id).await
    }

    async fn deactivate_rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.check(id, "deactivate_rundown")?;
        self.inner.deactivate_rundown(id).await
    }

    async fn reset_rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.check(id, "reset_rundown")?;
        self.inner.reset_rundown(id).await
    }

    async fn take_next(&self, id: &RundownId) -> Result<Rundown> {
        self.check(id, "take_next")?;
        self.inner.take_next(id).await
    }

    async fn take_next_if_on_air(
        &self,
        id: &RundownId,
        expected_active: &PartId,
    ) -> Result<Option<Rundown>> {
        self.check(id, "take_next")?;
        self.inner.take_next_if_on_air(id, expected_active).await
    }

    async fn set_next(
        &self,
        id: &RundownId,
        segment_id: &SegmentId,
        part_id: &PartId,
        owner: Option<NextOwner>,
    ) -> Result<Rundown> {
        self.inner.set_next(id, segment_id, part_id, owner).await
    }

    async fn insert_part_as_on_air(&self, id: &RundownId, part: Part) -> Result<Rundown> {
        self.inner.insert_part_as_on_air(id, part).await
    }

    async fn insert_part_as_next(&self, id: &RundownId, part: Part) -> Result<Rundown> {
        self.inner.insert_part_as_next(id, part).await
    }

    async fn insert_piece_as_on_air(
        &self,
        id: &RundownId,
        piece: Piece,
        layers_to_stop: &[String],
    ) -> Result<Rundown> {
        self.inner.insert_piece_as_on_air(id, piece, layers_to_stop).await
    }

    async fn insert_piece_as_next(
        &self,
        id: &RundownId,
        piece: Piece,
        in_transition: Option<PartTransition>,
    ) -> Result<Rundown> {
        self.inner.insert_piece_as_next(id, piece, in_transition).await
    }

    async fn replace_piece_on_air_on_next_part(
        &self,
        id: &RundownId,
        piece_to_replace: &PieceId,
        new_piece: Piece,
    ) -> Result<Rundown> {
        self.inner
            .replace_piece_on_air_on_next_part(id, piece_to_replace, new_piece)
            .await
    }

    async fn delete_rundown(&self, id: &RundownId) -> Result<()> {
        self.inner.delete_rundown(id).await
    }

    async fn apply_ingest_update(&self, rundown: Rundown) -> Result<Rundown> {
        self.inner.apply_ingest_update(rundown).await
    }

    async fn regenerate_timeline(&self, id: &RundownId) -> Result<Timeline> {
        self.inner.regenerate_timeline(id).await
    }
}
