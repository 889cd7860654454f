// Rundown service - the state-machine authority over show structure

//! # Rundown Service
//!
//! [`RundownEngine`] is the single writer of rundown, segment, part and piece
//! state. Lifecycle transitions, takes, and every structural insertion go
//! through it, and every call leaves the rundown satisfying its invariants.
//!
//! ## Lifecycle
//!
//! ```text
//!              activate                 deactivate
//!  [Inactive] ──────────► [Active] ────────────────► [Inactive]
//!      │                    ▲  │
//!      │ enter_rehearsal    │  │ enter_rehearsal
//!      ▼        activate    │  ▼
//!  [Rehearsal] ─────────────┘ [Rehearsal]
//! ```
//!
//! ## Serialization
//!
//! Each rundown id has its own async mutex. A call holds it across the whole
//! read-modify-write (including timeline generation), so two takes on one
//! rundown can never interleave. Different rundowns proceed independently.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::events::{EngineEvent, EventBus};
use super::storage::RundownStorage;
use super::timeline::TimelineBuilder;
use crate::models::{
    ActivationStatus, NextOwner, Part, PartId, PartTransition, Piece, PieceId, Rundown, RundownId,
    SegmentId, Timeline,
};
use crate::{Result, RundownError};

/// Lifecycle and mutation operations on rundowns
///
/// Every operation fails with [`RundownError::NotFound`] when the rundown id
/// is unknown.
#[async_trait::async_trait]
pub trait RundownService: Send + Sync {
    async fn get_rundown(&self, id: &RundownId) -> Result<Rundown>;

    /// Fails with `AlreadyActivated` when the rundown is already active
    async fn activate_rundown(&self, id: &RundownId) -> Result<Rundown>;

    async fn enter_rehearsal(&self, id: &RundownId) -> Result<Rundown>;

    async fn deactivate_rundown(&self, id: &RundownId) -> Result<Rundown>;

    /// Fails with `RundownIsActive` while the rundown is on air
    async fn reset_rundown(&self, id: &RundownId) -> Result<Rundown>;

    /// Promote next to active and compute a new next
    ///
    /// Fails with `NotActivated` or `EndOfRundown`.
    async fn take_next(&self, id: &RundownId) -> Result<Rundown>;

    /// Take only while `expected_active` is still the on-air part
    ///
    /// The check and the take happen under the same rundown lock. Returns
    /// `Ok(None)` without touching the rundown when something else already
    /// moved it on.
    async fn take_next_if_on_air(
        &self,
        id: &RundownId,
        expected_active: &PartId,
    ) -> Result<Option<Rundown>>;

    /// Point next at `part_id`, which must belong to `segment_id`
    ///
    /// The on-air part is accepted: taking it again restarts it.
    async fn set_next(
        &self,
        id: &RundownId,
        segment_id: &SegmentId,
        part_id: &PartId,
        owner: Option<NextOwner>,
    ) -> Result<Rundown>;

    async fn insert_part_as_on_air(&self, id: &RundownId, part: Part) -> Result<Rundown>;

    async fn insert_part_as_next(&self, id: &RundownId, part: Part) -> Result<Rundown>;

    async fn insert_piece_as_on_air(
        &self,
        id: &RundownId,
        piece: Piece,
        layers_to_stop: &[String],
    ) -> Result<Rundown>;

    async fn insert_piece_as_next(
        &self,
        id: &RundownId,
        piece: Piece,
        in_transition: Option<PartTransition>,
    ) -> Result<Rundown>;

    async fn replace_piece_on_air_on_next_part(
        &self,
        id: &RundownId,
        piece_to_replace: &PieceId,
        new_piece: Piece,
    ) -> Result<Rundown>;

    async fn delete_rundown(&self, id: &RundownId) -> Result<()>;

    /// Merge ingest-provided structure into the stored rundown
    async fn apply_ingest_update(&self, rundown: Rundown) -> Result<Rundown>;

    async fn regenerate_timeline(&self, id: &RundownId) -> Result<Timeline>;
}

/// Held for the duration of one rundown operation
///
/// On release the map entry is dropped only when nobody else holds or waits
/// on the same mutex. `remove_if` runs under the shard lock that `lock()`
/// clones under, so a waiter can never end up on a mutex that a newcomer
/// doesn't see.
struct RundownLock<'a> {
    locks: &'a DashMap<RundownId, Arc<Mutex<()>>>,
    id: RundownId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RundownLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// The rundown state machine backed by a [`RundownStorage`]
pub struct RundownEngine {
    storage: Arc<dyn RundownStorage>,
    timeline_builder: Arc<dyn TimelineBuilder>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    respect_operator_next: bool,
    locks: DashMap<RundownId, Arc<Mutex<()>>>,
}

impl RundownEngine {
    pub fn new(
        storage: Arc<dyn RundownStorage>,
        timeline_builder: Arc<dyn TimelineBuilder>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            timeline_builder,
            events,
            clock,
            respect_operator_next: true,
            locks: DashMap::new(),
        }
    }

    /// Whether an operator-set next survives automatic recalculation
    pub fn with_operator_next_policy(mut self, respect_operator_next: bool) -> Self {
        self.respect_operator_next = respect_operator_next;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn lock(&self, id: &RundownId) -> RundownLock<'_> {
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        RundownLock {
            locks: &self.locks,
            id: id.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.len()
    }

    async fn load(&self, id: &RundownId) -> Result<Rundown> {
        self.storage
            .get_rundown(id)
            .await?
            .ok_or_else(|| RundownError::NotFound(format!("Rundown {}", id)))
    }

    /// Validate, optionally regenerate the timeline, persist, announce
    async fn commit(&self, mut rundown: Rundown, regenerate: bool, reason: &str) -> Result<Rundown> {
        rundown.sort();
        rundown.validate()?;
        rundown.updated_at = self.clock.now();

        let timeline = if regenerate {
            Some(self.timeline_builder.build_timeline(&mut rundown).await?)
        } else {
            None
        };

        let rundown = self.storage.save_rundown(rundown).await?;
        self.events.emit_rundown_updated(&rundown.id, reason);

        if let Some(timeline) = timeline {
            let timeline = self.storage.save_timeline(timeline).await?;
            self.events.emit_timeline_updated(&rundown.id, timeline.objects.len());
        }
        Ok(rundown)
    }

    fn require_activated(rundown: &Rundown) -> Result<()> {
        if rundown.activation.is_activated() {
            Ok(())
        } else {
            Err(RundownError::NotActivated(format!(
                "Rundown {} is {}",
                rundown.id, rundown.activation
            )))
        }
    }

    /// Point next at the automatic choice when it is unset or dangling
    fn ensure_next(rundown: &mut Rundown) {
        let valid = rundown.next_part().is_some();
        if !valid {
            rundown.next_part_id = rundown.automatic_next();
            rundown.next_owner = rundown.next_part_id.as_ref().map(|_| NextOwner::Automation);
        }
    }

    /// Promote next to active; the caller holds the rundown lock
    async fn take(&self, mut rundown: Rundown) -> Result<Rundown> {
        let id = rundown.id.clone();
        Self::require_activated(&rundown)?;

        let next_id = rundown
            .next_part()
            .map(|p| p.id.clone())
            .ok_or_else(|| RundownError::EndOfRundown(format!("Rundown {} has no next part", id)))?;

        let now = self.clock.now();
        rundown.previous_part_id = rundown.active_part_id.take();
        rundown.active_part_id = Some(next_id.clone());
        if let Some(part) = rundown.find_part_mut(&next_id) {
            part.taken_at = Some(now);
            for piece in part.pieces.iter_mut().filter(|p| !p.dynamically_inserted) {
                piece.executed_at = None;
                piece.stopped_at = None;
            }
        }

        rundown.next_part_id = rundown.part_after(&next_id).map(|p| p.id.clone());
        rundown.next_owner = rundown.next_part_id.as_ref().map(|_| NextOwner::Automation);

        info!(
            rundown_id = %id,
            part_id = %next_id,
            next = ?rundown.next_part_id,
            "Took next part"
        );
        let rundown = self.commit(rundown, true, "take").await?;
        self.announce_take(&rundown);
        Ok(rundown)
    }

    fn announce_take(&self, rundown: &Rundown) {
        let Some(part) = rundown.active_part() else {
            return;
        };
        let Some(taken_at) = part.taken_at else {
            return;
        };
        let auto_next_at = match (part.autonext, part.expected_duration_ms) {
            (true, Some(ms)) => Some(taken_at + Duration::milliseconds(ms as i64)),
            _ => None,
        };
        self.events.publish(EngineEvent::PartTaken {
            rundown_id: rundown.id.clone(),
            part_id: part.id.clone(),
            taken_at,
            auto_next_at,
        });
    }
}

#[async_trait::async_trait]
impl RundownService for RundownEngine {
    async fn get_rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.load(id).await
    }

    async fn activate_rundown(&self, id: &RundownId) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        if rundown.activation == ActivationStatus::Active {
            return Err(RundownError::AlreadyActivated(format!("Rundown {}", id)));
        }

        rundown.activation = ActivationStatus::Active;
        Self::ensure_next(&mut rundown);
        info!(rundown_id = %id, next = ?rundown.next_part_id, "Rundown activated");
        self.commit(rundown, true, "activated").await
    }

    async fn enter_rehearsal(&self, id: &RundownId) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;

        rundown.activation = ActivationStatus::Rehearsal;
        Self::ensure_next(&mut rundown);
        info!(rundown_id = %id, "Rundown entered rehearsal");
        self.commit(rundown, true, "rehearsal").await
    }

    async fn deactivate_rundown(&self, id: &RundownId) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;

        rundown.activation = ActivationStatus::Inactive;
        rundown.active_part_id = None;
        rundown.previous_part_id = None;
        info!(rundown_id = %id, "Rundown deactivated");
        self.commit(rundown, true, "deactivated").await
    }

    async fn reset_rundown(&self, id: &RundownId) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        if rundown.activation == ActivationStatus::Active {
            return Err(RundownError::RundownIsActive(format!(
                "Rundown {} cannot be reset while on air",
                id
            )));
        }

        rundown.reset_to_baseline();
        if rundown.activation.is_activated() {
            Self::ensure_next(&mut rundown);
        }
        info!(rundown_id = %id, "Rundown reset");
        self.commit(rundown, true, "reset").await
    }

    async fn take_next(&self, id: &RundownId) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let rundown = self.load(id).await?;
        self.take(rundown).await
    }

    async fn take_next_if_on_air(
        &self,
        id: &RundownId,
        expected_active: &PartId,
    ) -> Result<Option<Rundown>> {
        let _guard = self.lock(id).await;
        let rundown = self.load(id).await?;
        if rundown.active_part_id.as_ref() != Some(expected_active) {
            debug!(
                rundown_id = %id,
                expected = %expected_active,
                active = ?rundown.active_part_id,
                "Conditional take skipped, part no longer on air"
            );
            return Ok(None);
        }
        self.take(rundown).await.map(Some)
    }

    async fn set_next(
        &self,
        id: &RundownId,
        segment_id: &SegmentId,
        part_id: &PartId,
        owner: Option<NextOwner>,
    ) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;

        let segment = rundown
            .find_segment(segment_id)
            .ok_or_else(|| RundownError::NotFound(format!("Segment {} in rundown {}", segment_id, id)))?;
        if !segment.parts.iter().any(|p| &p.id == part_id) {
            return Err(RundownError::NotFound(format!(
                "Part {} in segment {}",
                part_id, segment_id
            )));
        }

        rundown.next_part_id = Some(part_id.clone());
        rundown.next_owner = owner;
        debug!(rundown_id = %id, part_id = %part_id, owner = ?owner, "Next part set");
        self.commit(rundown, false, "set_next").await
    }

    async fn insert_part_as_on_air(&self, id: &RundownId, mut part: Part) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        Self::require_activated(&rundown)?;

        let now = self.clock.now();
        part.dynamically_inserted = true;
        part.taken_at = Some(now);
        let anchor = rundown.active_part_id.clone();
        let part_id = rundown.insert_part_after(anchor.as_ref(), part)?;

        rundown.previous_part_id = rundown.active_part_id.replace(part_id.clone());
        Self::ensure_next(&mut rundown);

        info!(rundown_id = %id, part_id = %part_id, "Part inserted on air");
        let rundown = self.commit(rundown, true, "insert_part_on_air").await?;
        self.announce_take(&rundown);
        Ok(rundown)
    }

    async fn insert_part_as_next(&self, id: &RundownId, mut part: Part) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;

        part.dynamically_inserted = true;
        let anchor = rundown.active_part_id.clone();
        let part_id = rundown.insert_part_after(anchor.as_ref(), part)?;
        rundown.next_part_id = Some(part_id.clone());
        rundown.next_owner = Some(NextOwner::Operator);

        info!(rundown_id = %id, part_id = %part_id, "Part inserted as next");
        self.commit(rundown, false, "insert_part_next").await
    }

    async fn insert_piece_as_on_air(
        &self,
        id: &RundownId,
        mut piece: Piece,
        layers_to_stop: &[String],
    ) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        Self::require_activated(&rundown)?;
        rundown.ensure_piece_id_free(&piece.id)?;

        let now = self.clock.now();
        let active_id = rundown
            .active_part_id
            .clone()
            .ok_or_else(|| RundownError::NotFound(format!("Rundown {} has no part on air", id)))?;
        let part = rundown
            .find_part_mut(&active_id)
            .ok_or_else(|| RundownError::NotFound(format!("Part {}", active_id)))?;

        let mut stopped = Vec::new();
        if !piece.allow_overlap {
            stopped.extend(part.stop_pieces_on_layers(&[piece.layer.clone()], now, false));
        }
        if !layers_to_stop.is_empty() {
            stopped.extend(part.stop_pieces_on_layers(layers_to_stop, now, true));
        }

        piece.executed_at = Some(now);
        piece.stopped_at = None;
        piece.dynamically_inserted = true;
        info!(
            rundown_id = %id,
            part_id = %active_id,
            piece_id = %piece.id,
            layer = %piece.layer,
            stopped = stopped.len(),
            "Piece inserted on air"
        );
        part.pieces.push(piece);

        self.commit(rundown, true, "insert_piece_on_air").await
    }

    async fn insert_piece_as_next(
        &self,
        id: &RundownId,
        mut piece: Piece,
        in_transition: Option<PartTransition>,
    ) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        rundown.ensure_piece_id_free(&piece.id)?;

        let next_id = rundown
            .next_part_id
            .clone()
            .ok_or_else(|| RundownError::NotFound(format!("Rundown {} has no next part", id)))?;
        let part = rundown
            .find_part_mut(&next_id)
            .ok_or_else(|| RundownError::NotFound(format!("Part {}", next_id)))?;

        piece.dynamically_inserted = true;
        piece.executed_at = None;
        debug!(rundown_id = %id, part_id = %next_id, piece_id = %piece.id, "Piece inserted on next part");
        part.pieces.push(piece);
        if in_transition.is_some() {
            part.in_transition = in_transition;
        }

        self.commit(rundown, false, "insert_piece_next").await
    }

    async fn replace_piece_on_air_on_next_part(
        &self,
        id: &RundownId,
        piece_to_replace: &PieceId,
        mut new_piece: Piece,
    ) -> Result<Rundown> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;
        if &new_piece.id != piece_to_replace {
            rundown.ensure_piece_id_free(&new_piece.id)?;
        }

        let next_id = rundown
            .next_part_id
            .clone()
            .ok_or_else(|| RundownError::NotFound(format!("Rundown {} has no next part", id)))?;
        let part = rundown
            .find_part_mut(&next_id)
            .ok_or_else(|| RundownError::NotFound(format!("Part {}", next_id)))?;
        let slot = part
            .pieces
            .iter_mut()
            .find(|p| &p.id == piece_to_replace)
            .ok_or_else(|| {
                RundownError::NotFound(format!("Piece {} on next part {}", piece_to_replace, next_id))
            })?;

        new_piece.dynamically_inserted = true;
        debug!(rundown_id = %id, old = %piece_to_replace, new = %new_piece.id, "Piece replaced on next part");
        *slot = new_piece;

        self.commit(rundown, false, "replace_piece_next").await
    }

    async fn delete_rundown(&self, id: &RundownId) -> Result<()> {
        let _guard = self.lock(id).await;
        if !self.storage.delete_rundown(id).await? {
            return Err(RundownError::NotFound(format!("Rundown {}", id)));
        }
        self.storage.delete_timeline(id.as_str()).await?;

        info!(rundown_id = %id, "Rundown deleted");
        self.events.publish(EngineEvent::RundownDeleted { rundown_id: id.clone() });
        Ok(())
    }

    async fn apply_ingest_update(&self, incoming: Rundown) -> Result<Rundown> {
        let id = incoming.id.clone();
        let _guard = self.lock(&id).await;

        let merged = match self.storage.get_rundown(&id).await? {
            Some(existing) => merge_ingest(existing, incoming, self.respect_operator_next),
            None => {
                info!(rundown_id = %id, "New rundown from ingest");
                incoming
            }
        };
        self.commit(merged, true, "ingest").await
    }

    async fn regenerate_timeline(&self, id: &RundownId) -> Result<Timeline> {
        let _guard = self.lock(id).await;
        let mut rundown = self.load(id).await?;

        let timeline = self.timeline_builder.build_timeline(&mut rundown).await?;
        self.storage.save_rundown(rundown).await?;
        let timeline = self.storage.save_timeline(timeline).await?;
        self.events.emit_timeline_updated(id, timeline.objects.len());
        Ok(timeline)
    }
}

/// Fold freshly ingested structure into the live rundown
///
/// Live state wins over ingest: activation, pointers, blueprint state,
/// execution stamps and action-inserted material all survive. A part that is
/// on air but vanished upstream is kept in place so playout is not cut.
pub fn merge_ingest(existing: Rundown, mut incoming: Rundown, respect_operator_next: bool) -> Rundown {
    incoming.activation = existing.activation;
    incoming.persistent_state = existing.persistent_state.clone();
    incoming.created_at = existing.created_at;

    for segment in incoming.segments.iter_mut() {
        segment.rundown_id = incoming.id.clone();
        for part in segment.parts.iter_mut() {
            part.segment_id = segment.id.clone();
            let Some(old) = existing.find_part(&part.id) else {
                continue;
            };
            part.taken_at = old.taken_at;
            for piece in part.pieces.iter_mut() {
                if let Some(old_piece) = old.find_piece(&piece.id) {
                    piece.executed_at = old_piece.executed_at;
                    piece.stopped_at = old_piece.stopped_at;
                }
            }
            let carried: Vec<Piece> = old
                .pieces
                .iter()
                .filter(|p| p.dynamically_inserted && part.find_piece(&p.id).is_none())
                .cloned()
                .collect();
            part.pieces.extend(carried);
        }
    }

    let retained: Vec<Part> = existing
        .parts_in_order()
        .filter(|p| incoming.find_part(&p.id).is_none())
        .filter(|p| p.dynamically_inserted || existing.active_part_id.as_ref() == Some(&p.id))
        .cloned()
        .collect();
    for part in retained {
        let is_active = existing.active_part_id.as_ref() == Some(&part.id);
        let target = match incoming.segments.iter().position(|s| s.id == part.segment_id) {
            Some(idx) => Some(idx),
            None if is_active && !incoming.segments.is_empty() => Some(0),
            None => None,
        };
        match target {
            Some(idx) => {
                if is_active {
                    warn!(rundown_id = %incoming.id, part_id = %part.id, "On-air part removed upstream, retained");
                }
                let segment = &mut incoming.segments[idx];
                let mut part = part;
                part.segment_id = segment.id.clone();
                segment.parts.push(part);
            }
            None => {
                debug!(rundown_id = %incoming.id, part_id = %part.id, "Dropped part whose segment was removed");
            }
        }
    }
    incoming.sort();

    incoming.active_part_id = existing
        .active_part_id
        .clone()
        .filter(|id| incoming.find_part(id).is_some());
    incoming.previous_part_id = existing
        .previous_part_id
        .clone()
        .filter(|id| incoming.find_part(id).is_some());

    let existing_next = existing
        .next_part_id
        .clone()
        .filter(|id| incoming.find_part(id).is_some());
    let operator_owned = existing.next_owner == Some(NextOwner::Operator) && respect_operator_next;

    if !incoming.activation.is_activated() {
        incoming.next_part_id = existing_next;
        incoming.next_owner = incoming.next_part_id.as_ref().and(existing.next_owner);
    } else if existing_next.is_some() && operator_owned {
        incoming.next_part_id = existing_next;
        incoming.next_owner = Some(NextOwner::Operator);
    } else {
        incoming.next_part_id = incoming.automatic_next();
        incoming.next_owner = incoming.next_part_id.as_ref().map(|_| NextOwner::Automation);
    }

    incoming
}
