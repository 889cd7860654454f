// Action execution service - turns catalog entries into rundown mutations

//! # Action Execution Service
//!
//! Actions are persisted templates produced by the blueprint ("lower third",
//! "breaking news part"). Executing one materializes concrete parts and
//! pieces with fresh ids and hands them to the rundown service.
//!
//! ## Fresh ids
//!
//! The same action fired twice in a row must produce two distinct entities,
//! otherwise the second lower third would overwrite the first in storage.
//! Ids are `{template_id}_{millis}` where `millis` is strictly increasing
//! across the whole service, even when two executions land in the same
//! millisecond.
//!
//! ## Rust Learning Notes:
//!
//! ### Lock-free monotonic counter
//! [`IdGenerator`] keeps the last suffix in an `AtomicI64` and advances it
//! with a compare-exchange loop. No mutex is held and concurrent callers
//! still each get a unique value.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::blueprint::Blueprint;
use super::clock::Clock;
use super::config_cache::ConfigurationCache;
use super::events::EventBus;
use super::rundown::RundownService;
use super::storage::ActionStorage;
use crate::models::{Action, ActionId, ActionKind, PartId, PieceId, Rundown, RundownId};
use crate::{Result, RundownError};

/// Strictly increasing `{prefix}_{millis}` ids
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(0),
        }
    }

    fn next_suffix(&self) -> i64 {
        let now = self.clock.now_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    pub fn next_id(&self, template_id: &str) -> String {
        format!("{}_{}", template_id, self.next_suffix())
    }
}

pub struct ActionExecutionService {
    rundowns: Arc<dyn RundownService>,
    actions: Arc<dyn ActionStorage>,
    configuration: Arc<ConfigurationCache>,
    blueprint: Arc<dyn Blueprint>,
    events: EventBus,
    ids: IdGenerator,
}

impl ActionExecutionService {
    pub fn new(
        rundowns: Arc<dyn RundownService>,
        actions: Arc<dyn ActionStorage>,
        configuration: Arc<ConfigurationCache>,
        blueprint: Arc<dyn Blueprint>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rundowns,
            actions,
            configuration,
            blueprint,
            events,
            ids: IdGenerator::new(clock),
        }
    }

    /// Regenerate, persist and announce the action catalog
    pub async fn get_actions(&self) -> Result<Vec<Action>> {
        let configuration = self.configuration.get_configuration().await?;
        let actions = self.blueprint.generate_actions(&configuration).await?;
        self.actions.save_actions(&actions).await?;

        info!(
            show_style_id = %configuration.show_style.show_style_id,
            count = actions.len(),
            "Action catalog refreshed"
        );
        self.events.emit_actions_updated_event(actions.clone(), None);
        Ok(actions)
    }

    /// Materialize the action and apply it to the rundown
    pub async fn execute_action(&self, action_id: &ActionId, rundown_id: &RundownId) -> Result<Rundown> {
        let action = self
            .actions
            .get_action(action_id)
            .await?
            .ok_or_else(|| RundownError::NotFound(format!("Action {}", action_id)))?;

        info!(
            action_id = %action.id,
            kind = action.kind.name(),
            rundown_id = %rundown_id,
            "Executing action"
        );

        match &action.kind {
            ActionKind::InsertPartAsNext { part, pieces } | ActionKind::InsertPartAsOnAir { part, pieces } => {
                let pieces = pieces
                    .iter()
                    .map(|template| template.materialize(PieceId::new(self.ids.next_id(&template.id))))
                    .collect();
                let part = part.materialize(PartId::new(self.ids.next_id(&part.id)), pieces);

                if matches!(action.kind, ActionKind::InsertPartAsOnAir { .. }) {
                    self.rundowns.insert_part_as_on_air(rundown_id, part).await
                } else {
                    self.rundowns.insert_part_as_next(rundown_id, part).await
                }
            }
            ActionKind::InsertPieceAsOnAir { piece, layers_to_stop } => {
                let piece = piece.materialize(PieceId::new(self.ids.next_id(&piece.id)));
                self.rundowns
                    .insert_piece_as_on_air(rundown_id, piece, layers_to_stop)
                    .await
            }
            ActionKind::InsertPieceAsNext { .. } => {
                warn!(action_id = %action.id, "Action variant cannot be executed");
                Err(RundownError::UnsupportedOperation(format!(
                    "Action type {} is not executable",
                    action.kind.name()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::engine::test_support::{harness, Harness};
    use crate::models::Part;
    use std::collections::HashSet;

    fn service(h: &Harness) -> ActionExecutionService {
        ActionExecutionService::new(
            h.engine.clone(),
            h.storage.clone(),
            h.configuration.clone(),
            h.blueprint.clone(),
            h.events.clone(),
            h.clock.clone(),
        )
    }

    async fn on_air(h: &Harness) -> RundownId {
        let id = RundownId::from("R1");
        h.engine.activate_rundown(&id).await.unwrap();
        h.engine.take_next(&id).await.unwrap();
        id
    }

    #[test]
    fn test_ids_are_unique_within_one_millisecond() {
        let generator = IdGenerator::new(Arc::new(ManualClock::default()));
        let ids: HashSet<String> = (0..100).map(|_| generator.next_id("gfx")).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_id_suffix_follows_clock() {
        let clock = Arc::new(ManualClock::default());
        let generator = IdGenerator::new(clock.clone());
        assert_eq!(generator.next_id("gfx"), format!("gfx_{}", clock.now_millis()));
        clock.advance_millis(10);
        assert_eq!(generator.next_id("gfx"), format!("gfx_{}", clock.now_millis()));
    }

    #[tokio::test]
    async fn test_get_actions_persists_and_announces() {
        let h = harness().await;
        let service = service(&h);
        let mut rx = h.events.subscribe();

        let actions = service.get_actions().await.unwrap();
        assert_eq!(actions.len(), 4);
        assert_eq!(h.blueprint.action_generations(), 1);

        let stored = h.storage.get_action(&ActionId::from("lower_third")).await.unwrap();
        assert!(stored.is_some());

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            crate::engine::events::EngineEvent::ActionsUpdated { ref actions, rundown_id: None } if actions.len() == 4
        ));

        // refresh-on-read: every call regenerates
        service.get_actions().await.unwrap();
        assert_eq!(h.blueprint.action_generations(), 2);
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_found() {
        let h = harness().await;
        let service = service(&h);
        service.get_actions().await.unwrap();

        let result = service
            .execute_action(&ActionId::from("nope"), &RundownId::from("R1"))
            .await;
        assert!(matches!(result, Err(RundownError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_same_action_twice_yields_distinct_pieces() {
        let h = harness().await;
        let service = service(&h);
        service.get_actions().await.unwrap();
        let rundown_id = on_air(&h).await;

        service.execute_action(&ActionId::from("lower_third"), &rundown_id).await.unwrap();
        let rundown = service
            .execute_action(&ActionId::from("lower_third"), &rundown_id)
            .await
            .unwrap();

        let straps: Vec<_> = rundown
            .active_part()
            .unwrap()
            .pieces
            .iter()
            .filter(|p| p.id.as_str().starts_with("lower_third_"))
            .collect();
        assert_eq!(straps.len(), 2);
        assert_ne!(straps[0].id, straps[1].id);
        assert!(straps.iter().all(|p| p.executed_at == Some(h.clock.now())));
        assert!(straps.iter().all(|p| p.dynamically_inserted));
        // second strap pushed the first off the layer
        assert!(!straps[0].is_playing());
        assert!(straps[1].is_playing());
    }

    #[tokio::test]
    async fn test_part_action_goes_on_air() {
        let h = harness().await;
        let service = service(&h);
        service.get_actions().await.unwrap();
        let rundown_id = on_air(&h).await;

        let rundown = service
            .execute_action(&ActionId::from("breaking"), &rundown_id)
            .await
            .unwrap();
        let active: &Part = rundown.active_part().unwrap();
        assert!(active.id.as_str().starts_with("breaking_"));
        assert!(active.dynamically_inserted);
        assert!(active.pieces[0].id.as_str().starts_with("breaking_cam_"));
    }

    #[tokio::test]
    async fn test_part_action_as_next() {
        let h = harness().await;
        let service = service(&h);
        service.get_actions().await.unwrap();
        let rundown_id = on_air(&h).await;

        let rundown = service.execute_action(&ActionId::from("promo"), &rundown_id).await.unwrap();
        let next = rundown.next_part().unwrap();
        assert!(next.id.as_str().starts_with("promo_"));
        assert_eq!(rundown.part_after(&PartId::from("P1")).unwrap().id, next.id);
    }

    #[tokio::test]
    async fn test_piece_as_next_variant_is_unsupported() {
        let h = harness().await;
        let service = service(&h);
        service.get_actions().await.unwrap();
        let rundown_id = on_air(&h).await;

        let result = service.execute_action(&ActionId::from("vt_next"), &rundown_id).await;
        match result {
            Err(RundownError::UnsupportedOperation(message)) => assert!(message.contains("InsertPieceAsNext")),
            other => panic!("expected UnsupportedOperation, got {:?}", other),
        }
    }
}
