// Timeline builders - base skeleton plus blueprint enrichment

//! # Timeline Builder Pipeline
//!
//! Two stages:
//!
//! ```text
//!  rundown ──► BaseTimelineBuilder ──► timeline skeleton
//!                   │
//!                   └─ part on air? ──► Blueprint::on_timeline_generate
//!                                          │
//!                                          ├─► enriched timeline
//!                                          └─► persistent state ──► rundown
//! ```
//!
//! Rundowns with nothing on air never reach the blueprint. Rundowns with an
//! active part get exactly one hook call per build, and the state the hook
//! returns replaces the rundown's previous state before the timeline is
//! returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::blueprint::Blueprint;
use super::clock::Clock;
use super::config_cache::ConfigurationCache;
use crate::models::{
    Part, Rundown, StudioSettings, Timeline, TimelineEnable, TimelineObject,
};
use crate::Result;

const PRIORITY_BASELINE: i32 = 0;
const PRIORITY_LOOKAHEAD: i32 = 1;
const PRIORITY_PART: i32 = 5;
const PRIORITY_ADLIB: i32 = 10;
const PRIORITY_TRANSITION: i32 = 20;

#[async_trait::async_trait]
pub trait TimelineBuilder: Send + Sync {
    /// The static skeleton, independent of any rundown
    async fn get_base_timeline(&self) -> Result<Timeline>;

    /// Build the timeline for `rundown`
    ///
    /// May update `rundown.persistent_state`; the caller persists the rundown.
    async fn build_timeline(&self, rundown: &mut Rundown) -> Result<Timeline>;
}

/// Pure skeleton builder: rundown + studio settings → timeline
///
/// - one baseline object per mapped layer that declares baseline content
/// - one object per playing piece of the active part, routed via the studio
///   mapping of its layer (unmapped layers are skipped)
/// - the active part's in-transition on the studio's transition layer
/// - lookahead objects for the next part's pieces when the studio asks for it
pub fn build_base_timeline(rundown: &Rundown, studio: &StudioSettings, now: DateTime<Utc>) -> Timeline {
    let mut timeline = Timeline::new(rundown.id.as_str(), Some(rundown.id.clone()), now);

    for mapping in &studio.mappings {
        if let Some(content) = &mapping.baseline {
            timeline.objects.push(TimelineObject {
                id: format!("baseline_{}", mapping.layer),
                layer: mapping.layer.clone(),
                device_id: mapping.device_id.clone(),
                enable: TimelineEnable::now(),
                priority: PRIORITY_BASELINE,
                content: content.clone(),
                part_id: None,
                piece_id: None,
                is_lookahead: false,
            });
        }
    }

    if let Some(active) = rundown.active_part() {
        push_part_objects(&mut timeline, active, studio);
        if let (Some(transition), Some(layer)) = (&active.in_transition, &studio.transition_layer) {
            if let Some(mapping) = studio.mapping_for(layer) {
                let mut enable = active.taken_at.map(TimelineEnable::at).unwrap_or_else(TimelineEnable::now);
                enable.duration_ms = Some(transition.duration_ms);
                timeline.objects.push(TimelineObject {
                    id: format!("transition_{}", active.id),
                    layer: layer.clone(),
                    device_id: mapping.device_id.clone(),
                    enable,
                    priority: PRIORITY_TRANSITION,
                    content: serde_json::json!({
                        "kind": transition.kind,
                        "content": transition.content,
                    }),
                    part_id: Some(active.id.clone()),
                    piece_id: None,
                    is_lookahead: false,
                });
            }
        }
    }

    if studio.lookahead {
        if let Some(next) = rundown.next_part() {
            for piece in &next.pieces {
                let Some(mapping) = studio.mapping_for(&piece.layer) else {
                    continue;
                };
                timeline.objects.push(TimelineObject {
                    id: format!("lookahead_{}", piece.id),
                    layer: format!("{}_lookahead", piece.layer),
                    device_id: mapping.device_id.clone(),
                    enable: TimelineEnable::now(),
                    priority: PRIORITY_LOOKAHEAD,
                    content: piece.content.clone(),
                    part_id: Some(next.id.clone()),
                    piece_id: Some(piece.id.clone()),
                    is_lookahead: true,
                });
            }
        }
    }

    timeline
}

/// The skeleton before any rundown is loaded: studio baselines only
pub fn build_studio_baseline(studio: &StudioSettings, now: DateTime<Utc>) -> Timeline {
    let empty = Rundown::new(format!("{}_base", studio.studio_id), "");
    let mut timeline = build_base_timeline(&empty, studio, now);
    timeline.rundown_id = None;
    timeline
}

fn push_part_objects(timeline: &mut Timeline, part: &Part, studio: &StudioSettings) {
    for piece in part.pieces.iter().filter(|p| p.is_playing()) {
        let Some(mapping) = studio.mapping_for(&piece.layer) else {
            debug!(piece_id = %piece.id, layer = %piece.layer, "No mapping for layer, piece skipped");
            continue;
        };
        let start = piece.executed_at.or(part.taken_at);
        timeline.objects.push(TimelineObject {
            id: format!("piece_{}", piece.id),
            layer: piece.layer.clone(),
            device_id: mapping.device_id.clone(),
            enable: start.map(TimelineEnable::at).unwrap_or_else(TimelineEnable::now),
            priority: if piece.dynamically_inserted { PRIORITY_ADLIB } else { PRIORITY_PART },
            content: piece.content.clone(),
            part_id: Some(part.id.clone()),
            piece_id: Some(piece.id.clone()),
            is_lookahead: false,
        });
    }
}

/// Timeline builder with no blueprint involvement
pub struct BaseTimelineBuilder {
    configuration: Arc<ConfigurationCache>,
    clock: Arc<dyn Clock>,
}

impl BaseTimelineBuilder {
    pub fn new(configuration: Arc<ConfigurationCache>, clock: Arc<dyn Clock>) -> Self {
        Self { configuration, clock }
    }
}

#[async_trait::async_trait]
impl TimelineBuilder for BaseTimelineBuilder {
    async fn get_base_timeline(&self) -> Result<Timeline> {
        let configuration = self.configuration.get_configuration().await?;
        Ok(build_studio_baseline(&configuration.studio, self.clock.now()))
    }

    async fn build_timeline(&self, rundown: &mut Rundown) -> Result<Timeline> {
        let configuration = self.configuration.get_configuration().await?;
        Ok(build_base_timeline(rundown, &configuration.studio, self.clock.now()))
    }
}

/// Base builder plus the blueprint hook for rundowns with a part on air
pub struct BlueprintTimelineBuilder {
    configuration: Arc<ConfigurationCache>,
    blueprint: Arc<dyn Blueprint>,
    clock: Arc<dyn Clock>,
}

impl BlueprintTimelineBuilder {
    pub fn new(
        configuration: Arc<ConfigurationCache>,
        blueprint: Arc<dyn Blueprint>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            configuration,
            blueprint,
            clock,
        }
    }
}

#[async_trait::async_trait]
impl TimelineBuilder for BlueprintTimelineBuilder {
    async fn get_base_timeline(&self) -> Result<Timeline> {
        self.blueprint.get_base_timeline().await
    }

    async fn build_timeline(&self, rundown: &mut Rundown) -> Result<Timeline> {
        let configuration = self.configuration.get_configuration().await?;
        let base = build_base_timeline(rundown, &configuration.studio, self.clock.now());

        let Some(active) = rundown.active_part() else {
            debug!(rundown_id = %rundown.id, objects = base.objects.len(), "Built base timeline");
            return Ok(base);
        };

        let result = self
            .blueprint
            .on_timeline_generate(
                &configuration,
                base,
                active,
                rundown.persistent_state.clone(),
                rundown.previous_part(),
            )
            .await?;

        debug!(
            rundown_id = %rundown.id,
            part_id = %active.id,
            objects = result.timeline.objects.len(),
            "Built blueprint timeline"
        );
        rundown.persistent_state = result.persistent_state;
        Ok(result.timeline)
    }
}
