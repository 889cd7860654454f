// Blueprint - the pluggable, show-template-specific strategy

//! # Blueprint
//!
//! The engine knows how to keep a rundown consistent and how to turn it into
//! a device timeline skeleton. Everything editorial (which actions exist,
//! what a transition looks like on the vision mixer, how many crossfades have
//! run) belongs to the blueprint. The engine only requires three capabilities:
//!
//! - `generate_actions`: the catalog of actions for a configuration
//! - `get_base_timeline`: the static skeleton before any rundown is loaded
//! - `on_timeline_generate`: enrich a freshly built timeline while a part is
//!   on air, returning the persistent state for the next generation

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use super::clock::Clock;
use super::config_cache::ConfigurationCache;
use super::timeline::build_studio_baseline;
use crate::models::{Action, Configuration, OnTimelineGenerateResult, Part, PersistentState, Timeline};
use crate::Result;

#[async_trait::async_trait]
pub trait Blueprint: Send + Sync {
    async fn generate_actions(&self, configuration: &Configuration) -> Result<Vec<Action>>;

    async fn get_base_timeline(&self) -> Result<Timeline>;

    /// `persistent_state` is exactly what the previous call returned
    async fn on_timeline_generate(
        &self,
        configuration: &Configuration,
        timeline: Timeline,
        active_part: &Part,
        persistent_state: Option<PersistentState>,
        previous_part: Option<&Part>,
    ) -> Result<OnTimelineGenerateResult>;
}

/// A data-driven blueprint that works from the show-style config document
///
/// - actions are read from `show_style.config.actions`
/// - the base timeline holds one object per studio layer with baseline
///   content, read from the configuration cache on every call
/// - each generation bumps `generation` in the persistent state and stamps
///   the active part's objects with the id of the previous part
pub struct ShowStyleBlueprint {
    configuration: Arc<ConfigurationCache>,
    clock: Arc<dyn Clock>,
}

impl ShowStyleBlueprint {
    pub fn new(configuration: Arc<ConfigurationCache>, clock: Arc<dyn Clock>) -> Self {
        Self { configuration, clock }
    }
}

#[async_trait::async_trait]
impl Blueprint for ShowStyleBlueprint {
    async fn generate_actions(&self, configuration: &Configuration) -> Result<Vec<Action>> {
        match configuration.show_style.config.get("actions") {
            Some(actions) => Ok(serde_json::from_value(actions.clone())?),
            None => {
                warn!(
                    show_style_id = %configuration.show_style.show_style_id,
                    "Show style has no actions configured"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn get_base_timeline(&self) -> Result<Timeline> {
        let configuration = self.configuration.get_configuration().await?;
        Ok(build_studio_baseline(&configuration.studio, self.clock.now()))
    }

    async fn on_timeline_generate(
        &self,
        _configuration: &Configuration,
        mut timeline: Timeline,
        active_part: &Part,
        persistent_state: Option<PersistentState>,
        previous_part: Option<&Part>,
    ) -> Result<OnTimelineGenerateResult> {
        let generation = persistent_state
            .as_ref()
            .and_then(|s| s.0.get("generation"))
            .and_then(|g| g.as_u64())
            .unwrap_or(0)
            + 1;

        for object in timeline.objects.iter_mut() {
            if object.part_id.as_ref() == Some(&active_part.id) {
                if let serde_json::Value::Object(map) = &mut object.content {
                    map.insert("previous_part".to_string(), json!(previous_part.map(|p| p.id.as_str())));
                }
            }
        }

        Ok(OnTimelineGenerateResult {
            timeline,
            persistent_state: Some(PersistentState::new(json!({
                "generation": generation,
                "active_part": active_part.id.as_str(),
            }))),
        })
    }
}
