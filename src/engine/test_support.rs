// Shared fixtures for engine unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use super::blueprint::Blueprint;
use super::clock::ManualClock;
use super::config_cache::{ConfigurationCache, ConfigurationSource, StaticConfigurationSource};
use super::events::EventBus;
use super::rundown::RundownEngine;
use super::storage::{InMemoryStorage, RundownStorage};
use super::timeline::BlueprintTimelineBuilder;
use crate::models::{
    Action, Configuration, LayerMapping, OnTimelineGenerateResult, Part, PartId, PersistentState,
    Piece, Rundown, Segment, ShowStyleSettings, StudioSettings, Timeline, TimelineEnable,
    TimelineObject,
};
use crate::Result;

pub fn sample_configuration() -> Configuration {
    let mapping = |layer: &str, device: &str, baseline: Option<serde_json::Value>| LayerMapping {
        layer: layer.to_string(),
        device_id: device.to_string(),
        baseline,
    };

    Configuration {
        studio: StudioSettings {
            studio_id: "studio-a".to_string(),
            name: "Studio A".to_string(),
            mappings: vec![
                mapping("cam", "atem", Some(json!({"input": 1}))),
                mapping("gfx_lower", "caspar", None),
                mapping("overlay", "caspar", None),
                mapping("vt", "caspar", None),
                mapping("audio", "mixer", Some(json!({"fader": 0}))),
                mapping("transition", "atem", None),
            ],
            transition_layer: Some("transition".to_string()),
            lookahead: false,
        },
        show_style: ShowStyleSettings {
            show_style_id: "news".to_string(),
            name: "Evening News".to_string(),
            config: json!({
                "actions": [
                    {
                        "id": "lower_third",
                        "name": "Lower third",
                        "type": "InsertPieceAsOnAir",
                        "piece": {"id": "lower_third", "name": "Strap", "layer": "gfx_lower"},
                        "layers_to_stop": []
                    },
                    {
                        "id": "breaking",
                        "name": "Breaking news",
                        "type": "InsertPartAsOnAir",
                        "part": {"id": "breaking", "title": "Breaking"},
                        "pieces": [{"id": "breaking_cam", "name": "Cam 1", "layer": "cam"}]
                    },
                    {
                        "id": "promo",
                        "name": "Promo next",
                        "type": "InsertPartAsNext",
                        "part": {"id": "promo", "title": "Promo"},
                        "pieces": [{"id": "promo_vt", "name": "Promo clip", "layer": "vt"}]
                    },
                    {
                        "id": "vt_next",
                        "name": "Clip on next",
                        "type": "InsertPieceAsNext",
                        "piece": {"id": "vt_next", "name": "Clip", "layer": "vt"}
                    }
                ]
            }),
        },
    }
}

/// R1: S1 [P1 (cam1, off1), P2 (cam2)], S2 [P3]
pub fn sample_rundown(id: &str) -> Rundown {
    let mut cam1 = Piece::new("cam1", "Cam 1", "cam");
    cam1.content = json!({"input": 1});
    Rundown::new(id, "Evening News")
        .with_segment(
            Segment::new("S1", id, 0.0, "Headlines")
                .with_part(
                    Part::new("P1", "S1", 0.0, "Intro")
                        .with_pieces(vec![cam1, Piece::new("off1", "Offscreen", "unmapped")]),
                )
                .with_part(
                    Part::new("P2", "S1", 1.0, "Story")
                        .with_pieces(vec![Piece::new("cam2", "Cam 2", "cam")]),
                ),
        )
        .with_segment(
            Segment::new("S2", id, 1.0, "Sports").with_part(Part::new("P3", "S2", 0.0, "Results")),
        )
}

pub fn configuration_cache() -> Arc<ConfigurationCache> {
    Arc::new(ConfigurationCache::new(Arc::new(StaticConfigurationSource::new(
        sample_configuration(),
    ))))
}

/// Static source that counts how often it is asked
pub struct CountingConfigurationSource {
    configuration: Configuration,
    fetches: AtomicUsize,
}

impl CountingConfigurationSource {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConfigurationSource for CountingConfigurationSource {
    async fn fetch_configuration(&self) -> Result<Configuration> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.configuration.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookCall {
    pub active_part: PartId,
    pub previous_part: Option<PartId>,
    pub persistent_state: Option<PersistentState>,
}

/// Blueprint that records every hook call and counts generations in state
#[derive(Default)]
pub struct RecordingBlueprint {
    calls: Mutex<Vec<HookCall>>,
    action_generations: AtomicUsize,
}

impl RecordingBlueprint {
    pub fn hook_calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn last_call(&self) -> Option<HookCall> {
        self.calls.lock().ok().and_then(|c| c.last().cloned())
    }

    pub fn action_generations(&self) -> usize {
        self.action_generations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Blueprint for RecordingBlueprint {
    async fn generate_actions(&self, configuration: &Configuration) -> Result<Vec<Action>> {
        self.action_generations.fetch_add(1, Ordering::SeqCst);
        let actions = configuration.show_style.config["actions"].clone();
        Ok(serde_json::from_value(actions)?)
    }

    async fn get_base_timeline(&self) -> Result<Timeline> {
        Ok(Timeline::new("recording_base", None, chrono::Utc::now()))
    }

    async fn on_timeline_generate(
        &self,
        _configuration: &Configuration,
        mut timeline: Timeline,
        active_part: &Part,
        persistent_state: Option<PersistentState>,
        previous_part: Option<&Part>,
    ) -> Result<OnTimelineGenerateResult> {
        let count = persistent_state
            .as_ref()
            .and_then(|s| s.0.get("count"))
            .and_then(|c| c.as_u64())
            .unwrap_or(0);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(HookCall {
                active_part: active_part.id.clone(),
                previous_part: previous_part.map(|p| p.id.clone()),
                persistent_state,
            });
        }

        timeline.objects.push(TimelineObject {
            id: "blueprint_marker".to_string(),
            layer: "overlay".to_string(),
            device_id: "caspar".to_string(),
            enable: TimelineEnable::now(),
            priority: 99,
            content: json!({"part": active_part.id.as_str()}),
            part_id: Some(active_part.id.clone()),
            piece_id: None,
            is_lookahead: false,
        });

        Ok(OnTimelineGenerateResult {
            timeline,
            persistent_state: Some(PersistentState::new(json!({"count": count + 1}))),
        })
    }
}

/// A fully wired engine over in-memory storage with R1 loaded
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub blueprint: Arc<RecordingBlueprint>,
    pub configuration: Arc<ConfigurationCache>,
    pub events: EventBus,
    pub engine: Arc<RundownEngine>,
}

impl Harness {
    pub async fn storage_timeline(&self, id: &str) -> Option<Timeline> {
        self.storage.get_timeline(id).await.ok().flatten()
    }
}

pub async fn harness() -> Harness {
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .save_rundown(sample_rundown("R1"))
        .await
        .expect("seed rundown");

    let clock = Arc::new(ManualClock::default());
    let blueprint = Arc::new(RecordingBlueprint::default());
    let configuration = configuration_cache();
    let events = EventBus::default();
    let builder = Arc::new(BlueprintTimelineBuilder::new(
        configuration.clone(),
        blueprint.clone(),
        clock.clone(),
    ));
    let engine = Arc::new(RundownEngine::new(
        storage.clone(),
        builder,
        events.clone(),
        clock.clone(),
    ));

    Harness {
        storage,
        clock,
        blueprint,
        configuration,
        events,
        engine,
    }
}
