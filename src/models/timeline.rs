// Timeline models - the device-oriented schedule consumed by playout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PartId, PieceId, RundownId};
use super::rundown::PersistentState;

/// When a timeline object starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "snake_case")]
pub enum TimelineStart {
    /// As soon as the device receives the timeline
    Now,
    At(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEnable {
    pub start: TimelineStart,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TimelineEnable {
    pub fn now() -> Self {
        Self {
            start: TimelineStart::Now,
            duration_ms: None,
        }
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            start: TimelineStart::At(start),
            duration_ms: None,
        }
    }
}

/// One instruction for one device layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineObject {
    pub id: String,

    pub layer: String,

    pub device_id: String,

    pub enable: TimelineEnable,

    /// Higher priority wins when objects overlap on a layer
    pub priority: i32,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<PartId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_id: Option<PieceId>,

    /// Pre-loaded content for the next part
    #[serde(default)]
    pub is_lookahead: bool,
}

/// Device-oriented schedule derived from a rundown and its configuration
///
/// Written once per generation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rundown_id: Option<RundownId>,

    pub generated_at: DateTime<Utc>,

    #[serde(default)]
    pub objects: Vec<TimelineObject>,
}

impl Timeline {
    pub fn new(id: impl Into<String>, rundown_id: Option<RundownId>, generated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            rundown_id,
            generated_at,
            objects: Vec::new(),
        }
    }

    pub fn objects_on_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a TimelineObject> + 'a {
        self.objects.iter().filter(move |o| o.layer == layer)
    }
}

/// What the blueprint hands back from a generation: the enriched timeline and
/// the state to carry into the next generation
#[derive(Debug, Clone, PartialEq)]
pub struct OnTimelineGenerateResult {
    pub timeline: Timeline,

    pub persistent_state: Option<PersistentState>,
}
