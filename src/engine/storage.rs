// Storage abstraction for the rundown engine
// This defines the interface for persisting rundowns, timelines and actions

//! # Storage Abstraction Layer
//!
//! The engine never talks to a database directly. It goes through two
//! repository traits:
//! - **RundownStorage**: rundown aggregates (segments, parts and pieces live
//!   inside their rundown) and generated timelines
//! - **ActionStorage**: the action catalog produced by the blueprint
//!
//! `InMemoryStorage` implements both for development, tests and the bundled
//! server binary.
//!
//! ## Rust Learning Notes:
//!
//! ### Default Trait Methods
//! Segment/part/piece lookups are provided methods on `RundownStorage`: they
//! load the owning rundown and search it. A backend that stores entities in
//! separate tables can override them with direct queries.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::models::{
    Action, ActionId, Part, PartId, Piece, PieceId, Rundown, RundownId, Segment, SegmentId,
    Timeline,
};
use crate::Result;

/// Persistence for rundown structure and timelines
///
/// ## Return Value
/// `Result<Option<T>>` means:
/// - `Ok(Some(value))`: found
/// - `Ok(None)`: nothing stored under that id (not an error)
/// - `Err(error)`: the backend failed
#[async_trait::async_trait]
pub trait RundownStorage: Send + Sync {
    async fn get_rundown(&self, id: &RundownId) -> Result<Option<Rundown>>;

    /// Create or replace a rundown
    async fn save_rundown(&self, rundown: Rundown) -> Result<Rundown>;

    /// Returns whether something was deleted
    async fn delete_rundown(&self, id: &RundownId) -> Result<bool>;

    async fn list_rundowns(&self) -> Result<Vec<Rundown>>;

    async fn get_timeline(&self, id: &str) -> Result<Option<Timeline>>;

    /// Create or replace a timeline
    async fn save_timeline(&self, timeline: Timeline) -> Result<Timeline>;

    async fn delete_timeline(&self, id: &str) -> Result<bool>;

    async fn get_segment(&self, rundown_id: &RundownId, id: &SegmentId) -> Result<Option<Segment>> {
        Ok(self
            .get_rundown(rundown_id)
            .await?
            .and_then(|r| r.find_segment(id).cloned()))
    }

    async fn get_part(&self, rundown_id: &RundownId, id: &PartId) -> Result<Option<Part>> {
        Ok(self
            .get_rundown(rundown_id)
            .await?
            .and_then(|r| r.find_part(id).cloned()))
    }

    async fn get_piece(&self, rundown_id: &RundownId, id: &PieceId) -> Result<Option<Piece>> {
        Ok(self
            .get_rundown(rundown_id)
            .await?
            .and_then(|r| r.find_piece(id).cloned()))
    }
}

/// Persistence for the action catalog
#[async_trait::async_trait]
pub trait ActionStorage: Send + Sync {
    async fn get_action(&self, id: &ActionId) -> Result<Option<Action>>;

    /// Replace the whole catalog
    async fn save_actions(&self, actions: &[Action]) -> Result<()>;

    async fn list_actions(&self) -> Result<Vec<Action>>;
}

/// In-memory storage implementation for development and testing
///
/// ## Limitations
///
/// - **Not persistent**: Data is lost when process restarts
/// - **Not distributed**: Cannot share data across multiple processes
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    rundowns: RwLock<HashMap<RundownId, Rundown>>,
    timelines: RwLock<HashMap<String, Timeline>>,
    actions: RwLock<Vec<Action>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RundownStorage for InMemoryStorage {
    async fn get_rundown(&self, id: &RundownId) -> Result<Option<Rundown>> {
        let rundowns = self.rundowns.read().await;
        Ok(rundowns.get(id).cloned())
    }

    async fn save_rundown(&self, rundown: Rundown) -> Result<Rundown> {
        let mut rundowns = self.rundowns.write().await;
        rundowns.insert(rundown.id.clone(), rundown.clone());
        Ok(rundown)
    }

    async fn delete_rundown(&self, id: &RundownId) -> Result<bool> {
        let mut rundowns = self.rundowns.write().await;
        Ok(rundowns.remove(id).is_some())
    }

    async fn list_rundowns(&self) -> Result<Vec<Rundown>> {
        let rundowns = self.rundowns.read().await;
        let mut all: Vec<Rundown> = rundowns.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn get_timeline(&self, id: &str) -> Result<Option<Timeline>> {
        let timelines = self.timelines.read().await;
        Ok(timelines.get(id).cloned())
    }

    async fn save_timeline(&self, timeline: Timeline) -> Result<Timeline> {
        let mut timelines = self.timelines.write().await;
        timelines.insert(timeline.id.clone(), timeline.clone());
        Ok(timeline)
    }

    async fn delete_timeline(&self, id: &str) -> Result<bool> {
        let mut timelines = self.timelines.write().await;
        Ok(timelines.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl ActionStorage for InMemoryStorage {
    async fn get_action(&self, id: &ActionId) -> Result<Option<Action>> {
        let actions = self.actions.read().await;
        Ok(actions.iter().find(|a| &a.id == id).cloned())
    }

    async fn save_actions(&self, actions: &[Action]) -> Result<()> {
        let mut stored = self.actions.write().await;
        *stored = actions.to_vec();
        Ok(())
    }

    async fn list_actions(&self) -> Result<Vec<Action>> {
        let actions = self.actions.read().await;
        Ok(actions.clone())
    }
}
