// Ingest change reactor - keeps local rundowns in step with the newsroom system

//! # Ingest Change Reactor
//!
//! Rundown structure is authored upstream (a newsroom system, a spreadsheet,
//! a scheduling tool). Whenever something changes there, a notification
//! arrives on the [`ChangeFeed`]. The reactor re-fetches the whole rundown
//! from the [`IngestSource`] and hands it to
//! [`RundownService::apply_ingest_update`], which merges it with live state,
//! regenerates the timeline, and announces the update.
//!
//! ```text
//!  ChangeFeed ──► IngestChangeReactor ──► IngestSource::fetch_rundown
//!                        │
//!                        └──► RundownService::apply_ingest_update
//!                                   │
//!                                   ├─► timeline rebuilt + persisted
//!                                   └─► RundownUpdated / TimelineUpdated
//! ```
//!
//! ## Rust Learning Notes:
//!
//! ### Boxed streams as a trait seam
//! `ChangeFeed::subscribe` returns `BoxStream<'static, IngestChange>`. The
//! in-memory feed wraps a broadcast receiver in `BroadcastStream`; a message
//! queue consumer would return its own stream type behind the same box.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

use super::rundown::RundownService;
use crate::models::{PartId, Rundown, RundownId, SegmentId};
use crate::{Result, RundownError};

/// Which entity changed upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum ChangedEntity {
    Rundown,
    Segment(SegmentId),
    Part(PartId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Updated,
    Removed,
}

/// One upstream change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestChange {
    pub rundown_id: RundownId,
    pub entity: ChangedEntity,
    pub kind: ChangeKind,
}

impl IngestChange {
    pub fn rundown(rundown_id: RundownId, kind: ChangeKind) -> Self {
        Self {
            rundown_id,
            entity: ChangedEntity::Rundown,
            kind,
        }
    }
}

/// Read side of the upstream system
#[async_trait::async_trait]
pub trait IngestSource: Send + Sync {
    async fn fetch_rundown(&self, id: &RundownId) -> Result<Option<Rundown>>;
}

/// Push notifications of upstream structural change
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> BoxStream<'static, IngestChange>;
}

/// Asks the upstream system to re-pull a rundown from where it was authored
#[async_trait::async_trait]
pub trait IngestGateway: Send + Sync {
    async fn reload_ingest_data(&self, id: &RundownId) -> Result<()>;
}

/// In-process upstream for tests and the standalone server
pub struct InMemoryIngest {
    rundowns: RwLock<HashMap<RundownId, Rundown>>,
    changes: broadcast::Sender<IngestChange>,
    reloads: AtomicUsize,
}

impl InMemoryIngest {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            rundowns: RwLock::new(HashMap::new()),
            changes,
            reloads: AtomicUsize::new(0),
        }
    }

    /// Store a rundown and announce it as updated
    pub async fn upsert_rundown(&self, rundown: Rundown) {
        let id = rundown.id.clone();
        self.rundowns.write().await.insert(id.clone(), rundown);
        self.notify(IngestChange::rundown(id, ChangeKind::Updated));
    }

    /// Drop a rundown and announce its removal
    pub async fn remove_rundown(&self, id: &RundownId) -> bool {
        let removed = self.rundowns.write().await.remove(id).is_some();
        if removed {
            self.notify(IngestChange::rundown(id.clone(), ChangeKind::Removed));
        }
        removed
    }

    pub fn notify(&self, change: IngestChange) {
        // Nobody listening is fine
        let _ = self.changes.send(change);
    }

    pub fn reload_requests(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryIngest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IngestSource for InMemoryIngest {
    async fn fetch_rundown(&self, id: &RundownId) -> Result<Option<Rundown>> {
        Ok(self.rundowns.read().await.get(id).cloned())
    }
}

impl ChangeFeed for InMemoryIngest {
    fn subscribe(&self) -> BoxStream<'static, IngestChange> {
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(|item| async move {
                match item {
                    Ok(change) => Some(change),
                    Err(e) => {
                        warn!(error = %e, "Ingest change feed lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

#[async_trait::async_trait]
impl IngestGateway for InMemoryIngest {
    async fn reload_ingest_data(&self, id: &RundownId) -> Result<()> {
        if !self.rundowns.read().await.contains_key(id) {
            return Err(RundownError::NotFound(format!("Rundown {} upstream", id)));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct IngestChangeReactor {
    source: Arc<dyn IngestSource>,
    feed: Arc<dyn ChangeFeed>,
    gateway: Arc<dyn IngestGateway>,
    rundowns: Arc<dyn RundownService>,
}

impl IngestChangeReactor {
    pub fn new(
        source: Arc<dyn IngestSource>,
        feed: Arc<dyn ChangeFeed>,
        gateway: Arc<dyn IngestGateway>,
        rundowns: Arc<dyn RundownService>,
    ) -> Self {
        Self {
            source,
            feed,
            gateway,
            rundowns,
        }
    }

    /// Subscribe now and process changes on a background task
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let stream = self.feed.subscribe();
        tokio::spawn(async move { self.run(stream).await })
    }

    /// Process changes until the feed ends
    pub async fn run(&self, mut stream: BoxStream<'static, IngestChange>) {
        info!("Ingest change reactor started");
        while let Some(change) = stream.next().await {
            if let Err(e) = self.handle_change(&change).await {
                error!(
                    rundown_id = %change.rundown_id,
                    entity = ?change.entity,
                    error = %e,
                    "Failed to apply ingest change"
                );
            }
        }
        info!("Ingest change feed closed");
    }

    /// Apply one upstream change
    ///
    /// Segment and part changes re-fetch the whole rundown. A rundown that no
    /// longer exists upstream is deleted locally.
    pub async fn handle_change(&self, change: &IngestChange) -> Result<()> {
        debug!(rundown_id = %change.rundown_id, entity = ?change.entity, kind = ?change.kind, "Ingest change");

        if change.entity == ChangedEntity::Rundown && change.kind == ChangeKind::Removed {
            return self.remove_local(&change.rundown_id).await;
        }

        match self.source.fetch_rundown(&change.rundown_id).await? {
            Some(rundown) => {
                self.rundowns.apply_ingest_update(rundown).await?;
                Ok(())
            }
            None => self.remove_local(&change.rundown_id).await,
        }
    }

    /// Ask upstream to re-pull the rundown, then replace the local copy
    pub async fn reload_from_source(&self, id: &RundownId) -> Result<Rundown> {
        self.gateway.reload_ingest_data(id).await?;
        let rundown = self
            .source
            .fetch_rundown(id)
            .await?
            .ok_or_else(|| RundownError::NotFound(format!("Rundown {} upstream", id)))?;

        info!(rundown_id = %id, "Rundown reloaded from source");
        self.rundowns.apply_ingest_update(rundown).await
    }

    async fn remove_local(&self, id: &RundownId) -> Result<()> {
        match self.rundowns.delete_rundown(id).await {
            Ok(()) | Err(RundownError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
