// Rundown Engine
// Services that own, mutate and render rundowns

//! # Engine Module
//!
//! The engine sits between the domain models and the outside world
//! (operators, automation, the newsroom system, playout devices).
//!
//! ## Architecture Overview
//!
//! ```text
//!  ingest feed ──► IngestChangeReactor ─┐
//!                                       ▼
//!  operator ──► ThrottledRundownService ──► RundownEngine ──► RundownStorage
//!  actions  ──► ActionExecutionService ─────────┘   │
//!                                                   ▼
//!                                      BlueprintTimelineBuilder ──► Blueprint
//!                                                   │
//!                                                   ▼
//!                                     EventBus (timeline, take, actions)
//! ```
//!
//! ## Engine Components
//!
//! ### Rundown Service (`rundown` module)
//! - Lifecycle: activate, rehearse, deactivate, reset
//! - Takes and next-part selection
//! - Dynamic insertion of parts and pieces
//! - Per-rundown serialization of every mutation
//!
//! ### Timeline Pipeline (`timeline`, `blueprint` modules)
//! - Base timeline from rundown + studio mappings
//! - Blueprint enrichment with persistent state feedback
//!
//! ### Supporting Services
//! - `throttle`: guard for live-critical operations
//! - `actions`: action catalog and execution
//! - `ingest`: upstream change reactor
//! - `config_cache`: memoized configuration
//! - `events`: event bus
//! - `scheduler`, `autonext`: time-driven takes
//! - `storage`: persistence traits and the in-memory backend
//! - `clock`: injectable wall clock

/// Action catalog refresh and execution
pub mod actions;

/// Automatic takes for `autonext` parts
pub mod autonext;

/// Pluggable show-template strategy
pub mod blueprint;

pub mod clock;

/// Memoized studio/show-style configuration
pub mod config_cache;

/// Event bus for downstream consumers
pub mod events;

/// Upstream change reactor and ingest traits
pub mod ingest;

/// The rundown state machine
pub mod rundown;

pub mod scheduler;

/// Storage traits and the in-memory implementation
pub mod storage;

/// Guard against double-fired live operations
pub mod throttle;

/// Base and blueprint timeline builders
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{ActionExecutionService, IdGenerator};
pub use autonext::AutoNextDriver;
pub use blueprint::{Blueprint, ShowStyleBlueprint};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_cache::{
    ConfigurationCache, ConfigurationSource, FileConfigurationSource, StaticConfigurationSource,
};
pub use events::{EngineEvent, EventBus, EventEnvelope};
pub use ingest::{
    ChangeFeed, ChangeKind, ChangedEntity, InMemoryIngest, IngestChange, IngestChangeReactor,
    IngestGateway, IngestSource,
};
pub use rundown::{RundownEngine, RundownService};
pub use scheduler::CallbackScheduler;
pub use storage::{ActionStorage, InMemoryStorage, RundownStorage};
pub use throttle::ThrottledRundownService;
pub use timeline::{BaseTimelineBuilder, BlueprintTimelineBuilder, TimelineBuilder};
