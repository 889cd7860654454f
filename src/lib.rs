// Rundown Engine - Rust Edition
// The control plane of a live-broadcast rundown automation system

//! # Rundown Engine Library
//!
//! This is the library crate for the rundown control plane. It tracks the
//! structure of a televised show (rundown → segments → parts → pieces),
//! mediates operator and automated mutations while the show is on air, and
//! synthesizes the device timeline that playout hardware consumes.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`Rundown`], [`Segment`], [`Part`], [`Piece`]: the show structure
//! - [`Action`]: a persisted intent to mutate a rundown
//! - [`Configuration`]: studio + show-style settings
//! - [`Timeline`]: the device-oriented schedule
//!
//! ### Engine
//!
//! #### [`RundownEngine`] - The State-Machine Authority
//!
//! The **only** writer of rundown structure. Every on-air/next change flows
//! through it, and operations on one rundown id are serialized.
//!
//! #### [`ThrottledRundownService`] - Live-Critical Guard
//!
//! Decorates any [`RundownService`] and rejects take/activation/reset calls
//! arriving inside the guard interval.
//!
//! #### [`BlueprintTimelineBuilder`] - Timeline Synthesis
//!
//! Builds the base timeline and, when a part is on air, lets the blueprint
//! enrich it and carry its persistent state to the next generation.
//!
//! #### [`ActionExecutionService`] / [`IngestChangeReactor`]
//!
//! Turn persisted actions and upstream change notifications into calls on the
//! rundown service.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the
//! internal module structure. Instead of
//! `use rundown_engine::models::rundown::Rundown`, users can write
//! `use rundown_engine::Rundown`.

// Core domain models (show structure, actions, configuration, timeline)
pub mod models;

// Engine implementations (rundown service, timeline builders, actions, ingest)
pub mod engine;

// Engine settings loaded from files and the environment
pub mod settings;

// Re-export core domain types for easy access
pub use models::{
    Action,            // Persisted mutation intent
    ActionId,          // Action identifier
    ActionKind,        // Discriminated action variants
    ActivationStatus,  // Inactive / Rehearsal / Active
    Configuration,     // Studio + show-style settings
    NextOwner,         // Who set the next pointer
    OnTimelineGenerateResult,
    Part,              // Unit of on-air content
    PartId,
    PersistentState,   // Blueprint-owned opaque state
    Piece,             // Playable element on one layer
    PieceId,
    Rundown,           // The show
    RundownId,
    Segment,
    SegmentId,
    Timeline,          // Device schedule
    TimelineObject,
};

// Re-export engine types for convenience
pub use engine::{
    actions::ActionExecutionService,
    blueprint::{Blueprint, ShowStyleBlueprint},
    clock::{Clock, ManualClock, SystemClock},
    config_cache::{ConfigurationCache, ConfigurationSource},
    events::{EngineEvent, EventBus},
    ingest::{IngestChangeReactor, InMemoryIngest},
    rundown::{RundownEngine, RundownService},
    storage::{ActionStorage, InMemoryStorage, RundownStorage},
    throttle::ThrottledRundownService,
    timeline::{BaseTimelineBuilder, BlueprintTimelineBuilder, TimelineBuilder},
};

pub use settings::EngineSettings;

// Core error types
// Using the `thiserror` crate to make error handling easier
use thiserror::Error;

/// Error conditions surfaced by the control plane
///
/// Every condition is returned to the immediate caller; mapping them onto a
/// transport status code is the presentation layer's job.
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements the `std::error::Error` trait
/// - `#[error("...")]` provides human-readable error messages
/// - `#[from]` enables automatic conversion from other error types with `?`
#[derive(Error, Debug)]
pub enum RundownError {
    /// Referenced rundown/segment/part/piece/action does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inserted part or piece reuses an id already present in the rundown
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Activation requested for a rundown that is already active
    #[error("Rundown already activated: {0}")]
    AlreadyActivated(String),

    /// Operation requires an active or rehearsing rundown
    #[error("Rundown not activated: {0}")]
    NotActivated(String),

    /// Operation must not be performed while the rundown is on air
    #[error("Rundown is active: {0}")]
    RundownIsActive(String),

    /// No next part available to take
    #[error("End of rundown: {0}")]
    EndOfRundown(String),

    /// Live-critical operation attempted inside the guard interval
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Action variant without an execution handler
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Configuration required for an operation is absent or malformed
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Storage and other collaborator failures
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for RundownError {
    fn from(err: config::ConfigError) -> Self {
        RundownError::Misconfiguration(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, RundownError>;
