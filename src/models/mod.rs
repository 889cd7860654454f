// Core domain models for the rundown engine
// These are the show-structure, action, configuration and timeline types

//! # Domain Models Module
//!
//! Plain data types shared by every engine component. Nothing in here talks to
//! storage or the blueprint; the engine layer owns all behaviour that needs
//! I/O. The only logic kept here is structural: show-order navigation on a
//! [`Rundown`] and template materialization on [`Action`] payloads.

// Typed string identifiers (RundownId, PartId, ...)
pub mod ids;

// Rundown, Segment, Part, Piece and the activation state
pub mod rundown;

// Action records and their part/piece templates
pub mod action;

// Studio and show-style configuration
pub mod config;

// Device timeline and the blueprint generation result
pub mod timeline;

pub use ids::{ActionId, PartId, PieceId, RundownId, SegmentId};

pub use rundown::{
    ActivationStatus, NextOwner, Part, PartTransition, PersistentState, Piece, Rundown, Segment,
};

pub use action::{Action, ActionKind, PartTemplate, PieceTemplate};

pub use config::{Configuration, LayerMapping, ShowStyleSettings, StudioSettings};

pub use timeline::{OnTimelineGenerateResult, Timeline, TimelineEnable, TimelineObject, TimelineStart};
