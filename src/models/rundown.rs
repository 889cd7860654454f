// Rundown domain models - the structure of one show

//! # Rundown Models
//!
//! This module defines the show structure the engine controls:
//! - `Rundown`: the show, with its activation status and on-air/next pointers
//! - `Segment`: ordered grouping of parts
//! - `Part`: schedulable unit of on-air content
//! - `Piece`: playable element targeting one output layer
//!
//! ## Show Order
//!
//! Segments are ordered by `rank`, parts by `rank` within their segment. The
//! helpers here keep both vectors sorted so navigation ("what comes after the
//! part on air?") is a linear walk.
//!
//! ```text
//!  Rundown
//!   ├─ Segment (rank 0)
//!   │   ├─ Part (rank 0)  ← active
//!   │   └─ Part (rank 1)  ← next
//!   └─ Segment (rank 1)
//!       └─ Part (rank 0)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PartId, PieceId, RundownId, SegmentId};
use crate::{Result, RundownError};

/// Activation status of a rundown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    #[default]
    Inactive,
    Rehearsal,
    Active,
}

impl ActivationStatus {
    /// Active and rehearsal rundowns both drive playout
    pub fn is_activated(&self) -> bool {
        matches!(self, ActivationStatus::Active | ActivationStatus::Rehearsal)
    }
}

impl std::fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivationStatus::Inactive => "inactive",
            ActivationStatus::Rehearsal => "rehearsal",
            ActivationStatus::Active => "active",
        };
        write!(f, "{}", s)
    }
}

/// Who set the next pointer
///
/// An operator's explicit choice is not overwritten by automatic
/// recalculation when the engine is configured to respect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextOwner {
    Operator,
    Automation,
}

/// Blueprint-owned state carried across timeline generations
///
/// The engine stores and forwards this value without ever looking inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentState(pub serde_json::Value);

impl PersistentState {
    pub fn new(value: serde_json::Value) -> Self {
        PersistentState(value)
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Transition metadata played when a part goes on air
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTransition {
    /// Transition style understood by the blueprint/devices, e.g. "mix"
    pub kind: String,

    pub duration_ms: u64,

    #[serde(default)]
    pub content: serde_json::Value,
}

/// A playable element targeting one output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,

    pub name: String,

    /// Output layer this piece plays on
    pub layer: String,

    /// Device payload, opaque to the engine
    #[serde(default)]
    pub content: serde_json::Value,

    /// Set only at the moment the piece is put on air
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,

    /// Set when another piece pushes this one off its layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,

    /// Whether this piece may share its layer with other playing pieces
    #[serde(default)]
    pub allow_overlap: bool,

    /// Inserted by an action rather than ingest
    #[serde(default)]
    pub dynamically_inserted: bool,
}

impl Piece {
    pub fn new<S: Into<String>>(id: impl Into<PieceId>, name: S, layer: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            layer: layer.into(),
            content: serde_json::Value::Null,
            executed_at: None,
            stopped_at: None,
            allow_overlap: false,
            dynamically_inserted: false,
        }
    }

    /// A piece plays until something stops it
    pub fn is_playing(&self) -> bool {
        self.stopped_at.is_none()
    }
}

/// Unit of on-air content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,

    /// Owning segment; assigned when the part is placed in a rundown
    pub segment_id: SegmentId,

    pub rank: f64,

    pub title: String,

    #[serde(default)]
    pub pieces: Vec<Piece>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_transition: Option<PartTransition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,

    /// Take the following part automatically once `expected_duration_ms` elapses
    #[serde(default)]
    pub autonext: bool,

    /// When the part was last taken on air
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub dynamically_inserted: bool,
}

impl Part {
    pub fn new<S: Into<String>>(id: impl Into<PartId>, segment_id: impl Into<SegmentId>, rank: f64, title: S) -> Self {
        Self {
            id: id.into(),
            segment_id: segment_id.into(),
            rank,
            title: title.into(),
            pieces: Vec::new(),
            in_transition: None,
            expected_duration_ms: None,
            autonext: false,
            taken_at: None,
            dynamically_inserted: false,
        }
    }

    pub fn with_pieces(mut self, pieces: Vec<Piece>) -> Self {
        self.pieces = pieces;
        self
    }

    pub fn find_piece(&self, id: &PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| &p.id == id)
    }

    /// Stop every playing piece on the given layers
    ///
    /// Pieces flagged `allow_overlap` keep playing unless `force` is set.
    /// Returns the ids of the pieces that were stopped.
    pub fn stop_pieces_on_layers(&mut self, layers: &[String], now: DateTime<Utc>, force: bool) -> Vec<PieceId> {
        let mut stopped = Vec::new();
        for piece in self.pieces.iter_mut() {
            if !piece.is_playing() || !layers.iter().any(|l| l == &piece.layer) {
                continue;
            }
            if piece.allow_overlap && !force {
                continue;
            }
            piece.stopped_at = Some(now);
            stopped.push(piece.id.clone());
        }
        stopped
    }
}

/// Ordered grouping of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,

    pub rundown_id: RundownId,

    pub rank: f64,

    pub name: String,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Segment {
    pub fn new<S: Into<String>>(id: impl Into<SegmentId>, rundown_id: impl Into<RundownId>, rank: f64, name: S) -> Self {
        Self {
            id: id.into(),
            rundown_id: rundown_id.into(),
            rank,
            name: name.into(),
            parts: Vec::new(),
        }
    }

    /// Add a part, taking ownership of its segment id
    pub fn with_part(mut self, mut part: Part) -> Self {
        part.segment_id = self.id.clone();
        self.parts.push(part);
        self.parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        self
    }
}

/// The full structure of one show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    pub id: RundownId,

    pub name: String,

    #[serde(default)]
    pub segments: Vec<Segment>,

    #[serde(default)]
    pub activation: ActivationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_part_id: Option<PartId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_part_id: Option<PartId>,

    /// The part that was on air before the active one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_part_id: Option<PartId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_owner: Option<NextOwner>,

    /// Opaque blueprint state, forwarded verbatim between generations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_state: Option<PersistentState>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Rundown {
    pub fn new<S: Into<String>>(id: impl Into<RundownId>, name: S) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            segments: Vec::new(),
            activation: ActivationStatus::Inactive,
            active_part_id: None,
            next_part_id: None,
            previous_part_id: None,
            next_owner: None,
            persistent_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a segment, taking ownership of its rundown id
    pub fn with_segment(mut self, mut segment: Segment) -> Self {
        segment.rundown_id = self.id.clone();
        self.segments.push(segment);
        self.sort();
        self
    }

    /// Restore show order after structural edits
    pub fn sort(&mut self) {
        self.segments.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        for segment in self.segments.iter_mut() {
            segment.parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        }
    }

    /// All parts in show order
    pub fn parts_in_order(&self) -> impl Iterator<Item = &Part> {
        self.segments.iter().flat_map(|s| s.parts.iter())
    }

    pub fn first_part(&self) -> Option<&Part> {
        self.parts_in_order().next()
    }

    /// The part following `part_id` in show order, crossing segment boundaries
    pub fn part_after(&self, part_id: &PartId) -> Option<&Part> {
        self.parts_in_order()
            .skip_while(|p| &p.id != part_id)
            .nth(1)
    }

    pub fn find_segment(&self, id: &SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.id == id)
    }

    pub fn find_part(&self, id: &PartId) -> Option<&Part> {
        self.parts_in_order().find(|p| &p.id == id)
    }

    pub fn find_part_mut(&mut self, id: &PartId) -> Option<&mut Part> {
        self.segments
            .iter_mut()
            .flat_map(|s| s.parts.iter_mut())
            .find(|p| &p.id == id)
    }

    pub fn find_piece(&self, id: &PieceId) -> Option<&Piece> {
        self.parts_in_order().find_map(|p| p.find_piece(id))
    }

    pub fn active_part(&self) -> Option<&Part> {
        self.active_part_id.as_ref().and_then(|id| self.find_part(id))
    }

    pub fn next_part(&self) -> Option<&Part> {
        self.next_part_id.as_ref().and_then(|id| self.find_part(id))
    }

    pub fn previous_part(&self) -> Option<&Part> {
        self.previous_part_id.as_ref().and_then(|id| self.find_part(id))
    }

    /// Where "next" should land if nothing overrides it: after the active
    /// part, or the first part when nothing is on air.
    pub fn automatic_next(&self) -> Option<PartId> {
        match &self.active_part_id {
            Some(active) => self.part_after(active).map(|p| p.id.clone()),
            None => self.first_part().map(|p| p.id.clone()),
        }
    }

    /// Check that activated rundowns only point at parts they contain
    pub fn validate(&self) -> Result<()> {
        if !self.activation.is_activated() {
            return Ok(());
        }
        if let Some(active) = &self.active_part_id {
            if self.find_part(active).is_none() {
                return Err(RundownError::NotFound(format!(
                    "Active part {} is not part of rundown {}",
                    active, self.id
                )));
            }
        }
        if let Some(next) = &self.next_part_id {
            if self.find_part(next).is_none() {
                return Err(RundownError::NotFound(format!(
                    "Next part {} is not part of rundown {}",
                    next, self.id
                )));
            }
        }
        Ok(())
    }

    /// Fail with `AlreadyExists` if a piece with this id is anywhere in the rundown
    pub fn ensure_piece_id_free(&self, id: &PieceId) -> Result<()> {
        match self.find_piece(id) {
            Some(_) => Err(RundownError::AlreadyExists(format!(
                "Piece {} in rundown {}",
                id, self.id
            ))),
            None => Ok(()),
        }
    }

    /// Place `part` directly after `anchor` in the anchor's segment
    ///
    /// Without an anchor the part goes to the front of the first segment.
    /// The part's rank is chosen between its neighbours so nothing else moves.
    /// Part and piece ids must not already be used in the rundown.
    pub fn insert_part_after(&mut self, anchor: Option<&PartId>, mut part: Part) -> Result<PartId> {
        let rundown_id = self.id.clone();
        if self.find_part(&part.id).is_some() {
            return Err(RundownError::AlreadyExists(format!(
                "Part {} in rundown {}",
                part.id, rundown_id
            )));
        }
        for (idx, piece) in part.pieces.iter().enumerate() {
            self.ensure_piece_id_free(&piece.id)?;
            if part.pieces[..idx].iter().any(|p| p.id == piece.id) {
                return Err(RundownError::AlreadyExists(format!(
                    "Piece {} twice in part {}",
                    piece.id, part.id
                )));
            }
        }

        let segment = match anchor {
            Some(anchor_id) => self
                .segments
                .iter_mut()
                .find(|s| s.parts.iter().any(|p| &p.id == anchor_id))
                .ok_or_else(|| {
                    RundownError::NotFound(format!("Part {} in rundown {}", anchor_id, rundown_id))
                })?,
            None => self.segments.first_mut().ok_or_else(|| {
                RundownError::NotFound(format!("Rundown {} has no segments", rundown_id))
            })?,
        };

        let rank = match anchor {
            Some(anchor_id) => {
                let idx = segment
                    .parts
                    .iter()
                    .position(|p| &p.id == anchor_id)
                    .unwrap_or(0);
                let anchor_rank = segment.parts[idx].rank;
                match segment.parts.get(idx + 1) {
                    Some(following) => (anchor_rank + following.rank) / 2.0,
                    None => anchor_rank + 1.0,
                }
            }
            None => segment.parts.first().map(|p| p.rank - 1.0).unwrap_or(0.0),
        };

        part.segment_id = segment.id.clone();
        part.rank = rank;
        let id = part.id.clone();
        segment.parts.push(part);
        segment.parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        Ok(id)
    }

    /// Return the rundown to its pre-show baseline
    ///
    /// Drops action-inserted parts and pieces, clears every execution stamp,
    /// the pointers and the blueprint state.
    pub fn reset_to_baseline(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.parts.retain(|p| !p.dynamically_inserted);
            for part in segment.parts.iter_mut() {
                part.taken_at = None;
                part.pieces.retain(|p| !p.dynamically_inserted);
                for piece in part.pieces.iter_mut() {
                    piece.executed_at = None;
                    piece.stopped_at = None;
                }
            }
        }
        self.active_part_id = None;
        self.next_part_id = None;
        self.previous_part_id = None;
        self.next_owner = None;
        self.persistent_state = None;
    }
}
