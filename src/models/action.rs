// Action models - persisted intents to mutate a rundown

//! # Action Models
//!
//! An `Action` is generated by the blueprint, persisted, and executed later on
//! demand by an operator or automation. It never changes once stored; each
//! execution materializes fresh parts/pieces from the templates it carries.
//!
//! The variant is carried as an explicit `type` tag in the serialized form and
//! as an enum discriminant in memory, so dispatch is an exhaustive `match`.

use serde::{Deserialize, Serialize};

use super::ids::{ActionId, PartId, PieceId, SegmentId};
use super::rundown::{Part, PartTransition, Piece};

/// Template for a piece created by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceTemplate {
    /// Base id; executions append a unique suffix
    pub id: String,

    pub name: String,

    pub layer: String,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default)]
    pub allow_overlap: bool,
}

impl PieceTemplate {
    /// Build a concrete piece with the given id
    pub fn materialize(&self, id: PieceId) -> Piece {
        Piece {
            id,
            name: self.name.clone(),
            layer: self.layer.clone(),
            content: self.content.clone(),
            executed_at: None,
            stopped_at: None,
            allow_overlap: self.allow_overlap,
            dynamically_inserted: true,
        }
    }
}

/// Template for a part created by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTemplate {
    /// Base id; executions append a unique suffix
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_transition: Option<PartTransition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,

    #[serde(default)]
    pub autonext: bool,
}

impl PartTemplate {
    /// Build a concrete part carrying `pieces`
    ///
    /// Segment and rank are placeholders; the rundown service decides where
    /// the part lands.
    pub fn materialize(&self, id: PartId, pieces: Vec<Piece>) -> Part {
        Part {
            id,
            segment_id: SegmentId::new(""),
            rank: 0.0,
            title: self.title.clone(),
            pieces,
            in_transition: self.in_transition.clone(),
            expected_duration_ms: self.expected_duration_ms,
            autonext: self.autonext,
            taken_at: None,
            dynamically_inserted: true,
        }
    }
}

/// The concrete mutation an action performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    InsertPartAsNext {
        part: PartTemplate,
        #[serde(default)]
        pieces: Vec<PieceTemplate>,
    },
    InsertPartAsOnAir {
        part: PartTemplate,
        #[serde(default)]
        pieces: Vec<PieceTemplate>,
    },
    InsertPieceAsOnAir {
        piece: PieceTemplate,
        #[serde(default)]
        layers_to_stop: Vec<String>,
    },
    InsertPieceAsNext {
        piece: PieceTemplate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_transition: Option<PartTransition>,
    },
}

impl ActionKind {
    /// Variant name, used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::InsertPartAsNext { .. } => "InsertPartAsNext",
            ActionKind::InsertPartAsOnAir { .. } => "InsertPartAsOnAir",
            ActionKind::InsertPieceAsOnAir { .. } => "InsertPieceAsOnAir",
            ActionKind::InsertPieceAsNext { .. } => "InsertPieceAsNext",
        }
    }
}

/// A persisted, abstract intent to mutate rundown structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,

    pub name: String,

    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new<S: Into<String>>(id: impl Into<ActionId>, name: S, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_deserializes_by_tag() {
        let action: Action = serde_json::from_value(json!({
            "id": "lower-third",
            "name": "Lower third",
            "type": "InsertPieceAsOnAir",
            "piece": {"id": "lt", "name": "Name strap", "layer": "gfx_lower"},
            "layers_to_stop": ["gfx_full"]
        }))
        .unwrap();

        assert_eq!(action.kind.name(), "InsertPieceAsOnAir");
        match action.kind {
            ActionKind::InsertPieceAsOnAir { piece, layers_to_stop } => {
                assert_eq!(piece.layer, "gfx_lower");
                assert_eq!(layers_to_stop, vec!["gfx_full".to_string()]);
            }
            other => panic!("unexpected variant {}", other.name()),
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result: Result<Action, _> = serde_json::from_value(json!({
            "id": "x",
            "name": "x",
            "type": "DeleteEverything"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_materialize_marks_dynamic() {
        let template = PartTemplate {
            id: "break".to_string(),
            title: "Break".to_string(),
            in_transition: None,
            expected_duration_ms: Some(30_000),
            autonext: true,
        };
        let piece = PieceTemplate {
            id: "bumper".to_string(),
            name: "Bumper".to_string(),
            layer: "vt".to_string(),
            content: json!({"clip": "bumper.mxf"}),
            allow_overlap: false,
        }
        .materialize(PieceId::from("bumper_1"));

        let part = template.materialize(PartId::from("break_1"), vec![piece]);
        assert!(part.dynamically_inserted);
        assert!(part.pieces[0].dynamically_inserted);
        assert_eq!(part.expected_duration_ms, Some(30_000));
        assert!(part.autonext);
        assert_eq!(part.pieces[0].content["clip"], "bumper.mxf");
    }
}
