//! Action model: the edit and protocol events exchanged between clients and
//! the server, plus their JSON text-frame codec.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Sequence number carried by an action that the server has not confirmed yet
pub const UNCONFIRMED_SEQ: i64 = -1;

/// Which family of clue lists a segment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Row,
    Band,
}

/// Variant-specific payload of an [`Action`], tagged by `kind` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionBody {
    JoinRoom {
        room_id: String,
        last_seen_seq: i64,
    },
    LeaveRoom {},
    SetCell {
        row: usize,
        col: usize,
        text: String,
    },
    ClearCell {
        row: usize,
        col: usize,
    },
    MarkSegment {
        list_kind: ListKind,
        list_index: usize,
        start: usize,
        end: usize,
    },
    ClearSegment {
        list_kind: ListKind,
        list_index: usize,
        at: usize,
    },
    SetCursor {
        row: usize,
        col: usize,
    },
}

/// Every discriminant the decoder accepts
pub const KNOWN_KINDS: [&str; 7] = [
    "joinRoom",
    "leaveRoom",
    "setCell",
    "clearCell",
    "markSegment",
    "clearSegment",
    "setCursor",
];

impl ActionBody {
    /// The wire discriminant of this variant
    pub fn kind(&self) -> &'static str {
        match self {
            ActionBody::JoinRoom { .. } => "joinRoom",
            ActionBody::LeaveRoom {} => "leaveRoom",
            ActionBody::SetCell { .. } => "setCell",
            ActionBody::ClearCell { .. } => "clearCell",
            ActionBody::MarkSegment { .. } => "markSegment",
            ActionBody::ClearSegment { .. } => "clearSegment",
            ActionBody::SetCursor { .. } => "setCursor",
        }
    }
}

/// Common header fields shared by every variant
#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    actor_id: Option<String>,
    sequence_number: i64,
}

/// One discrete edit or protocol event
///
/// `sequence_number` is [`UNCONFIRMED_SEQ`] until the server log assigns the
/// action its position; `actor_id` is `None` for actions the UI has not had
/// stamped with an identity yet.
#[derive(Debug, Clone)]
pub struct Action {
    pub actor_id: Option<String>,
    pub sequence_number: i64,
    pub body: ActionBody,
}

impl Action {
    /// An anonymous, unconfirmed action as submitted by the UI
    pub fn new(body: ActionBody) -> Self {
        Self {
            actor_id: None,
            sequence_number: UNCONFIRMED_SEQ,
            body,
        }
    }

    pub fn set_cell(row: usize, col: usize, text: impl Into<String>) -> Self {
        Self::new(ActionBody::SetCell {
            row,
            col,
            text: text.into(),
        })
    }

    pub fn clear_cell(row: usize, col: usize) -> Self {
        Self::new(ActionBody::ClearCell { row, col })
    }

    pub fn mark_segment(list_kind: ListKind, list_index: usize, start: usize, end: usize) -> Self {
        Self::new(ActionBody::MarkSegment {
            list_kind,
            list_index,
            start,
            end,
        })
    }

    pub fn clear_segment(list_kind: ListKind, list_index: usize, at: usize) -> Self {
        Self::new(ActionBody::ClearSegment {
            list_kind,
            list_index,
            at,
        })
    }

    pub fn set_cursor(row: usize, col: usize) -> Self {
        Self::new(ActionBody::SetCursor { row, col })
    }

    pub fn join_room(room_id: impl Into<String>, last_seen_seq: i64) -> Self {
        Self::new(ActionBody::JoinRoom {
            room_id: room_id.into(),
            last_seen_seq,
        })
    }

    pub fn leave_room() -> Self {
        Self::new(ActionBody::LeaveRoom {})
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_sequence(mut self, sequence_number: i64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// True once the server log has assigned this action a position
    pub fn is_confirmed(&self) -> bool {
        self.sequence_number >= 0
    }

    /// Grid edits that go through the log and the pending queue
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.body,
            ActionBody::SetCell { .. }
                | ActionBody::ClearCell { .. }
                | ActionBody::MarkSegment { .. }
                | ActionBody::ClearSegment { .. }
        )
    }

    /// Membership and cursor hints, exempt from sequencing and dedup
    pub fn is_presence(&self) -> bool {
        !self.is_mutation()
    }

    /// Encodes this action as one JSON text frame
    pub fn encode(&self) -> String {
        let mut fields = match serde_json::to_value(&self.body) {
            Ok(Value::Object(fields)) => fields,
            // An internally tagged enum of struct variants always serializes to an object.
            _ => Map::new(),
        };
        fields.insert(
            "actor_id".to_string(),
            self.actor_id
                .as_ref()
                .map_or(Value::Null, |id| Value::String(id.clone())),
        );
        fields.insert(
            "sequence_number".to_string(),
            Value::from(self.sequence_number),
        );
        Value::Object(fields).to_string()
    }

    /// Decodes one text frame
    ///
    /// The payload must be a JSON object with a known `kind`; the common header
    /// fields are type-checked before the variant fields are read.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let kind = match &value {
            Value::Object(fields) => match fields.get("kind") {
                Some(Value::String(kind)) => kind.clone(),
                Some(_) => return Err(DecodeError::MistypedKind),
                None => return Err(DecodeError::MissingKind),
            },
            _ => return Err(DecodeError::NotAnObject),
        };
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Err(DecodeError::UnknownKind(kind));
        }

        let header: Header = serde_json::from_value(value.clone()).map_err(|e| {
            DecodeError::InvalidField {
                kind: kind.clone(),
                reason: e.to_string(),
            }
        })?;
        let body: ActionBody =
            serde_json::from_value(value).map_err(|e| DecodeError::InvalidField {
                kind,
                reason: e.to_string(),
            })?;

        Ok(Self {
            actor_id: header.actor_id,
            sequence_number: header.sequence_number,
            body,
        })
    }
}

/// Compares actor, kind and variant fields exactly. Sequence numbers only
/// take part when both sides are confirmed, so a locally issued action equals
/// its confirmed echo.
impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        if self.actor_id != other.actor_id || self.body != other.body {
            return false;
        }
        self.sequence_number == UNCONFIRMED_SEQ
            || other.sequence_number == UNCONFIRMED_SEQ
            || self.sequence_number == other.sequence_number
    }
}

/// Why a text frame could not be turned into an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload is not an object")]
    NotAnObject,

    #[error("missing kind discriminant")]
    MissingKind,

    #[error("kind discriminant is not a string")]
    MistypedKind,

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} action: {reason}")]
    InvalidField { kind: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_kind_discriminant() {
        let action = Action::set_cell(1, 2, "Q").with_actor("abc");
        let value: Value = serde_json::from_str(&action.encode()).unwrap();

        assert_eq!(value["kind"], "setCell");
        assert_eq!(value["actor_id"], "abc");
        assert_eq!(value["sequence_number"], -1);
        assert_eq!(value["row"], 1);
        assert_eq!(value["col"], 2);
        assert_eq!(value["text"], "Q");
    }

    #[test]
    fn test_decode_mark_segment() {
        let raw = r#"{"kind":"markSegment","actor_id":"a1","sequence_number":4,
                      "list_kind":"band","list_index":2,"start":3,"end":9}"#;
        let action = Action::decode(raw).unwrap();

        assert_eq!(action.actor_id.as_deref(), Some("a1"));
        assert_eq!(action.sequence_number, 4);
        assert_eq!(
            action.body,
            ActionBody::MarkSegment {
                list_kind: ListKind::Band,
                list_index: 2,
                start: 3,
                end: 9,
            }
        );
    }

    #[test]
    fn test_decode_leave_room_without_actor() {
        let action = Action::decode(r#"{"kind":"leaveRoom","sequence_number":-1}"#).unwrap();
        assert_eq!(action.body, ActionBody::LeaveRoom {});
        assert!(action.actor_id.is_none());
        assert!(!action.is_confirmed());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let err = Action::decode(r#"{"kind":"markSegment","list_index":0}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { .. }));

        let err = Action::decode(
            r#"{"kind":"markSegment","sequence_number":-1,"list_index":0}"#,
        )
        .unwrap_err();
        match err {
            DecodeError::InvalidField { kind, .. } => assert_eq!(kind, "markSegment"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_mistyped_fields() {
        let raw = r#"{"kind":"setCell","sequence_number":-1,"row":"0","col":0,"text":"A"}"#;
        assert!(matches!(
            Action::decode(raw),
            Err(DecodeError::InvalidField { .. })
        ));

        let raw = r#"{"kind":"setCell","sequence_number":"7","row":0,"col":0,"text":"A"}"#;
        assert!(matches!(
            Action::decode(raw),
            Err(DecodeError::InvalidField { .. })
        ));

        let raw = r#"{"kind":"clearCell","sequence_number":-1,"row":-3,"col":0}"#;
        assert!(matches!(
            Action::decode(raw),
            Err(DecodeError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_envelopes() {
        assert!(matches!(
            Action::decode("{not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert_eq!(Action::decode("[1,2]"), Err(DecodeError::NotAnObject));
        assert_eq!(
            Action::decode(r#"{"sequence_number":-1}"#),
            Err(DecodeError::MissingKind)
        );
        assert_eq!(
            Action::decode(r#"{"kind":7,"sequence_number":-1}"#),
            Err(DecodeError::MistypedKind)
        );
        assert_eq!(
            Action::decode(r#"{"kind":"eraseEverything","sequence_number":-1}"#),
            Err(DecodeError::UnknownKind("eraseEverything".to_string()))
        );
    }

    #[test]
    fn test_decode_of_encoded_join() {
        let action = Action::join_room("room-1", 12).with_actor("me");
        let decoded = Action::decode(&action.encode()).unwrap();

        assert_eq!(decoded.kind(), "joinRoom");
        assert_eq!(decoded, action);
        assert_eq!(decoded.sequence_number, UNCONFIRMED_SEQ);
    }

    #[test]
    fn test_equality_ignores_unconfirmed_sequence() {
        let local = Action::set_cell(0, 0, "A").with_actor("me");
        let echo = local.clone().with_sequence(17);

        assert_eq!(local, echo);
        assert_eq!(echo, local);
    }

    #[test]
    fn test_equality_compares_confirmed_sequences() {
        let a = Action::set_cell(0, 0, "A").with_actor("me").with_sequence(3);
        let b = a.clone().with_sequence(4);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_equality_compares_actor_and_fields() {
        let a = Action::set_cell(0, 0, "A").with_actor("me");

        assert_ne!(a, Action::set_cell(0, 0, "A").with_actor("you"));
        assert_ne!(a, Action::set_cell(0, 0, "B").with_actor("me"));
        assert_ne!(a, Action::set_cell(0, 0, "A"));
        assert_ne!(a, Action::clear_cell(0, 0).with_actor("me"));
    }

    #[test]
    fn test_classification() {
        assert!(Action::set_cell(0, 0, "A").is_mutation());
        assert!(Action::clear_segment(ListKind::Row, 0, 1).is_mutation());
        assert!(Action::set_cursor(0, 0).is_presence());
        assert!(Action::join_room("r", -1).is_presence());
        assert!(Action::leave_room().is_presence());
    }
}
