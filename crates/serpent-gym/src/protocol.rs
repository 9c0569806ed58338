//! Message types exchanged between the arena host and its peer.
//!
//! Every message is a `kind` plus a flat payload mapping. On the wire it is
//! one JSON object per line (see [`framing`](crate::framing)):
//!
//! ```text
//! {"type":"STATE","payload":{"board":[[0,1,...],...],"reward":0.19,...}}
//! {"type":"ACTION","payload":{"action":2}}
//! {"type":"RESET","payload":{}}
//! {"type":"INIT","payload":{"board_size":20}}
//! {"type":"PING","payload":{}}
//! ```
//!
//! Directions and actions use the order 0 Up, 1 Down, 2 Left, 3 Right (see
//! [`Direction`](serpent_core::types::Direction)). Agents built for a
//! clockwise 0 Up, 1 Right, 2 Down, 3 Left encoding must remap both the
//! `direction` field and their `ACTION` values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serpent_env::arena::ArenaSnapshot;
use thiserror::Error;

/// Upper bound on a single encoded record, newline included.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Value sent in place of a coordinate or code that is out of range.
pub const OUT_OF_RANGE: i64 = -1;

/// Payload mapping. Keys are field names, values are JSON values.
pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// Errors produced while encoding, decoding or interpreting messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Unknown message kind: {0:?}")]
    UnknownKind(String),

    #[error("{kind} payload is missing field {field:?} or it has the wrong type")]
    MissingField { kind: MessageKind, field: String },

    #[error("Record of {size} bytes exceeds the {max} byte limit")]
    RecordTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    State,
    Action,
    Reset,
    Init,
    Ping,
}

impl MessageKind {
    pub const ALL: [Self; 5] = [Self::State, Self::Action, Self::Reset, Self::Init, Self::Ping];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "STATE",
            Self::Action => "ACTION",
            Self::Reset => "RESET",
            Self::Init => "INIT",
            Self::Ping => "PING",
        }
    }

    /// Parse a wire name. Matching is exact.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StatePayload
// ---------------------------------------------------------------------------

/// Typed view of a `STATE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    /// `board[y][x]`: 0 empty, 1 occupant, 2 target.
    pub board: Vec<Vec<u8>>,
    pub reward: f64,
    pub done: bool,
    pub head_x: i64,
    pub head_y: i64,
    pub snake_len: i64,
    pub food_x: i64,
    pub food_y: i64,
    pub direction: i64,
}

impl StatePayload {
    /// Build from an arena snapshot, replacing anything out of range with
    /// [`OUT_OF_RANGE`].
    #[must_use]
    pub fn from_snapshot(snapshot: &ArenaSnapshot) -> Self {
        let size = snapshot.board_size();
        let coord = |v: i32| -> i64 {
            match usize::try_from(v) {
                Ok(u) if u < size => i64::from(v),
                _ => OUT_OF_RANGE,
            }
        };
        let head = snapshot.head();
        let direction = i64::from(snapshot.direction.index());
        Self {
            board: snapshot.board.to_rows(),
            reward: if snapshot.reward.is_finite() {
                snapshot.reward
            } else {
                -1.0
            },
            done: snapshot.done,
            head_x: coord(head.x),
            head_y: coord(head.y),
            snake_len: i64::try_from(snapshot.body_len()).unwrap_or(OUT_OF_RANGE),
            food_x: coord(snapshot.target.x),
            food_y: coord(snapshot.target.y),
            direction: if (0..4).contains(&direction) {
                direction
            } else {
                OUT_OF_RANGE
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An immutable protocol message.
///
/// # Example
///
/// ```
/// use serpent_gym::protocol::{Message, MessageKind};
///
/// let msg = Message::action(3);
/// assert_eq!(msg.kind(), MessageKind::Action);
/// assert_eq!(msg.action_value().unwrap(), 3);
/// assert!(Message::reset().payload().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageKind,
    payload: Payload,
}

impl Message {
    #[must_use]
    pub const fn new(kind: MessageKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    /// A message with an empty payload.
    #[must_use]
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Payload::new())
    }

    #[must_use]
    pub fn state(state: &StatePayload) -> Self {
        let payload = match serde_json::to_value(state) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        };
        Self::new(MessageKind::State, payload)
    }

    #[must_use]
    pub fn action(action: i64) -> Self {
        let mut payload = Payload::new();
        payload.insert("action".into(), action.into());
        Self::new(MessageKind::Action, payload)
    }

    #[must_use]
    pub fn reset() -> Self {
        Self::empty(MessageKind::Reset)
    }

    #[must_use]
    pub fn init(board_size: usize) -> Self {
        let mut payload = Payload::new();
        payload.insert("board_size".into(), board_size.into());
        Self::new(MessageKind::Init, payload)
    }

    #[must_use]
    pub fn ping() -> Self {
        Self::empty(MessageKind::Ping)
    }

    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    fn missing(&self, field: &str) -> ProtocolError {
        ProtocolError::MissingField {
            kind: self.kind,
            field: field.into(),
        }
    }

    /// Integer field. Floats with no fractional part are accepted.
    pub fn get_i64(&self, field: &str) -> Result<i64, ProtocolError> {
        let value = self.payload.get(field).ok_or_else(|| self.missing(field))?;
        if let Some(i) = value.as_i64() {
            return Ok(i);
        }
        match value.as_f64() {
            #[allow(clippy::cast_possible_truncation)]
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
            _ => Err(self.missing(field)),
        }
    }

    /// The `action` field of an `ACTION` message.
    pub fn action_value(&self) -> Result<i64, ProtocolError> {
        self.get_i64("action")
    }

    /// The `board_size` field of an `INIT` message.
    pub fn board_size(&self) -> Result<usize, ProtocolError> {
        let size = self.get_i64("board_size")?;
        usize::try_from(size).map_err(|_| self.missing("board_size"))
    }

    /// Decode a `STATE` payload.
    pub fn to_state(&self) -> Result<StatePayload, ProtocolError> {
        serde_json::from_value(Value::Object(self.payload.clone())).map_err(|e| {
            ProtocolError::MissingField {
                kind: self.kind,
                field: e.to_string(),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
