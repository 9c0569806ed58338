//! Newline-delimited JSON framing for the wire protocol.
//!
//! Every message on the wire is one JSON object followed by a single `\n`:
//!
//! ```text
//! {"type":"<KIND>","payload":{...}}\n
//! ```
//!
//! JSON string escaping guarantees an encoded record never contains a raw
//! newline. A missing or `null` payload decodes as an empty mapping.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{MAX_RECORD_BYTES, Message, MessageKind, Payload, ProtocolError};

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "type")]
    kind: MessageKind,
    payload: &'a Payload,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// Encode `msg` as one newline-terminated record.
///
/// # Example
///
/// ```
/// use serpent_gym::framing::encode;
/// use serpent_gym::protocol::Message;
///
/// let line = encode(&Message::action(1)).unwrap();
/// assert_eq!(line, "{\"type\":\"ACTION\",\"payload\":{\"action\":1}}\n");
/// ```
pub fn encode(msg: &Message) -> Result<String, ProtocolError> {
    let wire = WireOut {
        kind: msg.kind(),
        payload: msg.payload(),
    };
    let mut line =
        serde_json::to_string(&wire).map_err(|e| ProtocolError::MalformedRecord(e.to_string()))?;
    line.push('\n');
    if line.len() > MAX_RECORD_BYTES {
        return Err(ProtocolError::RecordTooLarge {
            size: line.len(),
            max: MAX_RECORD_BYTES,
        });
    }
    Ok(line)
}

/// Decode one record. A trailing `\n` or `\r\n` is ignored.
pub fn decode(line: &str) -> Result<Message, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.len() > MAX_RECORD_BYTES {
        return Err(ProtocolError::RecordTooLarge {
            size: line.len(),
            max: MAX_RECORD_BYTES,
        });
    }
    let wire: WireIn =
        serde_json::from_str(line).map_err(|e| ProtocolError::MalformedRecord(e.to_string()))?;
    let kind = MessageKind::from_wire(&wire.kind).ok_or(ProtocolError::UnknownKind(wire.kind))?;
    let payload = match wire.payload {
        None | Some(Value::Null) => Payload::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ProtocolError::MalformedRecord(format!(
                "payload must be an object, got {other}"
            )));
        }
    };
    Ok(Message::new(kind, payload))
}

/// Read one message from a buffered stream.
///
/// Returns `Ok(None)` on a clean end of stream. Blank lines are skipped.
pub fn read_message(reader: &mut impl BufRead) -> Result<Option<Message>, ProtocolError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return decode(&line).map(Some);
        }
    }
}

/// Write one message and flush.
pub fn write_message(writer: &mut impl Write, msg: &Message) -> Result<(), ProtocolError> {
    let line = encode(msg)?;
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatePayload;
    use std::io::Cursor;

    fn sample_state() -> StatePayload {
        StatePayload {
            board: vec![vec![0, 1, 0], vec![0, 1, 2], vec![0, 1, 0]],
            reward: -0.21,
            done: false,
            head_x: 1,
            head_y: 0,
            snake_len: 3,
            food_x: 2,
            food_y: 1,
            direction: 0,
        }
    }

    #[test]
    fn roundtrip_every_kind() {
        let messages = [
            Message::state(&sample_state()),
            Message::action(3),
            Message::reset(),
            Message::init(20),
            Message::ping(),
        ];
        for msg in messages {
            let line = encode(&msg).unwrap();
            assert!(line.ends_with('\n'));
            assert_eq!(line.matches('\n').count(), 1);
            assert_eq!(decode(&line).unwrap(), msg);
        }
    }

    #[test]
    fn embedded_newlines_are_escaped() {
        let mut payload = Payload::new();
        payload.insert("note".into(), Value::String("a\nb".into()));
        let msg = Message::new(MessageKind::Ping, payload);
        let line = encode(&msg).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(decode(&line).unwrap(), msg);
    }

    #[test]
    fn missing_or_null_payload_is_empty() {
        let msg = decode(r#"{"type":"RESET"}"#).unwrap();
        assert_eq!(msg, Message::reset());
        let msg = decode(r#"{"type":"PING","payload":null}"#).unwrap();
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn crlf_is_tolerated() {
        let msg = decode("{\"type\":\"ACTION\",\"payload\":{\"action\":2}}\r\n").unwrap();
        assert_eq!(msg.action_value().unwrap(), 2);
    }

    #[test]
    fn unknown_kind() {
        let err = decode(r#"{"type":"QUIT","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(k) if k == "QUIT"));
    }

    #[test]
    fn malformed_records() {
        for line in [
            "not json at all",
            "{\"payload\":{}}",
            "{\"type\":5}",
            "[1,2,3]",
            "{\"type\":\"ACTION\",\"payload\":[1]}",
            "{\"type\":\"ACTION\"",
        ] {
            let err = decode(line).unwrap_err();
            assert!(
                matches!(err, ProtocolError::MalformedRecord(_)),
                "{line} gave {err:?}"
            );
        }
    }

    #[test]
    fn oversized_record_is_rejected() {
        let big = format!(
            "{{\"type\":\"PING\",\"payload\":{{\"x\":\"{}\"}}}}",
            "a".repeat(MAX_RECORD_BYTES)
        );
        assert!(matches!(
            decode(&big).unwrap_err(),
            ProtocolError::RecordTooLarge { .. }
        ));
    }

    #[test]
    fn stream_read_write_sequence() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::init(10)).unwrap();
        write_message(&mut buf, &Message::action(1)).unwrap();
        buf.extend_from_slice(b"\n");
        write_message(&mut buf, &Message::reset()).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_message(&mut cursor).unwrap(), Some(Message::init(10)));
        assert_eq!(read_message(&mut cursor).unwrap(), Some(Message::action(1)));
        assert_eq!(read_message(&mut cursor).unwrap(), Some(Message::reset()));
        assert_eq!(read_message(&mut cursor).unwrap(), None);
    }

    #[test]
    fn stream_read_reports_bad_record() {
        let mut cursor = Cursor::new(b"garbage\n".to_vec());
        assert!(matches!(
            read_message(&mut cursor),
            Err(ProtocolError::MalformedRecord(_))
        ));
    }
}
