// ── Binary frame decoding ──
//
// After `enablebinstatusupdate` the Miniserver pushes every state change as
// two WebSocket binary messages: an 8-byte header, then the payload. This
// module is a pure function from those bytes to typed updates. Truncated
// records end decoding of the frame quietly; nothing here allocates more
// than the payload it was handed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state_id::{STATE_ID_LEN, StateId};

/// Length of a binary message header.
pub const HEADER_LEN: usize = 8;

/// First byte of every binary message header.
pub const HEADER_MARKER: u8 = 0x03;

/// `StateId` + little-endian `f64`.
const VALUE_RECORD_LEN: usize = STATE_ID_LEN + 8;

/// `StateId` + icon id + little-endian `u32` text length.
const TEXT_RECORD_HEAD_LEN: usize = STATE_ID_LEN * 2 + 4;

// ── Header ──────────────────────────────────────────────────────────

/// Message type carried in the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    BinaryFile,
    ValueStates,
    TextStates,
    DaytimerStates,
    OutOfService,
    Keepalive,
    WeatherStates,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Text,
            1 => Self::BinaryFile,
            2 => Self::ValueStates,
            3 => Self::TextStates,
            4 => Self::DaytimerStates,
            5 => Self::OutOfService,
            6 => Self::Keepalive,
            7 => Self::WeatherStates,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::BinaryFile => f.write_str("binary_file"),
            Self::ValueStates => f.write_str("value_states"),
            Self::TextStates => f.write_str("text_states"),
            Self::DaytimerStates => f.write_str("daytimer_states"),
            Self::OutOfService => f.write_str("out_of_service"),
            Self::Keepalive => f.write_str("keepalive"),
            Self::WeatherStates => f.write_str("weather_states"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

impl MessageType {
    /// Whether a payload message follows a header of this type.
    ///
    /// Out-of-service and keepalive notices are header-only.
    pub fn has_payload(self) -> bool {
        !matches!(self, Self::OutOfService | Self::Keepalive)
    }
}

/// Parsed 8-byte binary message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    /// The length below is only an estimate; an exact header follows.
    pub estimated: bool,
    /// Payload length as announced by the server.
    pub payload_len: u32,
}

impl MessageHeader {
    /// Parse a binary message as a header.
    ///
    /// Returns `None` unless the message is exactly 8 bytes and starts with
    /// the header marker.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let header: &[u8; HEADER_LEN] = raw.try_into().ok()?;
        if header[0] != HEADER_MARKER {
            return None;
        }
        Some(Self {
            message_type: MessageType::from(header[1]),
            estimated: header[2] & 0x01 != 0,
            payload_len: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
        })
    }
}

// ── Decoded records ─────────────────────────────────────────────────

/// The value of one state: a number or a text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Number(f64),
    Text(String),
}

impl StateValue {
    /// Whether `other` carries the same value.
    ///
    /// Numbers compare with exact IEEE equality, except that two NaNs are
    /// considered the same. Values of different kinds are never the same.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

/// Numbers always show their fractional part (`1.0`, `21.5`), so a
/// whole-valued analog reading never looks like an integer.
impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for StateValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// One decoded state update, before filtering and name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdate {
    pub id: StateId,
    pub value: StateValue,
}

// ── Decoder ─────────────────────────────────────────────────────────

/// Decode a header/payload pair into state updates.
///
/// Only value-state (type 2) and text-state (type 3) frames produce
/// updates; every other type decodes to nothing.
pub fn decode(header: &[u8; HEADER_LEN], payload: &[u8]) -> Vec<RawUpdate> {
    match MessageType::from(header[1]) {
        MessageType::ValueStates => decode_value_states(payload),
        MessageType::TextStates => decode_text_states(payload),
        other => {
            tracing::trace!(message_type = %other, "Ignoring non-state frame");
            Vec::new()
        }
    }
}

/// Decode a type-2 payload: repeated `StateId` + `f64` records.
pub fn decode_value_states(payload: &[u8]) -> Vec<RawUpdate> {
    let records = payload.chunks_exact(VALUE_RECORD_LEN);
    let trailing = records.remainder().len();
    if trailing > 0 {
        tracing::debug!(trailing, "Discarding truncated value-state record");
    }

    records
        .filter_map(|record| {
            let (id_bytes, value_bytes) = record.split_at(STATE_ID_LEN);
            let id = StateId::from_wire_slice(id_bytes)?;
            let value = f64::from_le_bytes(value_bytes.try_into().ok()?);
            Some(RawUpdate {
                id,
                value: StateValue::Number(value),
            })
        })
        .collect()
}

/// Decode a type-3 payload: repeated `StateId` + icon id + length-prefixed,
/// 4-byte-padded UTF-8 text records.
pub fn decode_text_states(payload: &[u8]) -> Vec<RawUpdate> {
    let mut updates = Vec::new();
    let mut rest = payload;

    while rest.len() >= TEXT_RECORD_HEAD_LEN {
        let (head, body) = rest.split_at(TEXT_RECORD_HEAD_LEN);
        let Some(id) = StateId::from_wire_slice(head) else {
            break;
        };
        let len_bytes = [head[32], head[33], head[34], head[35]];
        let Some(text_len) = usize::try_from(u32::from_le_bytes(len_bytes)).ok() else {
            break;
        };

        // The length field is untrusted: check it against what is left
        // before touching the body.
        let Some(padded_len) = text_len.checked_next_multiple_of(4) else {
            break;
        };
        if padded_len > body.len() {
            tracing::debug!(
                text_len,
                remaining = body.len(),
                "Text-state record overruns frame, stopping"
            );
            break;
        }

        let text = String::from_utf8_lossy(&body[..text_len]);
        updates.push(RawUpdate {
            id,
            value: StateValue::Text(text.trim_end_matches('\0').to_owned()),
        });
        rest = &body[padded_len..];
    }

    updates
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn id(n: u8) -> StateId {
        StateId::from_wire([n; 16])
    }

    fn header(kind: u8) -> [u8; HEADER_LEN] {
        [HEADER_MARKER, kind, 0, 0, 0, 0, 0, 0]
    }

    fn value_record(n: u8, value: f64) -> Vec<u8> {
        let mut out = id(n).to_wire().to_vec();
        out.extend_from_slice(&value.to_le_bytes());
        out
    }

    fn text_record(n: u8, text: &[u8]) -> Vec<u8> {
        let mut out = id(n).to_wire().to_vec();
        out.extend_from_slice(&[0xAA; 16]);
        out.extend_from_slice(&u32::try_from(text.len()).unwrap().to_le_bytes());
        out.extend_from_slice(text);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    #[test]
    fn parses_header_fields() {
        let raw = [HEADER_MARKER, 2, 0x01, 0, 0x30, 0, 0, 0];
        let parsed = MessageHeader::parse(&raw).unwrap();
        assert_eq!(parsed.message_type, MessageType::ValueStates);
        assert!(parsed.estimated);
        assert_eq!(parsed.payload_len, 0x30);
    }

    #[test]
    fn header_requires_marker_and_length() {
        assert!(MessageHeader::parse(&[0x01, 2, 0, 0, 0, 0, 0, 0]).is_none());
        assert!(MessageHeader::parse(&[HEADER_MARKER, 2, 0, 0, 0, 0, 0]).is_none());
        assert!(MessageHeader::parse(&[HEADER_MARKER, 2, 0, 0, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn keepalive_has_no_payload() {
        assert!(!MessageType::Keepalive.has_payload());
        assert!(!MessageType::OutOfService.has_payload());
        assert!(MessageType::ValueStates.has_payload());
        assert_eq!(MessageType::from(42), MessageType::Unknown(42));
    }

    #[test]
    fn decodes_value_states_in_order() {
        let mut payload = value_record(1, 1.0);
        payload.extend(value_record(2, -2.5));
        payload.extend(value_record(3, 100.25));

        let updates = decode(&header(2), &payload);

        assert_eq!(
            updates,
            vec![
                RawUpdate { id: id(1), value: StateValue::Number(1.0) },
                RawUpdate { id: id(2), value: StateValue::Number(-2.5) },
                RawUpdate { id: id(3), value: StateValue::Number(100.25) },
            ]
        );
    }

    #[test]
    fn truncated_value_frame_keeps_whole_records() {
        let mut payload = value_record(1, 1.0);
        payload.extend(value_record(2, 2.0));
        payload.extend([0xFF; 10]);

        let updates = decode(&header(2), &payload);
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn decodes_padded_text_state() {
        let record = text_record(7, b"hello");
        assert_eq!(record.len(), 36 + 8);

        let updates = decode(&header(3), &record);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, id(7));
        assert_eq!(updates[0].value, StateValue::Text("hello".into()));
    }

    #[test]
    fn text_length_on_four_byte_boundary_has_no_padding() {
        let mut payload = text_record(1, b"abcd");
        payload.extend(text_record(2, b"xy"));

        let updates = decode_text_states(&payload);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].value.as_text(), Some("abcd"));
        assert_eq!(updates[1].value.as_text(), Some("xy"));
    }

    #[test]
    fn strips_trailing_nuls_from_text() {
        let updates = decode_text_states(&text_record(1, b"on\0\0"));
        assert_eq!(updates[0].value.as_text(), Some("on"));
    }

    #[test]
    fn empty_text_decodes_to_empty_string() {
        let updates = decode_text_states(&text_record(1, b""));
        assert_eq!(updates[0].value.as_text(), Some(""));
    }

    #[test]
    fn oversized_text_length_stops_decoding() {
        let mut payload = text_record(1, b"ok");
        let mut bogus = id(2).to_wire().to_vec();
        bogus.extend_from_slice(&[0; 16]);
        bogus.extend_from_slice(&u32::MAX.to_le_bytes());
        bogus.extend_from_slice(b"abcd");
        payload.extend(bogus);

        let updates = decode_text_states(&payload);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value.as_text(), Some("ok"));
    }

    #[test]
    fn other_frame_types_decode_to_nothing() {
        let payload = value_record(1, 1.0);
        assert!(decode(&header(0), &payload).is_empty());
        assert!(decode(&header(7), &payload).is_empty());
    }

    #[test]
    fn nan_is_same_as_nan() {
        let a = StateValue::Number(f64::NAN);
        assert!(a.same_as(&StateValue::Number(f64::NAN)));
        assert!(!StateValue::Number(1.0).same_as(&StateValue::Text("1".into())));
    }

    #[test]
    fn whole_numbers_display_with_fraction() {
        assert_eq!(StateValue::Number(1.0).to_string(), "1.0");
        assert_eq!(StateValue::Number(0.0).to_string(), "0.0");
        assert_eq!(StateValue::Number(21.5).to_string(), "21.5");
        assert_eq!(StateValue::Text("1".into()).to_string(), "1");
    }
}
