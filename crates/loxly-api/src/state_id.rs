// ── State identifiers ──
//
// The Miniserver names every observable value stream with a 128-bit id.
// Binary frames carry it as 16 raw bytes whose first three fields are
// little-endian; the structure document spells it as text. Both sources
// are folded into one `StateId` so map lookups never miss on formatting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of bytes a `StateId` occupies on the wire.
pub const STATE_ID_LEN: usize = 16;

/// A parse failure for a textual state identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid state id '{input}'")]
pub struct StateIdParseError {
    pub input: String,
}

/// Canonical identifier of one observable state.
///
/// Displays in the standard `8-4-4-4-12` grouping. The controller's own
/// `8-4-4-16` spelling is available through [`wire_string`](Self::wire_string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateId(Uuid);

impl StateId {
    /// Decode the 16-byte wire representation.
    pub fn from_wire(bytes: [u8; STATE_ID_LEN]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Decode from the head of a slice. Returns `None` if fewer than 16 bytes remain.
    pub fn from_wire_slice(bytes: &[u8]) -> Option<Self> {
        let head: [u8; STATE_ID_LEN] = bytes.get(..STATE_ID_LEN)?.try_into().ok()?;
        Some(Self::from_wire(head))
    }

    /// Encode back into the 16-byte wire representation.
    pub fn to_wire(&self) -> [u8; STATE_ID_LEN] {
        self.0.to_bytes_le()
    }

    /// Parse either the canonical `8-4-4-4-12` form or the controller's
    /// `8-4-4-16` form. Hex digits are accepted in any case.
    pub fn parse(input: &str) -> Result<Self, StateIdParseError> {
        let err = || StateIdParseError {
            input: input.to_owned(),
        };
        let trimmed = input.trim();
        let parts: Vec<&str> = trimmed.split('-').collect();

        let canonical = match parts.as_slice() {
            [a, b, c, d] if a.len() == 8 && b.len() == 4 && c.len() == 4 && d.len() == 16 => {
                let (d_head, d_tail) = d.split_at(4);
                format!("{a}-{b}-{c}-{d_head}-{d_tail}")
            }
            [a, b, c, d, e]
                if a.len() == 8 && b.len() == 4 && c.len() == 4 && d.len() == 4 && e.len() == 12 =>
            {
                trimmed.to_owned()
            }
            _ => return Err(err()),
        };

        Uuid::parse_str(&canonical).map(Self).map_err(|_| err())
    }

    /// Render in the controller's `8-4-4-16` grouping.
    pub fn wire_string(&self) -> String {
        let (d1, d2, d3, d4) = self.0.as_fields();
        format!("{d1:08x}-{d2:04x}-{d3:04x}-{}", hex::encode(d4))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for StateId {
    type Err = StateIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StateId {
    type Error = StateIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<StateId> for String {
    fn from(id: StateId) -> Self {
        id.to_string()
    }
}

impl From<Uuid> for StateId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WIRE: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];

    #[test]
    fn from_wire_reads_little_endian_fields() {
        let id = StateId::from_wire(WIRE);
        assert_eq!(id.to_string(), "03020100-0504-0706-0809-0a0b0c0d0e0f");
        assert_eq!(id.wire_string(), "03020100-0504-0706-08090a0b0c0d0e0f");
    }

    #[test]
    fn wire_bytes_round_trip() {
        let id = StateId::from_wire(WIRE);
        assert_eq!(id.to_wire(), WIRE);
    }

    #[test]
    fn both_text_forms_parse_to_same_id() {
        let canonical = StateId::parse("0f2b3c4d-1a2b-03c4-ffff0403f1e8a5b1").unwrap();
        let standard = StateId::parse("0f2b3c4d-1a2b-03c4-ffff-0403f1e8a5b1").unwrap();
        assert_eq!(canonical, standard);
    }

    #[test]
    fn canonical_string_round_trips_through_wire_bytes() {
        let text = "1a2b3c4d-0001-0002-a1b2-c3d4e5f60718";
        let id = StateId::parse(text).unwrap();
        let back = StateId::from_wire(id.to_wire());
        assert_eq!(back.to_string(), text);
    }

    #[test]
    fn parse_is_case_insensitive() {
        let lower = StateId::parse("0f2b3c4d-1a2b-03c4-ffff0403f1e8a5b1").unwrap();
        let upper = StateId::parse("0F2B3C4D-1A2B-03C4-FFFF0403F1E8A5B1").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(StateId::parse("not-a-uuid").is_err());
        assert!(StateId::parse("0f2b3c4d-1a2b-03c4-ffff0403f1e8a5").is_err());
        assert!(StateId::parse("zzzzzzzz-1a2b-03c4-ffff-0403f1e8a5b1").is_err());
    }

    #[test]
    fn from_wire_slice_needs_sixteen_bytes() {
        assert!(StateId::from_wire_slice(&WIRE[..15]).is_none());
        assert_eq!(
            StateId::from_wire_slice(&WIRE),
            Some(StateId::from_wire(WIRE))
        );
    }

    #[test]
    fn serde_uses_canonical_string() {
        let id = StateId::from_wire(WIRE);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"03020100-0504-0706-0809-0a0b0c0d0e0f\"");
        let back: StateId = serde_json::from_str("\"03020100-0504-0706-08090a0b0c0d0e0f\"").unwrap();
        assert_eq!(back, id);
    }
}
