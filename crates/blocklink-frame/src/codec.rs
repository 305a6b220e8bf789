use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// Byte appended after every encoded envelope.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default maximum line length: 4 KiB.
///
/// The microcontroller's receive buffer is far smaller; anything longer is
/// line noise.
pub const DEFAULT_MAX_LINE_LEN: usize = 4 * 1024;

/// One line of protocol data.
///
/// All three slots are independently optional. A slot that is absent is not
/// the same as a slot holding an empty list: `{"ACK":[]}` is still an
/// acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Device data: commands going out, unsolicited state coming in.
    #[serde(rename = "device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Vec<DeviceRecord>>,
    /// Acknowledgement of the most recent write.
    #[serde(rename = "ACK", default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Vec<DeviceRecord>>,
    /// Error reported by the microcontroller.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorIndicator>,
}

impl Envelope {
    /// An outgoing write request carrying `records` in the device slot.
    pub fn device_data(records: Vec<DeviceRecord>) -> Self {
        Self {
            device: Some(records),
            ..Self::default()
        }
    }

    /// An acknowledgement carrying `records`.
    pub fn acknowledgement(records: Vec<DeviceRecord>) -> Self {
        Self {
            ack: Some(records),
            ..Self::default()
        }
    }

    /// Whether the acknowledgement slot is present.
    pub fn is_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Every record in the device slot followed by every record in the
    /// acknowledgement slot.
    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.device
            .iter()
            .flatten()
            .chain(self.ack.iter().flatten())
    }
}

/// Error slot of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorIndicator {
    #[serde(rename = "Code")]
    pub code: i64,
}

/// State of, or command for, one device channel on the microcontroller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Group identifier (the port on the shield).
    #[serde(rename = "G")]
    pub group: String,
    /// Variable index within the group.
    #[serde(rename = "V")]
    pub variable: i64,
    /// Device or command code.
    #[serde(rename = "D")]
    pub device: i64,
    /// Payload; its meaning depends on `(group, device)`.
    #[serde(rename = "DA", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl DeviceRecord {
    /// Create a record.
    pub fn new(
        group: impl Into<String>,
        variable: i64,
        device: i64,
        data: Option<Payload>,
    ) -> Self {
        Self {
            group: group.into(),
            variable,
            device,
            data,
        }
    }
}

/// Opaque record payload. The core never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Number(serde_json::Number),
}

impl Payload {
    /// The payload as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Number(_) => None,
        }
    }

    /// The payload as a signed integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Number(number) => number.as_i64(),
            Payload::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Number(value.into())
    }
}

const SLOT_KEYS: [&str; 3] = ["device", "ACK", "Error"];
const RECORD_KEYS: [&str; 4] = ["G", "V", "D", "DA"];
const ERROR_KEYS: [&str; 1] = ["Code"];

/// Encode an envelope into one line, without the terminator.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes> {
    let encoded = serde_json::to_vec(envelope).map_err(FrameError::Encode)?;
    Ok(Bytes::from(encoded))
}

/// Decode one received line into an envelope.
///
/// Surrounding whitespace (including a trailing `\r`) is ignored. Slot and
/// field names match regardless of ASCII case (`ACK`, `Ack` and `ack` are the
/// same slot); an exact match wins over a case-folded one. Anything that is
/// not a JSON object of the envelope shape is rejected as a whole.
pub fn decode_envelope(line: &[u8]) -> Result<Envelope> {
    let mut value: Value = serde_json::from_slice(line)?;
    let Value::Object(slots) = &mut value else {
        return Err(FrameError::Decode(serde::de::Error::custom(
            "expected a JSON object",
        )));
    };

    fold_keys(slots, &SLOT_KEYS);
    for slot in ["device", "ACK"] {
        if let Some(Value::Array(records)) = slots.get_mut(slot) {
            for record in records.iter_mut() {
                if let Value::Object(fields) = record {
                    fold_keys(fields, &RECORD_KEYS);
                }
            }
        }
    }
    if let Some(Value::Object(fields)) = slots.get_mut("Error") {
        fold_keys(fields, &ERROR_KEYS);
    }

    Ok(serde_json::from_value(value)?)
}

/// Rewrite keys that match one of `known` ignoring ASCII case to its exact
/// spelling. Unknown keys are left alone. When both an exact and a folded
/// spelling are present, the exact one is kept.
fn fold_keys(map: &mut Map<String, Value>, known: &[&str]) {
    let folded: Vec<(String, &str)> = map
        .keys()
        .filter_map(|key| {
            known
                .iter()
                .find(|name| **name != key.as_str() && name.eq_ignore_ascii_case(key))
                .map(|name| (key.clone(), *name))
        })
        .collect();

    for (key, name) in folded {
        if let Some(value) = map.remove(&key) {
            if !map.contains_key(name) {
                map.insert(name.to_string(), value);
            }
        }
    }
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes, excluding the terminator. Default: 4 KiB.
    pub max_line_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}
