// ── Inbound commands ──
//
// What a synchronous consumer can ask of a running session. Typed
// `Command`s are checked at compile time; raw JSON tuples are accepted
// too and parsed on the engine, where malformed ones are dropped.

use indexmap::IndexMap;
use indisync_core::{BlobPolicy, MemberInput};
use serde_json::Value;

use crate::error::BridgeError;

/// A request for the session engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Submit new member values for a vector.
    Submit {
        device: String,
        vector: String,
        values: IndexMap<String, MemberInput>,
    },
    /// Set this consumer's BLOB policy for a device or one of its vectors.
    BlobPolicy {
        device: String,
        vector: Option<String>,
        policy: BlobPolicy,
    },
    /// Emit one `snapshot` notification.
    Snapshot,
    /// Stop the bridge.
    Stop,
}

impl Command {
    pub fn submit<I, K, V>(device: impl Into<String>, vector: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MemberInput>,
    {
        Self::Submit {
            device: device.into(),
            vector: vector.into(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a raw queue item.
    ///
    /// Accepted shapes:
    /// - `null`: stop
    /// - `"snapshot"`
    /// - `[device, vector, {member: value, ...}]` where a value is a
    ///   string, a number, or `{"data": [bytes] | "text", "format": ".ext"}`
    /// - `[device, vector | null, "Never" | "Also" | "Only"]`
    pub fn from_raw(raw: &Value) -> Result<Self, BridgeError> {
        match raw {
            Value::Null => Ok(Self::Stop),
            Value::String(token) if token == "snapshot" => Ok(Self::Snapshot),
            Value::String(token) => Err(BridgeError::malformed(format!("unknown token '{token}'"))),
            Value::Array(items) => {
                let [device, vector, payload] = items.as_slice() else {
                    return Err(BridgeError::malformed(format!(
                        "expected 3 elements, got {}",
                        items.len()
                    )));
                };
                let device = device
                    .as_str()
                    .ok_or_else(|| BridgeError::malformed("device name must be a string"))?;
                let vector = match vector {
                    Value::String(v) => Some(v.as_str()),
                    Value::Null => None,
                    _ => return Err(BridgeError::malformed("vector name must be a string or null")),
                };
                match payload {
                    Value::Object(map) => {
                        let vector = vector.ok_or_else(|| {
                            BridgeError::malformed("a submission needs a vector name")
                        })?;
                        let values = map
                            .iter()
                            .map(|(member, value)| Ok((member.clone(), raw_input(value)?)))
                            .collect::<Result<IndexMap<_, _>, BridgeError>>()?;
                        Ok(Self::Submit {
                            device: device.to_owned(),
                            vector: vector.to_owned(),
                            values,
                        })
                    }
                    Value::String(token) => {
                        let policy = token.parse::<BlobPolicy>().map_err(|_| {
                            BridgeError::malformed(format!("unknown BLOB policy '{token}'"))
                        })?;
                        Ok(Self::BlobPolicy {
                            device: device.to_owned(),
                            vector: vector.map(str::to_owned),
                            policy,
                        })
                    }
                    _ => Err(BridgeError::malformed(
                        "third element must be a value map or a BLOB policy",
                    )),
                }
            }
            _ => Err(BridgeError::malformed("unsupported command shape")),
        }
    }
}

fn raw_input(value: &Value) -> Result<MemberInput, BridgeError> {
    match value {
        Value::String(s) => Ok(MemberInput::Text(s.clone())),
        Value::Number(n) => Ok(MemberInput::Text(n.to_string())),
        Value::Object(blob) => {
            let format = blob
                .get("format")
                .and_then(Value::as_str)
                .ok_or_else(|| BridgeError::malformed("BLOB value needs a format"))?;
            let data: Vec<u8> = match blob.get("data") {
                Some(Value::String(text)) => text.as_bytes().to_vec(),
                Some(Value::Array(bytes)) => bytes
                    .iter()
                    .map(|b| {
                        b.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(|| BridgeError::malformed("BLOB data must be bytes"))
                    })
                    .collect::<Result<_, _>>()?,
                _ => return Err(BridgeError::malformed("BLOB value needs data")),
            };
            Ok(MemberInput::blob(data, format))
        }
        _ => Err(BridgeError::malformed("member values must be strings, numbers or BLOBs")),
    }
}

/// One entry of the inbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Command(Command),
    Raw(Value),
}

impl QueueItem {
    pub(crate) fn is_stop(&self) -> bool {
        matches!(self, Self::Command(Command::Stop) | Self::Raw(Value::Null))
    }
}

impl From<Command> for QueueItem {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<Value> for QueueItem {
    fn from(raw: Value) -> Self {
        Self::Raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_tuple_shapes() {
        assert_eq!(Command::from_raw(&Value::Null).unwrap(), Command::Stop);
        assert_eq!(Command::from_raw(&json!("snapshot")).unwrap(), Command::Snapshot);
        assert_eq!(
            Command::from_raw(&json!(["led", "switch", {"on": "On", "level": 3}])).unwrap(),
            Command::submit("led", "switch", [("on", "On"), ("level", "3")])
        );
        assert_eq!(
            Command::from_raw(&json!(["cam", null, "Also"])).unwrap(),
            Command::BlobPolicy {
                device: "cam".into(),
                vector: None,
                policy: BlobPolicy::Also,
            }
        );
    }

    #[test]
    fn parses_blob_values() {
        let cmd = Command::from_raw(&json!([
            "cam",
            "image",
            {"frame": {"data": [1, 2, 3], "format": ".raw"}}
        ]))
        .unwrap();
        let Command::Submit { values, .. } = cmd else {
            panic!("expected a submission");
        };
        assert_eq!(values["frame"], MemberInput::blob(vec![1u8, 2, 3], ".raw"));
    }

    #[test]
    fn rejects_malformed_items() {
        for raw in [
            json!("snap"),
            json!(["only", "two"]),
            json!([1, "v", {"m": "On"}]),
            json!(["d", null, {"m": "On"}]),
            json!(["d", "v", "Sometimes"]),
            json!(["d", "v", {"m": true}]),
            json!(["d", "v", {"m": {"data": [256], "format": ".x"}}]),
            json!(42),
        ] {
            assert!(
                matches!(Command::from_raw(&raw), Err(BridgeError::MalformedCommand(_))),
                "{raw} should be rejected"
            );
        }
    }
}
