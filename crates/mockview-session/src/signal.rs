//! Remote agent signals carried over the data channel.
//!
//! Payloads are UTF-8 JSON objects with a required `event` field:
//!
//! ```text
//! {"event": "stage_changed", "stage": "experience"}
//! {"event": "interview_complete"}
//! ```
//!
//! Anything that does not decode, or decodes to an unknown shape, becomes
//! [`RemoteSignal::Unrecognized`] and is ignored by the coordinator.

use crate::stage::Stage;
use serde_json::{Map, Value};
use tracing::debug;

/// A structured message received from the remote agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSignal {
    StageChanged { target: Stage },
    InterviewComplete,
    Unrecognized,
}

impl RemoteSignal {
    /// Decode raw data-channel bytes. Never fails: bad payloads map to `Unrecognized`.
    pub fn decode(payload: &[u8]) -> Self {
        match decode_object(payload) {
            Some(object) => Self::from_object(&object),
            None => RemoteSignal::Unrecognized,
        }
    }

    /// Interpret an already-parsed JSON object.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        match object.get("event").and_then(Value::as_str) {
            Some("stage_changed") => match object
                .get("stage")
                .and_then(Value::as_str)
                .and_then(Stage::from_wire)
            {
                Some(target) => RemoteSignal::StageChanged { target },
                None => {
                    debug!("stage_changed without a known stage, ignoring");
                    RemoteSignal::Unrecognized
                }
            },
            Some("interview_complete") => RemoteSignal::InterviewComplete,
            Some(other) => {
                debug!(event = other, "unrecognized data event, ignoring");
                RemoteSignal::Unrecognized
            }
            None => {
                debug!("data message without event field, ignoring");
                RemoteSignal::Unrecognized
            }
        }
    }
}

/// UTF-8 decode then JSON parse; only objects are accepted.
pub fn decode_object(payload: &[u8]) -> Option<Map<String, Value>> {
    let text = match std::str::from_utf8(payload) {
        Ok(t) => t,
        Err(e) => {
            debug!("data message is not UTF-8: {}", e);
            return None;
        }
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            debug!("data message is not a JSON object");
            None
        }
        Err(e) => {
            debug!("data message is not JSON: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_changed_to_experience() {
        let sig = RemoteSignal::decode(br#"{"event":"stage_changed","stage":"experience"}"#);
        assert_eq!(
            sig,
            RemoteSignal::StageChanged {
                target: Stage::Experience
            }
        );
    }

    #[test]
    fn interview_complete_ignores_extra_fields() {
        let sig = RemoteSignal::decode(br#"{"event":"interview_complete","score":3}"#);
        assert_eq!(sig, RemoteSignal::InterviewComplete);
    }

    #[test]
    fn protocol_violations_are_unrecognized() {
        let cases: [&[u8]; 7] = [
            b"",
            b"not json",
            &[0xff, 0xfe, 0x00],
            br#"["stage_changed"]"#,
            br#"{"stage":"experience"}"#,
            br#"{"event":"stage_changed"}"#,
            br#"{"event":"agent_speaking"}"#,
        ];
        for payload in cases {
            assert_eq!(RemoteSignal::decode(payload), RemoteSignal::Unrecognized);
        }
    }

    #[test]
    fn unknown_stage_name_is_unrecognized() {
        let sig = RemoteSignal::decode(br#"{"event":"stage_changed","stage":"salary"}"#);
        assert_eq!(sig, RemoteSignal::Unrecognized);
    }
}
