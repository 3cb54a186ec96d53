//! Wire Types
//!
//! JSON shapes shared by the adapter RPC server and client, and the
//! envelope encoding used by the log provider gateway and the log client.

use crate::domain::entities::{Binding, Envelope, EnvelopeMessage, LogType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const LIST_BINDINGS_PATH: &str = "/v1/ListBindings";
pub const CREATE_BINDING_PATH: &str = "/v1/CreateBinding";
pub const DELETE_BINDING_PATH: &str = "/v1/DeleteBinding";

/// Status code carried in RPC error bodies when an adapter is full.
pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListBindingsRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBindingsResponse {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBindingRequest {
    pub binding: Binding,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBindingResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBindingRequest {
    pub binding: Binding,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBindingResponse {}

/// Error body returned by the adapter RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: String,
    pub message: String,
}

/// `{"batch": [...]}` as sent by the provider gateway and the log client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeBatch {
    #[serde(default)]
    pub batch: Vec<EnvelopeJson>,
}

/// JSON form of an envelope. Timestamps are nanosecond strings and log
/// payloads are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeJson {
    pub timestamp: String,
    pub source_id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogJson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogJson {
    #[serde(default)]
    pub payload: String,
    #[serde(rename = "type", default)]
    pub log_type: LogType,
}

impl From<&Envelope> for EnvelopeJson {
    fn from(env: &Envelope) -> Self {
        Self {
            timestamp: env.timestamp.to_string(),
            source_id: env.source_id.clone(),
            instance_id: env.instance_id.clone(),
            tags: env.tags.clone(),
            log: env.as_log().map(|log| LogJson {
                payload: STANDARD.encode(&log.payload),
                log_type: log.log_type,
            }),
        }
    }
}

impl TryFrom<EnvelopeJson> for Envelope {
    type Error = String;

    fn try_from(json: EnvelopeJson) -> Result<Self, Self::Error> {
        let timestamp = if json.timestamp.is_empty() {
            0
        } else {
            json.timestamp
                .parse::<i64>()
                .map_err(|e| format!("invalid timestamp {:?}: {}", json.timestamp, e))?
        };

        let message = match json.log {
            Some(log) => {
                let payload = STANDARD
                    .decode(log.payload.as_bytes())
                    .map_err(|e| format!("invalid log payload: {}", e))?;
                EnvelopeMessage::Log(crate::domain::entities::Log {
                    payload: payload.into(),
                    log_type: log.log_type,
                })
            }
            None => EnvelopeMessage::Other,
        };

        Ok(Envelope {
            source_id: json.source_id,
            instance_id: json.instance_id,
            timestamp,
            tags: json.tags,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_messages_are_camel_case() {
        let req = CreateBindingRequest {
            binding: Binding::new("app", "host", "syslog://d:1"),
        };
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "binding": {"appId": "app", "hostname": "host", "drain": "syslog://d:1"}
            })
        );
        assert_eq!(serde_json::to_string(&CreateBindingResponse {}).unwrap(), "{}");
    }

    #[test]
    fn test_list_response_defaults_to_empty() {
        let resp: ListBindingsResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.bindings.is_empty());
    }

    #[test]
    fn test_envelope_json_decodes_log() {
        let json = r#"{
            "timestamp": "12345678",
            "source_id": "app-id",
            "instance_id": "3",
            "tags": {"source_type": "APP"},
            "log": {"payload": "aGVsbG8=", "type": "ERR"}
        }"#;

        let decoded: EnvelopeJson = serde_json::from_str(json).unwrap();
        let env = Envelope::try_from(decoded).unwrap();

        assert_eq!(env.timestamp, 12345678);
        assert_eq!(env.instance_id, "3");
        assert_eq!(env.tag("source_type"), Some("APP"));
        let log = env.as_log().unwrap();
        assert_eq!(&log.payload[..], b"hello");
        assert_eq!(log.log_type, LogType::Err);
    }

    #[test]
    fn test_envelope_json_without_log_is_other() {
        let json = r#"{"timestamp": "1", "source_id": "app-id"}"#;
        let decoded: EnvelopeJson = serde_json::from_str(json).unwrap();
        let env = Envelope::try_from(decoded).unwrap();
        assert!(!env.is_log());
    }

    #[test]
    fn test_envelope_json_rejects_bad_payload() {
        let json = r#"{"timestamp": "1", "source_id": "a", "log": {"payload": "!!!"}}"#;
        let decoded: EnvelopeJson = serde_json::from_str(json).unwrap();
        assert!(Envelope::try_from(decoded).is_err());
    }

    #[test]
    fn test_envelope_json_rejects_bad_timestamp() {
        let json = r#"{"timestamp": "soon", "source_id": "a"}"#;
        let decoded: EnvelopeJson = serde_json::from_str(json).unwrap();
        assert!(Envelope::try_from(decoded).is_err());
    }

    #[test]
    fn test_envelope_json_encodes_payload_as_base64() {
        let env = Envelope::log("app", 42, "hi", LogType::Out).with_tag("source_type", "LGR");
        let json = serde_json::to_value(EnvelopeJson::from(&env)).unwrap();

        assert_eq!(json["timestamp"], "42");
        assert_eq!(json["log"]["payload"], "aGk=");
        assert_eq!(json["log"]["type"], "OUT");
        assert_eq!(json["tags"]["source_type"], "LGR");
    }
}
