//! Wire protocol for the streaming execution channel.
//!
//! Both directions carry JSON text frames. Inbound frames that do not
//! decode as a valid envelope are treated as protocol errors and dropped
//! by the transport; they never reach the coordinator.

use cellbook_core::{ExecutionOutcome, Language};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Outbound execution request envelope (client -> backend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteEnvelope {
    /// Correlation id linking this request to its inbound results.
    pub request_id: Uuid,
    /// Source to compile and run.
    pub code: String,
    /// Source language.
    pub language: Language,
    /// Standard input for the program, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ExecuteEnvelope {
    /// Serialize to a wire frame.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serialization of a plain struct cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Result payload carried by an inbound envelope.
///
/// The `pending` kind carries no payload; all others match the
/// corresponding `ExecutionOutcome` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ResultPayload {
    Pending,
    Partial {
        output: String,
    },
    Final {
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        execution_time: f64,
        exit_code: i32,
    },
    Failed {
        reason: String,
    },
}

impl From<ResultPayload> for ExecutionOutcome {
    fn from(payload: ResultPayload) -> Self {
        match payload {
            ResultPayload::Pending => Self::Pending,
            ResultPayload::Partial { output } => Self::Partial { output },
            ResultPayload::Final {
                output,
                error,
                execution_time,
                exit_code,
            } => Self::Final {
                output,
                error,
                execution_time,
                exit_code,
            },
            ResultPayload::Failed { reason } => Self::Failed { reason },
        }
    }
}

/// Inbound result envelope (backend -> client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    /// Correlation id of the originating request.
    pub request_id: Uuid,
    /// Result payload, tagged by kind.
    #[serde(flatten)]
    pub payload: ResultPayload,
}

impl ResultEnvelope {
    /// Decode a wire frame, failing closed on anything malformed.
    ///
    /// # Errors
    /// Returns `ProtocolError` if the frame is not a valid envelope.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_envelope_wire_shape() {
        let envelope = ExecuteEnvelope {
            request_id: Uuid::new_v4(),
            code: "int main() { return 0; }".to_string(),
            language: Language::C,
            stdin: None,
        };
        let json = envelope.encode();
        assert!(json.contains("\"requestId\""));
        assert!(json.contains("\"language\":\"c\""));
        assert!(!json.contains("stdin"));

        let parsed: ExecuteEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_decode_final_envelope() {
        let request_id = Uuid::new_v4();
        let frame = format!(
            r#"{{"requestId":"{request_id}","kind":"final","payload":{{"output":"","exit_code":0,"execution_time":12.0}}}}"#
        );

        let envelope = ResultEnvelope::decode(&frame).unwrap();
        assert_eq!(envelope.request_id, request_id);
        assert_eq!(
            envelope.payload,
            ResultPayload::Final {
                output: String::new(),
                error: None,
                execution_time: 12.0,
                exit_code: 0,
            }
        );
    }

    #[test]
    fn test_decode_pending_envelope() {
        let request_id = Uuid::new_v4();
        let frame = format!(r#"{{"requestId":"{request_id}","kind":"pending"}}"#);

        let envelope = ResultEnvelope::decode(&frame).unwrap();
        assert_eq!(envelope.payload, ResultPayload::Pending);
    }

    #[test]
    fn test_decode_fails_closed() {
        assert!(ResultEnvelope::decode("not json").is_err());
        assert!(ResultEnvelope::decode("{}").is_err());
        // Unknown kinds are rejected, not passed through untyped.
        let frame = format!(
            r#"{{"requestId":"{}","kind":"surprise","payload":{{}}}}"#,
            Uuid::new_v4()
        );
        assert!(ResultEnvelope::decode(&frame).is_err());
    }

    #[test]
    fn test_payload_converts_to_outcome() {
        let outcome: ExecutionOutcome = ResultPayload::Failed {
            reason: "compile error".to_string(),
        }
        .into();
        assert_eq!(outcome, ExecutionOutcome::failed("compile error"));
        assert!(outcome.is_terminal());
    }
}
