//! DAP message classification and outbound request construction.
//!
//! The bridge relays most traffic still-serialized; messages are only
//! parsed to decide where they go. Classification keys off the `type`
//! field, the one discriminator every DAP message carries.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::frame::encode_frame;

/// A DAP request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The command to execute.
    pub command: String,
    /// Command arguments (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// A DAP response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number.
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: String,
    /// Sequence number of the corresponding request.
    pub request_seq: i64,
    /// Whether the request was successful.
    pub success: bool,
    /// The command this response is for.
    pub command: String,
    /// Error message if `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body (command-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A DAP event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The event name.
    pub event: String,
    /// Event body (event-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A parsed DAP message, classified by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugMessage {
    /// A request (client → adapter).
    Request(Request),
    /// A response to a request.
    Response(Response),
    /// An adapter-initiated event.
    Event(Event),
}

impl DebugMessage {
    /// Classify a still-serialized payload.
    ///
    /// A payload that is not JSON, has no `type` field, or is missing
    /// the fields its kind requires is a fatal parse error.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| WireError::Parse(format!("invalid JSON: {e}")))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        match kind.as_deref() {
            Some("request") => serde_json::from_value(value)
                .map(DebugMessage::Request)
                .map_err(|e| WireError::Parse(format!("malformed request: {e}"))),
            Some("response") => serde_json::from_value(value)
                .map(DebugMessage::Response)
                .map_err(|e| WireError::Parse(format!("malformed response: {e}"))),
            Some("event") => serde_json::from_value(value)
                .map(DebugMessage::Event)
                .map_err(|e| WireError::Parse(format!("malformed event: {e}"))),
            other => Err(WireError::Parse(format!("unknown message type: {other:?}"))),
        }
    }
}

impl Request {
    /// Serialize and frame this request for the stream transport.
    pub fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        let payload = serde_json::to_string(self)
            .map_err(|e| WireError::Parse(format!("cannot serialize request: {e}")))?;
        Ok(encode_frame(&payload))
    }
}

/// Build a `stackTrace` request for the given thread.
pub fn stack_trace_request(seq: i64, thread_id: i64) -> Request {
    Request {
        seq,
        message_type: "request".into(),
        command: "stackTrace".into(),
        arguments: Some(serde_json::json!({
            "threadId": thread_id,
        })),
    }
}

/// Build a `next` (step over) request for the given thread.
pub fn next_request(seq: i64, thread_id: i64) -> Request {
    Request {
        seq,
        message_type: "request".into(),
        command: "next".into(),
        arguments: Some(serde_json::json!({
            "threadId": thread_id,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_parse_request() {
        let raw = r#"{"seq":4,"type":"request","command":"attach","arguments":{"port":5678}}"#;
        let msg = DebugMessage::parse(raw).unwrap();
        match msg {
            DebugMessage::Request(req) => {
                assert_eq!(req.seq, 4);
                assert_eq!(req.command, "attach");
                assert_eq!(req.arguments.unwrap()["port"], 5678);
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn message_parse_response() {
        let raw = r#"{"seq":5,"type":"response","request_seq":4,"success":true,"command":"attach"}"#;
        let msg = DebugMessage::parse(raw).unwrap();
        match msg {
            DebugMessage::Response(resp) => {
                assert_eq!(resp.request_seq, 4);
                assert!(resp.success);
                assert_eq!(resp.command, "attach");
                assert!(resp.body.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn message_parse_event() {
        let raw = r#"{"seq":6,"type":"event","event":"stopped","body":{"reason":"step","threadId":1}}"#;
        let msg = DebugMessage::parse(raw).unwrap();
        match msg {
            DebugMessage::Event(event) => {
                assert_eq!(event.event, "stopped");
                assert_eq!(event.body.unwrap()["reason"], "step");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn message_parse_missing_type_fails() {
        let err = DebugMessage::parse(r#"{"seq":1}"#).unwrap_err();
        assert!(matches!(err, WireError::Parse(_)));
        assert!(err.to_string().contains("unknown message type"));
    }

    #[test]
    fn message_parse_invalid_json_fails() {
        let err = DebugMessage::parse("not json").unwrap_err();
        assert!(matches!(err, WireError::Parse(_)));
    }

    #[test]
    fn message_parse_event_missing_name_fails() {
        let err = DebugMessage::parse(r#"{"seq":1,"type":"event"}"#).unwrap_err();
        assert!(err.to_string().contains("malformed event"));
    }

    #[test]
    fn message_stack_trace_request_shape() {
        let req = stack_trace_request(7, 12);
        assert_eq!(req.seq, 7);
        assert_eq!(req.command, "stackTrace");
        assert_eq!(req.arguments.as_ref().unwrap()["threadId"], 12);

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "request");
    }

    #[test]
    fn message_next_request_shape() {
        let req = next_request(8, 3);
        assert_eq!(req.command, "next");
        assert_eq!(req.arguments.as_ref().unwrap()["threadId"], 3);
    }

    #[test]
    fn message_request_to_wire_is_decodable() {
        let req = next_request(1, 1);
        let wire = req.to_wire().unwrap();

        let mut decoder = crate::frame::FrameDecoder::new();
        decoder.feed(&wire);
        let payload = decoder.next_frame().unwrap().unwrap();
        match DebugMessage::parse(&payload).unwrap() {
            DebugMessage::Request(round) => assert_eq!(round, req),
            other => panic!("expected request, got {other:?}"),
        }
    }
}
