//! Signed broadcast publishing of debug events.
//!
//! Every legitimate debug event leaves the bridge twice: once through
//! the registered in-process [`EventSink`], and once as a signed
//! multipart envelope on the publish channel, stamped with the most
//! recently observed correlation header as its parent.

use serde_json::{json, Value};
use tracing::trace;

use crate::channels::Channels;
use crate::error::BridgeError;

/// Delimiter between routing ids and signed content on the wire.
const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Protocol version stamped into published headers.
const PROTOCOL_VERSION: &str = "5.3";

/// Message type of every envelope this publisher produces.
const MSG_TYPE: &str = "debug_event";

/// Opaque sign-and-serialize capability supplied by the owning kernel.
///
/// The bridge never interprets keys or schemes; it hands the four
/// signed envelope parts to the signer and sends whatever comes back.
pub trait Signer {
    /// Produce the signature over header, parent header, metadata and
    /// content, in that order.
    fn sign(&self, header: &[u8], parent: &[u8], metadata: &[u8], content: &[u8]) -> String;
}

/// Single registered in-process consumer of forwarded debug events.
pub trait EventSink {
    /// Called with the full event message before it is broadcast.
    fn on_event(&mut self, event: &Value);
}

/// Formats debug events into signed broadcast envelopes.
pub struct EventPublisher {
    user_name: String,
    session_id: String,
    signer: Box<dyn Signer>,
    sink: Box<dyn EventSink>,
}

impl EventPublisher {
    /// Create a publisher with a registered sink and signing capability.
    pub fn new(
        user_name: impl Into<String>,
        session_id: impl Into<String>,
        signer: Box<dyn Signer>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            session_id: session_id.into(),
            signer,
            sink,
        }
    }

    /// Forward one event: invoke the sink, then broadcast the signed
    /// envelope. Signing or sending failures are fatal for the session.
    pub fn forward<C: Channels>(
        &mut self,
        channels: &mut C,
        parent: &Value,
        event: Value,
    ) -> Result<(), BridgeError> {
        self.sink.on_event(&event);
        let parts = self.envelope(parent, event)?;
        channels.publish(parts)
    }

    /// Build the signed multipart envelope for one event.
    ///
    /// Layout: topic, delimiter, signature, header, parent header,
    /// metadata, content. No binary buffers follow.
    pub fn envelope(&self, parent: &Value, event: Value) -> Result<Vec<Vec<u8>>, BridgeError> {
        let header = json!({
            "msg_id": uuid::Uuid::new_v4().to_string(),
            "username": self.user_name,
            "session": self.session_id,
            "date": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            "msg_type": MSG_TYPE,
            "version": PROTOCOL_VERSION,
        });

        let header = to_bytes(&header)?;
        let parent = to_bytes(parent)?;
        let metadata = b"{}".to_vec();
        let content = to_bytes(&event)?;
        let signature = self.signer.sign(&header, &parent, &metadata, &content);
        trace!(bytes = content.len(), "debug event enveloped");

        Ok(vec![
            MSG_TYPE.as_bytes().to_vec(),
            DELIMITER.to_vec(),
            signature.into_bytes(),
            header,
            parent,
            metadata,
            content,
        ])
    }
}

fn to_bytes(value: &Value) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(value)
        .map_err(|e| BridgeError::Transport(format!("cannot serialize envelope part: {e}")))
}
