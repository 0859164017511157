//! dapmux-wire — wire framing and message model for the debug bridge.
//!
//! This crate contains the pure, I/O-free half of the bridge: the
//! length-prefixed stream framing debugpy speaks over its raw socket,
//! and the classification of decoded payloads into DAP requests,
//! responses and events.

pub mod error;
pub mod frame;
pub mod message;

// Re-export key types for convenience.
pub use error::WireError;
pub use frame::{encode_frame, FrameDecoder, HEADER, SEPARATOR};
pub use message::{next_request, stack_trace_request, DebugMessage, Event, Request, Response};
