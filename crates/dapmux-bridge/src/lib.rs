//! dapmux-bridge — DAP session bridge between a notebook kernel and debugpy.
//!
//! The bridge owns four ZeroMQ channels (debugpy stream, broadcast
//! publisher, kernel control, correlation header), runs them on a
//! single blocking poll loop, relays requests and responses between
//! the kernel and the backend, suppresses debugger stops caused by
//! stepping through kernel-synthesized wrapper code, and republishes
//! legitimate debug events as signed broadcast envelopes.
//!
//! Framing and message classification live in `dapmux-wire`; this
//! crate adds the transport, the orchestration state machine, and the
//! event publishing path.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod error;
pub mod publisher;

// Re-export key types for convenience.
pub use bridge::{DebugBridge, SessionState};
pub use channels::{Channels, Readiness, ZmqChannels};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use publisher::{EventPublisher, EventSink, Signer};
