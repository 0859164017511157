//! Bridge error types.

use thiserror::Error;

use dapmux_wire::WireError;

/// Errors that terminate a bridged debugging session.
///
/// There is no user-visible error surface beyond session termination:
/// any of these aborts the control loop, the channels are disconnected
/// and the error is returned from [`crate::DebugBridge::start`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Framing or parse failure from the wire layer.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Send/receive/poll failure on one of the four channels.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<zmq::Error> for BridgeError {
    fn from(err: zmq::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_wire_display_is_transparent() {
        let err = BridgeError::from(WireError::Framing("bad length".into()));
        assert_eq!(err.to_string(), "framing error: bad length");
    }

    #[test]
    fn error_transport_display() {
        let err = BridgeError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn error_from_zmq() {
        let err: BridgeError = zmq::Error::ETERM.into();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}
