//! Transport channels for the bridge.
//!
//! Four sockets make up one session: a STREAM connection to debugpy,
//! a PUB broadcast channel, a REP control channel and a REP header
//! channel. The [`Channels`] trait exposes the blocking primitives the
//! orchestrator needs; [`ZmqChannels`] is the production
//! implementation, and tests drive the bridge with a scripted
//! in-memory one.

use tracing::{debug, trace};

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Readiness of the pollable channels after one poll round.
///
/// The publish channel is send-only and never polled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The header channel has a payload waiting.
    pub header: bool,
    /// The control channel has a payload waiting.
    pub control: bool,
    /// The backend stream has bytes waiting.
    pub backend: bool,
}

/// Blocking send/receive/poll primitives over the four session channels.
///
/// One implementation is exclusively owned by the bridge for the
/// lifetime of a session; every method may block.
pub trait Channels {
    /// Connect all four channels.
    fn connect(&mut self, config: &BridgeConfig) -> Result<(), BridgeError>;

    /// Disconnect all four channels.
    fn disconnect(&mut self) -> Result<(), BridgeError>;

    /// Block indefinitely until at least one channel is readable.
    fn poll(&mut self) -> Result<Readiness, BridgeError>;

    /// Receive one payload from the header channel.
    fn recv_header(&mut self) -> Result<Vec<u8>, BridgeError>;

    /// Send a reply on the header channel.
    fn send_header(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Receive one payload from the control channel.
    fn recv_control(&mut self) -> Result<Vec<u8>, BridgeError>;

    /// Send a reply on the control channel.
    fn send_control(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Receive one raw chunk from the backend stream, with the
    /// transport identity frame already stripped.
    fn recv_backend(&mut self) -> Result<Vec<u8>, BridgeError>;

    /// Send one payload to the backend stream, prefixed with the
    /// transport identity frame the STREAM socket requires.
    fn send_backend(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Send one multipart message on the publish channel.
    fn publish(&mut self, parts: Vec<Vec<u8>>) -> Result<(), BridgeError>;
}

/// One connected socket together with its endpoint, kept for the
/// explicit disconnect on teardown.
struct Link {
    socket: zmq::Socket,
    endpoint: String,
}

impl Link {
    fn connect(
        context: &zmq::Context,
        kind: zmq::SocketType,
        endpoint: &str,
        linger_ms: i32,
    ) -> Result<Self, BridgeError> {
        let socket = context.socket(kind)?;
        socket.set_linger(linger_ms)?;
        socket.connect(endpoint)?;
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    fn disconnect(self) -> Result<(), BridgeError> {
        self.socket.disconnect(&self.endpoint)?;
        Ok(())
    }
}

/// ZeroMQ implementation of the four session channels.
pub struct ZmqChannels {
    context: zmq::Context,
    backend: Option<Link>,
    publisher: Option<Link>,
    control: Option<Link>,
    header: Option<Link>,
    /// Routing identity of the STREAM socket, captured at connect and
    /// prefixed to every outbound backend write.
    identity: Vec<u8>,
}

impl ZmqChannels {
    /// Create unconnected channels sharing the given context.
    pub fn new(context: zmq::Context) -> Self {
        Self {
            context,
            backend: None,
            publisher: None,
            control: None,
            header: None,
            identity: Vec::new(),
        }
    }
}

impl Default for ZmqChannels {
    fn default() -> Self {
        Self::new(zmq::Context::new())
    }
}

fn require<'a>(link: &'a Option<Link>, name: &str) -> Result<&'a zmq::Socket, BridgeError> {
    link.as_ref()
        .map(|l| &l.socket)
        .ok_or_else(|| BridgeError::Transport(format!("{name} channel is not connected")))
}

impl Channels for ZmqChannels {
    fn connect(&mut self, config: &BridgeConfig) -> Result<(), BridgeError> {
        let publisher = Link::connect(
            &self.context,
            zmq::PUB,
            &config.publish_endpoint,
            config.linger_ms,
        )?;
        let control = Link::connect(
            &self.context,
            zmq::REP,
            &config.control_endpoint,
            config.linger_ms,
        )?;
        let header = Link::connect(
            &self.context,
            zmq::REP,
            &config.header_endpoint,
            config.linger_ms,
        )?;
        let backend = Link::connect(
            &self.context,
            zmq::STREAM,
            &config.backend_endpoint,
            config.linger_ms,
        )?;
        self.identity = backend.socket.get_identity()?;

        debug!(
            backend = %config.backend_endpoint,
            publish = %config.publish_endpoint,
            control = %config.control_endpoint,
            header = %config.header_endpoint,
            "channels connected"
        );

        self.publisher = Some(publisher);
        self.control = Some(control);
        self.header = Some(header);
        self.backend = Some(backend);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BridgeError> {
        for link in [
            self.backend.take(),
            self.control.take(),
            self.header.take(),
            self.publisher.take(),
        ]
        .into_iter()
        .flatten()
        {
            link.disconnect()?;
        }
        self.identity.clear();
        debug!("channels disconnected");
        Ok(())
    }

    fn poll(&mut self) -> Result<Readiness, BridgeError> {
        let header = require(&self.header, "header")?;
        let control = require(&self.control, "control")?;
        let backend = require(&self.backend, "backend")?;

        let mut items = [
            header.as_poll_item(zmq::POLLIN),
            control.as_poll_item(zmq::POLLIN),
            backend.as_poll_item(zmq::POLLIN),
        ];
        zmq::poll(&mut items, -1)?;

        Ok(Readiness {
            header: items[0].is_readable(),
            control: items[1].is_readable(),
            backend: items[2].is_readable(),
        })
    }

    fn recv_header(&mut self) -> Result<Vec<u8>, BridgeError> {
        Ok(require(&self.header, "header")?.recv_bytes(0)?)
    }

    fn send_header(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        Ok(require(&self.header, "header")?.send(bytes, 0)?)
    }

    fn recv_control(&mut self) -> Result<Vec<u8>, BridgeError> {
        Ok(require(&self.control, "control")?.recv_bytes(0)?)
    }

    fn send_control(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        Ok(require(&self.control, "control")?.send(bytes, 0)?)
    }

    fn recv_backend(&mut self) -> Result<Vec<u8>, BridgeError> {
        let backend = require(&self.backend, "backend")?;
        // STREAM sockets deliver [identity, payload]; drop the identity.
        let _identity = backend.recv_bytes(0)?;
        let payload = backend.recv_bytes(0)?;
        trace!(bytes = payload.len(), "backend chunk received");
        Ok(payload)
    }

    fn send_backend(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let backend = require(&self.backend, "backend")?;
        backend.send(self.identity.as_slice(), zmq::SNDMORE)?;
        backend.send(bytes, 0)?;
        Ok(())
    }

    fn publish(&mut self, parts: Vec<Vec<u8>>) -> Result<(), BridgeError> {
        require(&self.publisher, "publish")?.send_multipart(parts, 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_unconnected_operations_fail() {
        let mut channels = ZmqChannels::default();
        assert!(matches!(channels.poll(), Err(BridgeError::Transport(_))));
        assert!(matches!(
            channels.recv_backend(),
            Err(BridgeError::Transport(_))
        ));
        assert!(matches!(
            channels.send_control(b"ACK"),
            Err(BridgeError::Transport(_))
        ));
    }

    #[test]
    fn channels_disconnect_when_never_connected_is_ok() {
        let mut channels = ZmqChannels::default();
        channels.disconnect().unwrap();
    }

    #[test]
    fn readiness_default_is_all_quiet() {
        let ready = Readiness::default();
        assert!(!ready.header && !ready.control && !ready.backend);
    }
}
