//! Session orchestrator: the four-channel control loop and the
//! stepping-suppression policy.
//!
//! One `DebugBridge` relays one debugging session at a time between
//! the kernel control plane and debugpy. Everything runs on the
//! calling thread: the loop blocks on channel readiness, services the
//! header and control channels, reassembles backend frames, and drains
//! the resulting message queue in arrival order. Stops caused by
//! stepping through kernel-synthesized wrapper code are swallowed
//! before the kernel ever sees them.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, trace, warn};

use dapmux_wire::{
    next_request, stack_trace_request, DebugMessage, Event, FrameDecoder, Request, Response,
    WireError, SEPARATOR,
};

use crate::channels::Channels;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::publisher::EventPublisher;

/// Acknowledgment sent on the control and header channels.
const ACK: &[u8] = b"ACK";

/// Control-channel sentinel meaning "nothing to relay".
const WAIT_ATTACH: &[u8] = b"WAIT_ATTACH";

/// Lifecycle state of one bridged debugging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session running; `start` may be called.
    Idle,
    /// The normal dispatch loop.
    Running,
    /// Inside the synchronous step-suppression protocol; only the
    /// backend stream is serviced.
    Stepping,
    /// A `disconnect` response was relayed; the loop is winding down.
    Terminating,
}

/// What a nested stepping wait is blocked on.
///
/// While a target is pending, every backend message that does not
/// match it goes to the shadow queue and is replayed afterwards; the
/// control and header channels are not serviced at all.
#[derive(Debug)]
enum WaitTarget {
    /// The response to an internally issued `stackTrace` request.
    StackTrace {
        request_seq: i64,
        reply: Option<Response>,
    },
    /// Both the `next` response and a `continued` event for the
    /// thread, in either order.
    StepConfirm {
        request_seq: i64,
        thread_id: i64,
        response_seen: bool,
        continued_seen: bool,
    },
}

impl WaitTarget {
    /// Absorb one backend message; returns true if the wait consumed it.
    fn absorb(&mut self, message: &DebugMessage) -> bool {
        match self {
            WaitTarget::StackTrace { request_seq, reply } => match message {
                DebugMessage::Response(resp)
                    if reply.is_none()
                        && resp.command == "stackTrace"
                        && resp.request_seq == *request_seq =>
                {
                    *reply = Some(resp.clone());
                    true
                }
                _ => false,
            },
            WaitTarget::StepConfirm {
                request_seq,
                thread_id,
                response_seen,
                continued_seen,
            } => match message {
                DebugMessage::Response(resp)
                    if !*response_seen
                        && resp.command == "next"
                        && resp.request_seq == *request_seq =>
                {
                    *response_seen = true;
                    true
                }
                DebugMessage::Event(event)
                    if !*continued_seen
                        && event.event == "continued"
                        && event
                            .body
                            .as_ref()
                            .and_then(|b| b.get("threadId"))
                            .and_then(Value::as_i64)
                            == Some(*thread_id) =>
                {
                    *continued_seen = true;
                    true
                }
                _ => false,
            },
        }
    }

    fn satisfied(&self) -> bool {
        match self {
            WaitTarget::StackTrace { reply, .. } => reply.is_some(),
            WaitTarget::StepConfirm {
                response_seen,
                continued_seen,
                ..
            } => *response_seen && *continued_seen,
        }
    }
}

/// Relays one DAP session between the kernel and a debugpy backend.
///
/// The bridge exclusively owns its channels, queues and correlation
/// header for the lifetime of a session. It may be reused: after
/// termination (or a fatal error) it resets to [`SessionState::Idle`],
/// ready for a new session.
pub struct DebugBridge<C: Channels> {
    config: BridgeConfig,
    channels: C,
    publisher: EventPublisher,
    state: SessionState,
    decoder: FrameDecoder,
    /// Reassembled backend messages awaiting classification, in
    /// arrival order.
    primary: VecDeque<String>,
    /// Messages read during a stepping wait that did not match the
    /// wait's target; replayed onto `primary` in arrival order.
    shadow: VecDeque<String>,
    /// Most recently received header-channel payload, attached
    /// verbatim to every published event until replaced.
    parent_header: String,
    /// Counter for internally issued requests. Independent of the
    /// kernel client's numbering so synthesized requests cannot
    /// collide with in-flight client sequence numbers.
    next_seq: i64,
}

impl<C: Channels> DebugBridge<C> {
    /// Create an idle bridge.
    pub fn new(config: BridgeConfig, channels: C, publisher: EventPublisher) -> Self {
        Self {
            config,
            channels,
            publisher,
            state: SessionState::Idle,
            decoder: FrameDecoder::new(),
            primary: VecDeque::new(),
            shadow: VecDeque::new(),
            parent_header: String::new(),
            next_seq: 1,
        }
    }

    /// Return the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Return a reference to the underlying channels.
    pub fn channels(&self) -> &C {
        &self.channels
    }

    /// Run one debugging session to completion.
    ///
    /// Connects the four channels, performs the control-channel
    /// handshake, then dispatches until a `disconnect` response has
    /// been relayed. On return, success or fatal error alike, the
    /// channels are disconnected and the bridge is back in
    /// [`SessionState::Idle`].
    pub fn start(&mut self) -> Result<(), BridgeError> {
        self.channels.connect(&self.config)?;
        let session = self.run();
        let teardown = self.channels.disconnect();
        self.reset();
        session.and(teardown)
    }

    fn run(&mut self) -> Result<(), BridgeError> {
        // Handshake: the kernel sends one control message once debugpy
        // is reachable; the ACK reply confirms the backend link.
        let _ = self.channels.recv_control()?;
        self.channels.send_control(ACK)?;
        self.state = SessionState::Running;
        debug!("debug bridge running");

        while self.state != SessionState::Terminating {
            let ready = self.channels.poll()?;
            if ready.header {
                self.handle_header()?;
            }
            if ready.control {
                self.handle_control()?;
            }
            if ready.backend {
                self.pump_backend()?;
            }
            self.drain_primary()?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.decoder = FrameDecoder::new();
        self.primary.clear();
        self.shadow.clear();
        self.parent_header.clear();
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Replace the correlation header and acknowledge.
    fn handle_header(&mut self) -> Result<(), BridgeError> {
        let payload = self.channels.recv_header()?;
        self.parent_header = String::from_utf8(payload)
            .map_err(|e| WireError::Parse(format!("header payload is not UTF-8: {e}")))?;
        trace!("correlation header updated");
        self.channels.send_header(ACK)
    }

    /// Relay one kernel request to the backend.
    ///
    /// The kernel sends either the `WAIT_ATTACH` sentinel (a no-op) or
    /// a fully framed DAP request, forwarded raw; only the command is
    /// peeked at, because `attach` is acknowledged immediately.
    fn handle_control(&mut self) -> Result<(), BridgeError> {
        let raw = self.channels.recv_control()?;
        if raw == WAIT_ATTACH {
            trace!("control sentinel received, nothing to relay");
            return Ok(());
        }

        let text = std::str::from_utf8(&raw)
            .map_err(|e| WireError::Parse(format!("control payload is not UTF-8: {e}")))?;
        let sep = text
            .find(SEPARATOR)
            .ok_or_else(|| WireError::Framing("control message missing separator".into()))?;
        let body: Value = serde_json::from_str(&text[sep + SEPARATOR.len()..])
            .map_err(|e| WireError::Parse(format!("control payload is not JSON: {e}")))?;

        let command = body.get("command").and_then(Value::as_str).unwrap_or("");
        debug!(command, "relaying kernel request to backend");
        self.channels.send_backend(&raw)?;

        if command == "attach" {
            self.channels.send_control(ACK)?;
        }
        Ok(())
    }

    /// Read one backend chunk and queue every frame it completes.
    fn pump_backend(&mut self) -> Result<(), BridgeError> {
        let chunk = self.channels.recv_backend()?;
        self.decoder.feed(&chunk);
        while let Some(payload) = self.decoder.next_frame()? {
            self.primary.push_back(payload);
        }
        Ok(())
    }

    /// Classify and dispatch every queued backend message, in order.
    fn drain_primary(&mut self) -> Result<(), BridgeError> {
        while let Some(raw) = self.primary.pop_front() {
            match DebugMessage::parse(&raw)? {
                DebugMessage::Event(event) => self.classify_event(event)?,
                DebugMessage::Response(response) => {
                    self.channels.send_control(raw.as_bytes())?;
                    if response.command == "disconnect" {
                        debug!("disconnect relayed, terminating session");
                        self.state = SessionState::Terminating;
                    }
                }
                DebugMessage::Request(request) => {
                    // debugpy does not issue reverse requests on this
                    // link; relay verbatim like a response.
                    warn!(command = %request.command, "unexpected request from backend");
                    self.channels.send_control(raw.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    /// Decide whether an event is a spurious step stop.
    ///
    /// A `stopped` event with reason `step` whose stack is a single
    /// frame in kernel-synthesized source is auto-advanced past and
    /// never published; every other event is forwarded.
    fn classify_event(&mut self, event: Event) -> Result<(), BridgeError> {
        let is_step_stop = event.event == "stopped"
            && event
                .body
                .as_ref()
                .and_then(|b| b.get("reason"))
                .and_then(Value::as_str)
                == Some("step");
        if !is_step_stop {
            return self.forward_event(event);
        }

        let thread_id = event
            .body
            .as_ref()
            .and_then(|b| b.get("threadId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| WireError::Parse("stopped event missing threadId".into()))?;

        self.state = SessionState::Stepping;
        let frames = self.fetch_stack_frames(thread_id)?;
        let synthetic = frames.len() == 1
            && frames[0]
                .get("source")
                .and_then(|s| s.get("path"))
                .and_then(Value::as_str)
                == Some(self.config.synthetic_path.as_str());

        let result = if synthetic {
            debug!(thread_id, "suppressing step stop in synthesized code");
            self.step_past(thread_id)
        } else {
            self.forward_event(event)
        };
        self.state = SessionState::Running;
        result
    }

    /// Forward a legitimate event to the sink and the publish channel.
    fn forward_event(&mut self, event: Event) -> Result<(), BridgeError> {
        let parent = if self.parent_header.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.parent_header)
                .map_err(|e| WireError::Parse(format!("correlation header is not JSON: {e}")))?
        };
        let message = serde_json::to_value(&event)
            .map_err(|e| WireError::Parse(format!("cannot serialize event: {e}")))?;
        self.publisher.forward(&mut self.channels, &parent, message)
    }

    /// Synchronously fetch the stack frames for a stopped thread.
    fn fetch_stack_frames(&mut self, thread_id: i64) -> Result<Vec<Value>, BridgeError> {
        let seq = self.next_seq();
        self.send_request(&stack_trace_request(seq, thread_id))?;

        let mut target = WaitTarget::StackTrace {
            request_seq: seq,
            reply: None,
        };
        self.await_backend(&mut target)?;
        let WaitTarget::StackTrace {
            reply: Some(reply), ..
        } = target
        else {
            return Err(BridgeError::Transport(
                "stack-trace wait ended without a reply".into(),
            ));
        };

        // A thread that exits before the fetch gets a failed response
        // with no body; an empty stack reads as a genuine stop.
        match reply.body.as_ref().and_then(|b| b.get("stackFrames")) {
            Some(Value::Array(frames)) => Ok(frames.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Step past a synthetic stop: issue `next`, wait for its response
    /// and the matching `continued` event, in either order.
    fn step_past(&mut self, thread_id: i64) -> Result<(), BridgeError> {
        let seq = self.next_seq();
        self.send_request(&next_request(seq, thread_id))?;

        let mut target = WaitTarget::StepConfirm {
            request_seq: seq,
            thread_id,
            response_seen: false,
            continued_seen: false,
        };
        self.await_backend(&mut target)
    }

    /// Drain the backend stream until the wait target is satisfied.
    ///
    /// Messages that do not match the target are moved to the back of
    /// the primary queue in their original arrival order; nothing is
    /// dropped. Blocks indefinitely if the backend never answers.
    fn await_backend(&mut self, target: &mut WaitTarget) -> Result<(), BridgeError> {
        while !target.satisfied() {
            let chunk = self.channels.recv_backend()?;
            self.decoder.feed(&chunk);
            while let Some(payload) = self.decoder.next_frame()? {
                self.shadow.push_back(payload);
            }
            while let Some(raw) = self.shadow.pop_front() {
                let message = DebugMessage::parse(&raw)?;
                if !target.absorb(&message) {
                    self.primary.push_back(raw);
                }
            }
        }
        trace!("stepping wait satisfied");
        Ok(())
    }

    /// Frame and send an internally issued request to the backend.
    fn send_request(&mut self, request: &Request) -> Result<(), BridgeError> {
        trace!(command = %request.command, seq = request.seq, "sending internal request");
        self.channels.send_backend(&request.to_wire()?)
    }
}
