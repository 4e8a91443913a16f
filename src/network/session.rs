//! Network Session
//!
//! One persistent server connection: frame encode/decode, one-in-flight
//! request correlation per request code, and reconnection after a fixed
//! delay. Driven from the control loop via [`NetSession::poll`].
//!
//! ## Lifecycle
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──Opened──▶ Open
//!                        ▲  │                  │
//!                        │  Failed           Closed
//!                        │  ▼                  ▼
//!                     WaitingToReconnect ◀─────┘
//!                     (delay elapses → one attempt)
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::config::ServerEndpoint;
use crate::network::bus::BusEvent;
use crate::network::protocol::{ClientMessage, MessageCode, ProtocolError, ServerMessage};
use crate::network::transport::{Transport, TransportError, TransportEvent};

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request with this code is still awaiting its response.
    #[error("Request {0} already in flight")]
    RequestInFlight(MessageCode),
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    /// Never connected.
    Idle,
    /// Connect attempt in progress.
    Connecting,
    /// Connected.
    Open,
    /// Dropped; reconnecting after `remaining` seconds.
    WaitingToReconnect {
        /// Seconds until the next attempt.
        remaining: f64,
    },
    /// Closed locally; no reconnects.
    Closed,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// WebSocket URL
    pub url: String,
    /// Delay before a reconnect attempt
    pub reconnect_delay: Duration,
}

impl From<&ServerEndpoint> for SessionConfig {
    fn from(endpoint: &ServerEndpoint) -> Self {
        Self {
            url: endpoint.url(),
            reconnect_delay: endpoint.reconnect_delay(),
        }
    }
}

// =============================================================================
// REQUEST SLOTS
// =============================================================================

/// At most one outstanding request per request code.
#[derive(Debug, Default, Clone)]
pub struct RequestSlots {
    in_flight: BTreeSet<MessageCode>,
}

impl RequestSlots {
    /// Claim the slot for `request`.
    pub fn acquire(&mut self, request: MessageCode) -> Result<(), SessionError> {
        if self.in_flight.insert(request) {
            Ok(())
        } else {
            Err(SessionError::RequestInFlight(request))
        }
    }

    /// Free `request`'s slot. Returns false if it was not held.
    pub fn release(&mut self, request: MessageCode) -> bool {
        self.in_flight.remove(&request)
    }

    /// Free whatever slot `message` answers: the request one code below a
    /// response, or the `reqId` of an error.
    pub fn settle(&mut self, message: &ServerMessage) -> Option<MessageCode> {
        let request = match message {
            ServerMessage::Error(err) => err.req_id,
            other => other.code().checked_sub(1)?,
        };
        self.release(request).then_some(request)
    }

    /// Is `request` awaiting a response?
    pub fn is_in_flight(&self, request: MessageCode) -> bool {
        self.in_flight.contains(&request)
    }

    /// Free every slot.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Persistent connection to the game server.
pub struct NetSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    has_connected: bool,
    slots: RequestSlots,
    pending: Vec<BusEvent>,
}

impl<T: Transport> NetSession<T> {
    /// Create an idle session.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Idle,
            events: None,
            has_connected: false,
            slots: RequestSlots::default(),
            pending: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connected right now?
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// In-flight request bookkeeping.
    pub fn slots(&self) -> &RequestSlots {
        &self.slots
    }

    /// Give up waiting on the response to `request`. Returns false if
    /// nothing was in flight.
    pub fn release(&mut self, request: MessageCode) -> bool {
        self.slots.release(request)
    }

    /// Start connecting. No-op unless idle or closed.
    pub fn connect(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Closed => self.start_connect(),
            _ => debug!("connect() ignored in state {:?}", self.state),
        }
    }

    /// Close the connection for good.
    pub fn close(&mut self) {
        self.transport.close();
        self.events = None;
        self.slots.clear();
        self.state = SessionState::Closed;
        info!("Session closed");
    }

    /// Send a request. Fails if the connection is not open or a request
    /// with the same code is still in flight.
    ///
    /// Transport failures are also reported as a [`BusEvent::LocalError`]
    /// on the next [`poll`](Self::poll). Nothing is retried.
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(self.report(TransportError::NotOpen.into()));
        }

        let code = message.code();
        self.slots.acquire(code)?;

        let result = message
            .to_json()
            .map_err(SessionError::from)
            .and_then(|frame| self.transport.send(frame).map_err(SessionError::from));
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                self.slots.release(code);
                Err(self.report(e))
            }
        }
    }

    fn report(&mut self, error: SessionError) -> SessionError {
        if matches!(error, SessionError::Transport(_)) {
            self.pending.push(BusEvent::LocalError(error.to_string()));
        }
        error
    }

    /// Drain connection activity and advance the reconnect timer by `dt`
    /// seconds. Returns what happened, in order.
    ///
    /// The reconnect delay starts at the poll that sees the drop; `dt` from
    /// before it does not count.
    pub fn poll(&mut self, dt: f64) -> Vec<BusEvent> {
        let mut out = std::mem::take(&mut self.pending);
        let was_waiting = matches!(self.state, SessionState::WaitingToReconnect { .. });

        loop {
            let Some(events) = self.events.as_mut() else { break };
            match events.try_recv() {
                Ok(event) => self.handle_transport_event(event, &mut out),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.events = None;
                    if matches!(self.state, SessionState::Open | SessionState::Connecting) {
                        self.handle_transport_event(
                            TransportEvent::Closed { reason: "transport task ended".to_string() },
                            &mut out,
                        );
                    }
                    break;
                }
            }
        }

        if was_waiting {
            if let SessionState::WaitingToReconnect { remaining } = &mut self.state {
                *remaining -= dt.max(0.0);
                if *remaining <= 0.0 {
                    info!("Reconnecting to {}", self.config.url);
                    self.start_connect();
                }
            }
        }

        out
    }

    fn start_connect(&mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.state = SessionState::Connecting;
        self.transport.connect(&self.config.url, tx);
    }

    fn handle_transport_event(&mut self, event: TransportEvent, out: &mut Vec<BusEvent>) {
        match event {
            TransportEvent::Opened => {
                self.state = SessionState::Open;
                if self.has_connected {
                    info!("Reconnected to {}", self.config.url);
                    out.push(BusEvent::Reconnected);
                } else {
                    info!("Connected to {}", self.config.url);
                    self.has_connected = true;
                    out.push(BusEvent::Connected);
                }
            }
            TransportEvent::Frame(text) => match ServerMessage::from_json(&text) {
                Ok(message) => {
                    if let Some(request) = self.slots.settle(&message) {
                        debug!("Request {} settled by {}", request, message.code());
                    }
                    out.push(BusEvent::Message(message));
                }
                Err(e) => warn!("Dropping frame: {}", e),
            },
            TransportEvent::Closed { reason } => {
                if self.state == SessionState::Open {
                    warn!("Connection lost: {}", reason);
                    out.push(BusEvent::Disconnected { reason });
                }
                self.schedule_reconnect();
            }
            TransportEvent::Failed(reason) => {
                warn!("Connect to {} failed: {}", self.config.url, reason);
                out.push(BusEvent::LocalError(format!("connect failed: {}", reason)));
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.slots.clear();
        self.state = SessionState::WaitingToReconnect {
            remaining: self.config.reconnect_delay.as_secs_f64(),
        };
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{ApplyBattleReq, OPERATION_REQ, APPLY_BATTLE_REQ};
    use crate::network::transport::mock::MockTransport;

    fn session() -> (NetSession<MockTransport>, MockTransport) {
        let mock = MockTransport::default();
        let config = SessionConfig {
            url: "ws://test/ws".to_string(),
            reconnect_delay: Duration::from_millis(3000),
        };
        (NetSession::new(mock.clone(), config), mock)
    }

    fn open_session() -> (NetSession<MockTransport>, MockTransport) {
        let (mut session, mock) = session();
        session.connect();
        mock.emit(TransportEvent::Opened);
        assert_eq!(session.poll(0.0), vec![BusEvent::Connected]);
        (session, mock)
    }

    fn apply() -> ClientMessage {
        ClientMessage::ApplyBattle(ApplyBattleReq { weapon_type: 1 })
    }

    #[test]
    fn test_send_requires_open() {
        let (mut session, _) = session();
        assert!(matches!(session.send(&apply()), Err(SessionError::Transport(TransportError::NotOpen))));
        assert!(!session.slots().is_in_flight(APPLY_BATTLE_REQ));

        // Reported once on the next poll, never resent
        let events = session.poll(0.0);
        assert!(matches!(&events[..], [BusEvent::LocalError(_)]));
        assert!(session.poll(0.0).is_empty());
    }

    #[test]
    fn test_duplicate_request_is_not_a_local_error() {
        let (mut session, _) = open_session();
        session.send(&apply()).unwrap();
        assert!(session.send(&apply()).is_err());
        assert!(session.poll(0.0).is_empty());
    }

    #[test]
    fn test_decodes_frames_and_drops_garbage() {
        let (mut session, mock) = open_session();
        mock.emit_frame("garbage");
        mock.emit_frame(r#"{"id":4242}"#);
        mock.emit_frame(r#"{"id":4002,"success":true}"#);

        let events = session.poll(0.016);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], BusEvent::Message(m) if m.code() == 4002));
        assert!(session.is_open());
    }

    #[test]
    fn test_request_slot_freed_by_response() {
        let (mut session, mock) = open_session();
        session.send(&apply()).unwrap();
        assert!(matches!(session.send(&apply()), Err(SessionError::RequestInFlight(APPLY_BATTLE_REQ))));
        assert_eq!(mock.take_sent().len(), 1);

        mock.emit_frame(r#"{"id":2002,"roleId":1,"weaponType":1}"#);
        session.poll(0.0);
        assert!(session.send(&apply()).is_ok());
    }

    #[test]
    fn test_request_slot_freed_by_error() {
        let (mut session, mock) = open_session();
        session.send(&ClientMessage::CancelMatch).unwrap();
        session.send(&apply()).unwrap();

        mock.emit_frame(r#"{"id":9999,"reqId":3001,"errorCode":5}"#);
        session.poll(0.0);
        assert!(!session.slots().is_in_flight(3001));
        assert!(session.slots().is_in_flight(APPLY_BATTLE_REQ));
        assert!(!session.slots().is_in_flight(OPERATION_REQ));
    }

    #[test]
    fn test_reconnect_after_interval() {
        let (mut session, mock) = open_session();
        session.send(&apply()).unwrap();

        mock.emit(TransportEvent::Closed { reason: "reset".into() });
        let events = session.poll(0.5);
        assert_eq!(events, vec![BusEvent::Disconnected { reason: "reset".into() }]);
        assert!(!session.slots().is_in_flight(APPLY_BATTLE_REQ));
        assert_eq!(mock.connect_count(), 1);

        // The 0.5 before the drop does not count: 2.0 < 3.0 seconds
        session.poll(2.0);
        assert_eq!(mock.connect_count(), 1);
        assert!(matches!(session.state(), SessionState::WaitingToReconnect { .. }));

        session.poll(1.0);
        assert_eq!(mock.connect_count(), 2);
        assert_eq!(session.state(), SessionState::Connecting);

        // Exactly one attempt per interval
        session.poll(10.0);
        assert_eq!(mock.connect_count(), 2);

        mock.emit(TransportEvent::Opened);
        assert_eq!(session.poll(0.0), vec![BusEvent::Reconnected]);
    }

    #[test]
    fn test_reconnect_delay_starts_at_drop() {
        let (mut session, mock) = open_session();
        mock.emit(TransportEvent::Closed { reason: "reset".into() });

        // A long frame that ends with the drop leaves the full delay
        session.poll(5.0);
        assert!(matches!(session.state(), SessionState::WaitingToReconnect { remaining } if remaining == 3.0));
        assert_eq!(mock.connect_count(), 1);

        session.poll(2.5);
        assert_eq!(mock.connect_count(), 1);
        session.poll(0.5);
        assert_eq!(mock.connect_count(), 2);
    }

    #[test]
    fn test_failed_connect_retries() {
        let (mut session, mock) = session();
        session.connect();
        mock.emit(TransportEvent::Failed("refused".into()));

        let events = session.poll(0.0);
        assert!(matches!(&events[..], [BusEvent::LocalError(_)]));
        session.poll(3.0);
        assert_eq!(mock.connect_count(), 2);

        // First success after failures is still a first connection
        mock.emit(TransportEvent::Opened);
        assert_eq!(session.poll(0.0), vec![BusEvent::Connected]);
    }

    #[test]
    fn test_close_stops_reconnects() {
        let (mut session, mock) = open_session();
        session.close();
        mock.emit(TransportEvent::Closed { reason: "bye".into() });
        assert!(session.poll(10.0).is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(mock.connect_count(), 1);
    }
}
