//! Connection Transport
//!
//! The duplex text-frame connection under a [`NetSession`]. The session
//! never blocks on the transport: connection activity arrives as
//! [`TransportEvent`]s on an unbounded channel that the session drains
//! once per tick.
//!
//! [`NetSession`]: crate::network::session::NetSession

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, warn};

/// Outgoing frames buffered per connection.
const OUTGOING_QUEUE: usize = 100;

/// Connection activity reported to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established
    Opened,
    /// Text frame received
    Frame(String),
    /// Open connection closed
    Closed {
        /// Close reason
        reason: String,
    },
    /// Connect attempt failed
    Failed(String),
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No connection to send on.
    #[error("Connection not open")]
    NotOpen,

    /// The writer is not keeping up.
    #[error("Outgoing queue full")]
    QueueFull,
}

/// A duplex text-frame connection.
pub trait Transport {
    /// Start connecting to `url`. Activity is reported on `events`;
    /// a previous connection, if any, is dropped first.
    fn connect(&mut self, url: &str, events: mpsc::UnboundedSender<TransportEvent>);

    /// Queue a text frame.
    fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Drop the connection without reporting `Closed`.
    fn close(&mut self);
}

// =============================================================================
// WEBSOCKET
// =============================================================================

/// WebSocket transport running on a tokio runtime.
pub struct WsTransport {
    runtime: Handle,
    outgoing: Option<mpsc::Sender<String>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// Create a transport that spawns its connection task on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            outgoing: None,
            task: None,
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, url: &str, events: mpsc::UnboundedSender<TransportEvent>) {
        self.close();

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(OUTGOING_QUEUE);
        self.outgoing = Some(outgoing_tx);
        self.task = Some(self.runtime.spawn(run_connection(url.to_string(), outgoing_rx, events)));
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let sender = self.outgoing.as_ref().ok_or(TransportError::NotOpen)?;
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::NotOpen,
        })
    }

    fn close(&mut self) {
        self.outgoing = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// One connection: connect, then pump frames both ways until either side
/// closes.
#[instrument(skip(outgoing, events))]
async fn run_connection(
    url: String,
    mut outgoing: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Failed to connect: {}", e);
            let _ = events.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };

    info!("WebSocket connected");
    let _ = events.send(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "debug-tracing")]
                        debug!("Received: {}", text);
                        if events.send(TransportEvent::Frame(text)).is_err() {
                            // Session is gone
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                    Some(Ok(_)) => {}
                }
            }
            frame = outgoing.recv() => {
                match frame {
                    Some(text) => {
                        #[cfg(feature = "debug-tracing")]
                        debug!("Sending: {}", text);
                        if let Err(e) = write.send(Message::Text(text)).await {
                            break e.to_string();
                        }
                    }
                    None => {
                        debug!("Closed locally");
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        }
    };

    info!("WebSocket closed: {}", reason);
    let _ = events.send(TransportEvent::Closed { reason });
}

// =============================================================================
// TEST SUPPORT
// =============================================================================


// =============================================================================
// TESTS
// =============================================================================
