//! Duplex connection handle and WebSocket event loop.
//!
//! A [`Connection`] is the sending half of one open link. The receiving half
//! is an [`Inbound`] channel of [`Incoming`] items; the channel ends when the
//! link closes.
//!
//! # Event Loop
//!
//! [`Connection::spawn_websocket`] spawns a tokio task that handles:
//!
//! - Incoming text frames from the peer (forwarded to [`Inbound`])
//! - Outgoing frames queued through [`Connection::send_frame`]
//! - Close requests from [`Connection::shutdown`]
//!
//! Binary, ping and pong frames are ignored; tungstenite answers pings.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Receiving half of an open link.
pub type Inbound = mpsc::UnboundedReceiver<Incoming>;

/// Item delivered by the link to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A raw text frame.
    Frame(String),
    /// A transport-level fault. The link closes right after.
    Fault(String),
}

/// Item queued by the transport for the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A raw text frame.
    Frame(String),
    /// Close the link gracefully.
    Close,
}

// ============================================================================
// Connection
// ============================================================================

/// Sending half of an open duplex link.
///
/// Cloning is cheap; all clones feed the same link. Dropping every clone
/// closes the link.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Channel into the link's writer.
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Connection {
    /// Wraps the sending side of a custom link.
    ///
    /// Used by [`Connector`](super::Connector) implementations that are not
    /// WebSocket based.
    #[inline]
    #[must_use]
    pub fn new(outgoing: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { outgoing }
    }

    /// Spawns the event loop for an established WebSocket stream.
    pub fn spawn_websocket<S>(ws_stream: WebSocketStream<S>) -> (Self, Inbound)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, outgoing_rx, incoming_tx));

        (Self::new(outgoing_tx), incoming_rx)
    }

    /// Queues a text frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the link has already closed.
    pub fn send_frame(&self, frame: String) -> Result<()> {
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Requests a graceful close of the link.
    pub fn shutdown(&self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
        incoming_tx: mpsc::UnboundedSender<Incoming>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let frame = Incoming::Frame(text.as_str().to_owned());
                            if incoming_tx.send(frame).is_err() {
                                debug!("Inbound receiver dropped");
                                let _ = ws_write.close().await;
                                break;
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let _ = incoming_tx.send(Incoming::Fault(e.to_string()));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Frames from the transport
                command = outgoing_rx.recv() => {
                    match command {
                        Some(Outgoing::Frame(frame)) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(error = %e, "Failed to send frame");
                                let _ = incoming_tx.send(Incoming::Fault(e.to_string()));
                                break;
                            }
                            trace!("Frame sent");
                        }

                        Some(Outgoing::Close) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
