//! Link factory used by the transport to open connections.
//!
//! The transport never touches sockets directly; it asks a [`Connector`] for
//! a fresh link on every attempt. [`WsConnector`] is the production
//! implementation. Tests supply in-memory connectors built on
//! [`Connection::new`].

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio_tungstenite::connect_async;
use tracing::debug;
use url::Url;

use crate::error::Result;

use super::connection::{Connection, Inbound};

// ============================================================================
// Connector
// ============================================================================

/// Opens one duplex link to the peer.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a link to `url`.
    ///
    /// `url` already carries the credential query parameter, if any.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt by the transport.
    async fn open(&self, url: &Url) -> Result<(Connection, Inbound)>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> Result<(Connection, Inbound)> {
        let (ws_stream, response) = connect_async(url.as_str()).await?;

        debug!(
            host = url.host_str().unwrap_or_default(),
            status = %response.status(),
            "WebSocket handshake completed"
        );

        Ok(Connection::spawn_websocket(ws_stream))
    }
}
