//! Realtime transport layer.
//!
//! This module owns the single logical duplex connection to the push peer,
//! its reconnection policy and the routing of inbound envelopes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  RealtimeTransport   │                         │  Push peer      │
//! │                      │        WebSocket        │                 │
//! │  Connector → Link    │◄───────────────────────►│  Envelope       │
//! │  ReconnectPolicy     │   {event, payload}      │  protocol       │
//! │  Registry            │                         │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `RealtimeTransport::builder().url(..).build()` - configure
//! 2. `connect(credential)` - open the link, publish `Connected`
//! 3. `subscribe` / `send` - exchange envelopes
//! 4. Close or fault - backoff and retry, up to the attempt cap
//! 5. `disconnect()` - close and stop retrying
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Exponential reconnect policy |
//! | `builder` | Fluent transport configuration |
//! | `client` | `RealtimeTransport` state machine |
//! | `connection` | Link handle and WebSocket event loop |
//! | `connector` | Link factory trait and WebSocket connector |
//! | `options` | Reconnect and timeout settings |
//! | `registry` | Event subscribers and state listeners |
//! | `state` | `ConnectionState` enum |

// ============================================================================
// Submodules
// ============================================================================

/// Exponential backoff reconnect policy.
pub mod backoff;

/// Builder for transport configuration.
pub mod builder;

/// Transport state machine.
pub mod client;

/// Link handle and WebSocket event loop.
pub mod connection;

/// Link factory.
pub mod connector;

/// Transport options.
pub mod options;

/// Subscriber registry.
pub mod registry;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectPolicy;
pub use builder::TransportBuilder;
pub use client::RealtimeTransport;
pub use connection::{Connection, Inbound, Incoming, Outgoing};
pub use connector::{Connector, WsConnector};
pub use options::TransportOptions;
pub use registry::{EventHandler, Registry, StateHandler, Subscription};
pub use state::ConnectionState;
