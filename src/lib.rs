//! Tether - realtime push transport and offline-first local store.
//!
//! This library gives a client application two cooperating pieces:
//!
//! - A resilient duplex connection to a push peer that reconnects with
//!   exponential backoff and routes inbound events to subscribers
//! - A durable local database holding a sync queue, a TTL cache and drafts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐    WebSocket     ┌──────────────┐
//! │  RealtimeTransport      │◄────────────────►│  Push peer   │
//! │  (state machine,        │  {event,payload} │              │
//! │   backoff, registry)    │                  └──────────────┘
//! └─────────────────────────┘
//! ┌─────────────────────────┐
//! │  LocalStore (SQLite)    │
//! │  sync_queue │ cache │   │
//! │  drafts                 │
//! └─────────────────────────┘
//! ```
//!
//! The two halves are independent. A typical application enqueues
//! mutations in the [`SyncQueue`] while offline and replays them through
//! [`RealtimeTransport::send`] once the connection comes back.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use tether::{LocalStore, Operation, RealtimeTransport, Result, StoreOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = RealtimeTransport::builder()
//!         .url("wss://push.example.com/ws")
//!         .build()?;
//!
//!     let _sub = transport.subscribe("lead.updated", |payload| {
//!         println!("lead changed: {payload}");
//!     });
//!     transport.connect(Some("bearer-token")).await;
//!
//!     let store = LocalStore::open(StoreOptions::at("offline.db"))?;
//!     let queue = store.queue();
//!     queue.add(Operation::new("lead.update", json!({ "id": 42 }))).await?;
//!
//!     for item in queue.pending().await? {
//!         if transport.send(&item.kind, &item.payload) {
//!             queue.mark_synced(item.id).await?;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelope |
//! | [`store`] | Sync queue, cache, drafts |
//! | [`transport`] | Realtime connection and subscribers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// Local persistence.
///
/// Use [`LocalStore::open`] to obtain queue, cache and draft handles.
pub mod store;

/// Realtime transport.
///
/// Use [`RealtimeTransport::builder()`] to configure a connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{DraftKey, QueueItemId, SubscriptionId};

// Protocol types
pub use protocol::Envelope;

// Store types
pub use store::{
    Cache, Clock, DraftItem, DraftStore, LocalStore, ManualClock, Operation, StoreOptions,
    SyncQueue, SyncQueueItem, SyncStatus, SystemClock,
};

// Transport types
pub use transport::{
    ConnectionState, Connector, RealtimeTransport, ReconnectPolicy, Subscription,
    TransportBuilder, TransportOptions, WsConnector,
};
