//! Wire protocol message types.
//!
//! Both directions of the duplex connection exchange the same shape, the
//! [`Envelope`], serialized as one JSON text frame per logical message.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Envelope` | Local → Remote | Outbound event sent with `send` |
//! | `Envelope` | Remote → Local | Push event routed to subscribers |
//!
//! There is no acknowledgment, correlation ID or sequence number; delivery is
//! at-most-once.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope type and frame codec |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope message type.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::Envelope;
