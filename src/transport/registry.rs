//! Subscriber registry.
//!
//! Holds two independent channels:
//!
//! - **Event handlers** keyed by envelope event name, invoked with the payload
//! - **State listeners** invoked with every [`ConnectionState`] transition
//!
//! Dispatch iterates a snapshot of the handler list taken under a read lock,
//! so a handler may unsubscribe itself or others while being invoked. Each
//! handler runs inside `catch_unwind`; a panicking handler is logged and its
//! siblings still run.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{error, trace};

use crate::identifiers::SubscriptionId;

use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the payload of a matching envelope.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback invoked with each connection state transition.
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Ordered handler list for one channel.
type HandlerList<H> = Vec<(SubscriptionId, H)>;

/// Which channel a subscription belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Channel {
    Event(String),
    State,
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to a single registration.
///
/// Dropping the handle keeps the registration alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    channel: Channel,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Returns the registration ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the event name, or `None` for a state listener.
    #[inline]
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        match &self.channel {
            Channel::Event(name) => Some(name),
            Channel::State => None,
        }
    }

    /// Removes this registration only.
    ///
    /// Returns `false` if it was already removed or the registry is gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.channel, self.id),
            None => false,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Per-event handler sets plus the connection-state listener set.
#[derive(Default)]
pub struct Registry {
    /// Event name → handlers in registration order.
    events: RwLock<FxHashMap<String, HandlerList<EventHandler>>>,
    /// State listeners in registration order.
    state: RwLock<HandlerList<StateHandler>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("events", &self.events.read().len())
            .field("state_listeners", &self.state.read().len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a handler for `event`.
    pub fn register(
        self: &Arc<Self>,
        event: impl Into<String>,
        handler: EventHandler,
    ) -> Subscription {
        let event = event.into();
        let id = SubscriptionId::next();

        self.events
            .write()
            .entry(event.clone())
            .or_default()
            .push((id, handler));

        trace!(%id, event = %event, "Handler registered");

        Subscription {
            id,
            channel: Channel::Event(event),
            registry: Arc::downgrade(self),
        }
    }

    /// Registers a connection-state listener.
    pub fn register_state(self: &Arc<Self>, handler: StateHandler) -> Subscription {
        let id = SubscriptionId::next();
        self.state.write().push((id, handler));

        trace!(%id, "State listener registered");

        Subscription {
            id,
            channel: Channel::State,
            registry: Arc::downgrade(self),
        }
    }

    /// Invokes every handler registered for `event`.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<EventHandler> = match self.events.read().get(event) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                trace!(event, "No subscribers");
                return 0;
            }
        };

        snapshot
            .iter()
            .filter(|handler| invoke_isolated(event, || handler(payload)))
            .count()
    }

    /// Invokes every state listener with `state`.
    pub fn notify_state(&self, state: ConnectionState) -> usize {
        let snapshot: Vec<StateHandler> = self
            .state
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        snapshot
            .iter()
            .filter(|handler| invoke_isolated(state.as_str(), || handler(state)))
            .count()
    }

    /// Removes one registration.
    fn remove(&self, channel: &Channel, id: SubscriptionId) -> bool {
        match channel {
            Channel::Event(event) => {
                let mut events = self.events.write();
                let Some(handlers) = events.get_mut(event) else {
                    return false;
                };

                let before = handlers.len();
                handlers.retain(|(entry, _)| *entry != id);
                let removed = handlers.len() != before;

                if handlers.is_empty() {
                    events.remove(event);
                }
                removed
            }
            Channel::State => {
                let mut state = self.state.write();
                let before = state.len();
                state.retain(|(entry, _)| *entry != id);
                state.len() != before
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Runs a handler, converting a panic into a logged failure.
fn invoke_isolated(channel: &str, call: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(panic) => {
            error!(channel, reason = %panic_message(&*panic), "Subscriber panicked");
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================
