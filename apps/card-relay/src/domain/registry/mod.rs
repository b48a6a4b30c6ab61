//! Client Registry
//!
//! Tracks the set of live-update subscribers ("sinks"). A sink is any
//! transport that can accept a serialized frame and report whether it is
//! still open; the registry does not know or care which transport it is.
//!
//! # Design
//!
//! - Each registered sink gets a unique `SinkId` handle.
//! - `for_each` iterates over a snapshot taken under a short read lock, so
//!   sinks may register or unregister concurrently without invalidating the
//!   iteration. No lock is held while a sink is being called.
//! - `unregister` is idempotent: removing an absent handle is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

// =============================================================================
// Sink
// =============================================================================

/// A serialized frame, shared between all sinks receiving it.
pub type Frame = Arc<str>;

/// Unique handle for a registered sink.
pub type SinkId = u64;

/// Errors raised by a sink when delivery fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The subscriber's transport has closed.
    #[error("sink closed")]
    Closed,
    /// The subscriber is not draining its buffer.
    #[error("sink buffer full")]
    Full,
    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivery endpoint for one live-update subscriber.
pub trait Sink: Send + Sync {
    /// Whether the transport is still open.
    fn is_open(&self) -> bool;

    /// Deliver one frame without blocking.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the frame could not be handed to the transport.
    fn deliver(&self, frame: &Frame) -> Result<(), SinkError>;
}

// =============================================================================
// Client Registry
// =============================================================================

/// Set of currently connected live-update subscribers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use card_relay::domain::registry::{ClientRegistry, Frame, Sink, SinkError};
///
/// struct Null;
/// impl Sink for Null {
///     fn is_open(&self) -> bool { true }
///     fn deliver(&self, _frame: &Frame) -> Result<(), SinkError> { Ok(()) }
/// }
///
/// let registry = ClientRegistry::new();
/// let handle = registry.register(Arc::new(Null));
/// assert_eq!(registry.len(), 1);
///
/// registry.unregister(handle);
/// registry.unregister(handle); // no-op
/// assert!(registry.is_empty());
/// ```
pub struct ClientRegistry {
    sinks: RwLock<HashMap<SinkId, Arc<dyn Sink>>>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a sink and return its handle.
    pub fn register(&self, sink: Arc<dyn Sink>) -> SinkId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.write().insert(id, sink);
        id
    }

    /// Remove a sink.
    ///
    /// Returns `true` if the sink was present.
    pub fn unregister(&self, id: SinkId) -> bool {
        self.sinks.write().remove(&id).is_some()
    }

    /// Check whether a handle is still registered.
    #[must_use]
    pub fn contains(&self, id: SinkId) -> bool {
        self.sinks.read().contains_key(&id)
    }

    /// Call `f` for every sink registered at the time of the call.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SinkId, &Arc<dyn Sink>),
    {
        for (id, sink) in self.snapshot() {
            f(id, &sink);
        }
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Whether no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    fn snapshot(&self) -> Vec<(SinkId, Arc<dyn Sink>)> {
        self.sinks
            .read()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
