//! State Cache
//!
//! Single-slot cache of the most recently observed card event. The physical
//! reader handles one card at a time, so the slot is overwritten on every
//! event regardless of which card it concerns.

use parking_lot::RwLock;

use crate::domain::card::CardEvent;

/// Last-known card event.
#[derive(Debug, Default)]
pub struct StateCache {
    slot: RwLock<Option<CardEvent>>,
}

impl StateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached event.
    pub fn update(&self, event: CardEvent) {
        *self.slot.write() = Some(event);
    }

    /// Get a copy of the cached event, if any.
    #[must_use]
    pub fn current(&self) -> Option<CardEvent> {
        self.slot.read().clone()
    }
}
