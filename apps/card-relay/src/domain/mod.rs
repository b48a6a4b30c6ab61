//! Domain Layer - Card events, topics, and subscriber state.
//!
//! This layer contains the core types of the relay with no I/O. Everything
//! here is plain Rust with serialization support.

/// Card status and balance events.
pub mod card;

/// Fixed broker topic namespace.
pub mod topic;

/// Top-up request validation and command payloads.
pub mod topup;

/// Live-update subscriber registry.
pub mod registry;

/// Last-known card event cache.
pub mod cache;
