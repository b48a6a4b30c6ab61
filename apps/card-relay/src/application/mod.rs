//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and the port interfaces
//! that define how the domain interacts with the broker.

/// Port interfaces for the broker adapter.
pub mod ports;

/// Fan-out, command and event-pump services.
pub mod services;
