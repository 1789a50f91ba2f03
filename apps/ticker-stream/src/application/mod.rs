//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the session service and the port interfaces that
//! define how the domain interacts with exchanges and consumers.

/// Port interfaces for exchanges, transports, and listeners.
pub mod ports;

/// Application services for starting and controlling sessions.
pub mod services;
