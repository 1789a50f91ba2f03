//! Domain Layer - Canonical ticker types and pure business logic.
//!
//! Nothing here performs I/O. Venue wire formats are translated into these
//! types by the exchange adapters in the infrastructure layer.

/// Formatted price, percent change, and classification.
pub mod derived;

/// Bounded price history and traffic counting.
pub mod history;

/// Per-session state, venues, and connection states.
pub mod session;

/// Canonical ticker record and its validation.
pub mod ticker;
