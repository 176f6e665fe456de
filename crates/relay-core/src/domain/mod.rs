//! Domain entities for the state relay.
//!
//! Pure types with no transport dependencies.  The relay's routing decisions
//! are made entirely in terms of [`ids::SessionId`]; nothing in this module
//! knows about sockets or async runtimes.

/// Session identifiers and their allocation.
pub mod ids;
