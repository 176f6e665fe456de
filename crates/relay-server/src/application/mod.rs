//! Application layer for relay-server.
//!
//! Session lifecycle and the router actor.  Nothing here touches a socket
//! directly; sessions talk to their connection through the traits in
//! [`crate::infrastructure::connection`].

pub mod router;
pub mod session;

pub use router::{DeliveryError, Router, RouterError, RouterHandle, SessionHandle};
pub use session::{run_session, Dispatch, Session, SessionError};
