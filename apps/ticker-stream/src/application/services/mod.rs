//! Application Services
//!
//! - [`session`]: starts venue sessions and returns their handles

pub mod session;

pub use session::{
    Callbacks, SessionError, SessionHandle, start_session, start_session_with_transport,
};
