//! Trellis Auth — opaque-token sessions for Trellis users.
//!
//! Clients hold a random bearer token. The graph only ever sees its
//! BLAKE3 digest, stored as the `id` of a `Session` node hanging off the
//! owning `User` through `HAS_SESSION`.

pub mod session;
pub mod token;

pub use session::{SessionManager, SessionValidation, SESSION_TTL_DAYS};
pub use token::{generate_session_token, hash_session_token};
