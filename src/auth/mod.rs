//! Access token verification
//!
//! Identity is delegated to the provider; this module only verifies its
//! tokens and exposes the caller's id to handlers.

pub mod claims;
pub mod context;
pub mod jwks;
pub mod middleware;

pub use claims::Claims;
pub use context::AuthContext;
pub use jwks::JwksCache;
pub use middleware::{RequireAdmin, RequireAuth};
