//! Domain types and DTOs
//!
//! Jobs, cleaner requests, connect accounts and the money type they share.

pub mod accounts;
pub mod events;
pub mod jobs;
pub mod money;
pub mod notifications;
pub mod pricing;
pub mod requests;

// Re-export commonly used types
pub use accounts::*;
pub use events::*;
pub use jobs::*;
pub use money::{Money, MoneyError};
pub use requests::*;
