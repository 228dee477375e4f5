//! Session gate for protected views.
//!
//! The gate is advisory: it decides which screen the console shows, while
//! the API server remains responsible for rejecting unauthenticated calls.

/// Render-or-redirect decision for protected views.
pub mod guard;
/// Session token providers.
pub mod store;

pub use guard::{GuardDecision, Location, Redirect, SessionGuard};
pub use store::{FileSessionStore, MemorySessionStore, SessionProvider, TOKEN_KEY};
