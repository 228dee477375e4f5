//! Card API access and the resource manager driving it.

/// HTTP client for the card endpoints.
pub mod client;
/// Card list and dialog state machine.
pub mod manager;

pub use client::{CardApi, HttpCardApi};
pub use manager::{DeleteRequest, Dialog, DialogMode, ResourceManager, SaveRequest};
