#![warn(clippy::all, missing_docs)]

//! Core logic for the card administration console.
//!
//! This crate hosts the card models, configuration handling, the session
//! gate for protected views, and the resource manager that keeps the card
//! catalog in step with the remote API.

pub mod config;
pub mod error;
pub mod models;
pub mod resource;
pub mod session;

pub use config::AppConfig;
pub use error::{ApiError, ManagerError, ValidationError};
pub use models::{Card, CardDraft, CardForm, CardId, ImageAttachment};
pub use resource::{CardApi, Dialog, DialogMode, HttpCardApi, ResourceManager};
pub use session::{FileSessionStore, GuardDecision, Location, Redirect, SessionGuard};
