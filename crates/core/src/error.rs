#![allow(missing_docs)]

//! Error types shared by the API client and the resource manager.

use thiserror::Error;

use crate::models::CardId;

/// Draft fields that must be filled in before a save is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,
    #[error("description is required")]
    MissingDescription,
    #[error("upgrade cost is required")]
    MissingUpgradeCost,
}

/// Failures talking to the card API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors reported by [`crate::resource::ResourceManager`] operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid card: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("card {0} is not in the current list")]
    UnknownCard(CardId),
    #[error("no card dialog is open")]
    NoDraft,
    #[error("a save is already in progress")]
    SaveInFlight,
    #[error("card {0} is already being deleted")]
    DeleteInFlight(CardId),
}

impl ManagerError {
    /// Whether the failure was caught locally before any request was issued.
    pub fn is_local(&self) -> bool {
        !matches!(self, ManagerError::Api(_))
    }
}
