//! Client-wide error types and the user-facing message table.
//!
//! All API failures are terminal at the caller — there is no retry logic
//! anywhere in this client; every failure is a one-shot user notification.

use thiserror::Error;

use crate::types::ApplicationStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response.  `message` is the user-facing text looked up in the
    /// per-endpoint table; `None` when the status code is unmapped, in which
    /// case the caller shows nothing.
    #[error("API error {status}: {}", message.as_deref().unwrap_or("(no message)"))]
    Api { status: u16, message: Option<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Business-rule violation caught before any request was sent.
    #[error("Illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Shown when the request never reached the server (fetch threw).
pub const TRANSPORT_FAILURE_MESSAGE: &str =
    "Something went wrong while contacting the server. Please try again later.";

impl ClientError {
    /// The text the UI shows the user for this failure, if any.
    ///
    /// Transport failures get the generic try-again message; API failures
    /// carry the table message looked up when the response was checked;
    /// everything else (including unmapped status codes) shows nothing.
    pub fn user_facing_message(&self) -> Option<&str> {
        match self {
            ClientError::Http(_) => Some(TRANSPORT_FAILURE_MESSAGE),
            ClientError::Api { message, .. } => message.as_deref(),
            ClientError::Json(_)
            | ClientError::Config(_)
            | ClientError::IllegalTransition { .. } => None,
        }
    }
}

/// The endpoint a failed request was aimed at; selects the message table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ListApplications,
    GetApplication,
    UpdateStatus,
    DeleteApplication,
    WithdrawBytes,
    ConfirmReceival,
    ListLocations,
}

/// Map an HTTP status code to the user-facing message for `endpoint`.
///
/// 429 and 500 carry fixed generic messages that override any per-endpoint
/// entry.  Unmapped codes return `None`: the UI shows nothing for them.
pub fn user_message(endpoint: Endpoint, status: u16) -> Option<&'static str> {
    // Overrides first; the table below never sees these two codes.
    match status {
        429 => return Some("Too many requests. Please wait a moment before trying again."),
        500 => return Some("Something went wrong on the server. Please try again later."),
        _ => {}
    }

    match (endpoint, status) {
        (Endpoint::ListApplications, 404) => Some("No applications were found."),
        (Endpoint::GetApplication, 404) => Some("The application could not be found."),
        (Endpoint::UpdateStatus, 401) => Some("You must be logged in to donate."),
        (Endpoint::UpdateStatus, 403) => {
            Some("You are not allowed to change this application.")
        }
        (Endpoint::UpdateStatus, 404) => Some("The application no longer exists."),
        (Endpoint::UpdateStatus, 409) => {
            Some("The application was locked by another donor in the meantime.")
        }
        (Endpoint::DeleteApplication, 401) => Some("You must be logged in to delete an application."),
        (Endpoint::DeleteApplication, 403) => {
            Some("Only the receiver who created an application may delete it.")
        }
        (Endpoint::DeleteApplication, 404) => Some("The application no longer exists."),
        (Endpoint::WithdrawBytes, 401) => Some("You must be logged in to withdraw funds."),
        (Endpoint::WithdrawBytes, 403) => {
            Some("Only the producer of the product may withdraw its funds.")
        }
        (Endpoint::WithdrawBytes, 404) => Some("There are no funds to withdraw."),
        (Endpoint::ConfirmReceival, 401) => {
            Some("You must be logged in to confirm receival.")
        }
        (Endpoint::ConfirmReceival, 403) => {
            Some("Only the receiver of the product may confirm receival.")
        }
        (Endpoint::ConfirmReceival, 404) => Some("The application no longer exists."),
        (Endpoint::ListLocations, 404) => Some("No locations with open applications were found."),
        _ => None,
    }
}
