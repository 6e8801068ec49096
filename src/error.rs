//! Error types for the NIOS provider.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while driving NIOS objects through their lifecycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The referenced object does not exist on the grid (HTTP 404).
    ///
    /// Never fatal by itself: a direct-lookup 404 triggers rediscovery, and
    /// a 404 on delete means the object is already gone.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The operation is blocked by another object referencing this one.
    ///
    /// NIOS reports in-use deletes (for example an option space still
    /// referenced by an option definition) this way. Only this variant is
    /// eligible for the bounded delete retry.
    #[error("Object in use: {0}")]
    Conflict(String),

    /// Any other non-2xx WAPI response.
    #[error("WAPI error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code returned by the grid.
        status: u16,
        /// Error text extracted from the WAPI error body.
        message: String,
    },

    /// Connection, TLS, or timeout failure talking to the grid.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Malformed state or plan handed to a lifecycle operation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether this error is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error is a delete-blocking conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// The error body shape returned by the WAPI on non-2xx responses.
///
/// The grid reports errors as `{"Error": "...", "code": "...", "text": "..."}`.
/// Older versions omit `text`, so both fields are optional.
#[derive(Debug, Deserialize)]
struct WapiErrorBody {
    #[serde(rename = "Error")]
    error: Option<String>,
    text: Option<String>,
}

/// Classify a non-2xx WAPI response into a [`ProviderError`].
///
/// 404 becomes [`ProviderError::NotFound`]. A 409, or a 400 whose error
/// text reports the object as still referenced or in use, becomes
/// [`ProviderError::Conflict`]. Everything else is a fatal
/// [`ProviderError::Api`].
pub fn classify_response(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<WapiErrorBody>(body)
        .ok()
        .and_then(|b| b.text.or(b.error))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        404 => ProviderError::NotFound(message),
        409 => ProviderError::Conflict(message),
        400 if is_in_use_message(&message) => ProviderError::Conflict(message),
        _ => ProviderError::Api { status, message },
    }
}

fn is_in_use_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("referenced") || lower.contains("in use")
}
