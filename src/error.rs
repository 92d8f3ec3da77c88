//! Error types for render scheduling and telemetry delivery

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a tracking session
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A render pass failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Telemetry could not be delivered
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A size/density observer could not be attached
    #[error(transparent)]
    ObserverAttach(#[from] ObserverAttachError),

    /// The session loop has stopped and no longer accepts events
    #[error("Session closed")]
    SessionClosed,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure of a single render pass.
///
/// Render failures are terminal for the trigger that started the pass; the
/// target shows a failure placeholder until a new trigger arrives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The document source could not be fetched
    #[error("Failed to fetch document: {0}")]
    Fetch(String),

    /// The document could not be decoded
    #[error("Failed to decode document: {0}")]
    Decode(String),

    /// A page could not be rasterized
    #[error("Failed to render page {page}: {reason}")]
    Page { page: u32, reason: String },
}

/// Failure to deliver a telemetry snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The request never reached the endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status
    #[error("Endpoint rejected telemetry with status {0}")]
    Status(u16),

    /// The payload could not be encoded
    #[error("Failed to encode telemetry: {0}")]
    Encode(String),
}

/// Failure to attach size or density observers to a target.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to attach {observer} observer to {target}: {reason}")]
pub struct ObserverAttachError {
    pub target: String,
    pub observer: &'static str,
    pub reason: String,
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::Status(status.as_u16()),
            None => TransportError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Encode(err.to_string())
    }
}
