//! Fault taxonomy of the parameter relay.
//!
//! None of these faults is fatal. Each is recovered where it occurs:
//! access faults select the message-passing fallback, malformed messages
//! are dropped, delivery faults are isolated per target, and a relay
//! timeout becomes the Reader's `errorMessage`.

use thiserror::Error;

/// Errors raised while relaying parameters between frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Another frame's location or document could not be read, usually
    /// because of a cross-origin restriction.
    #[error("cross-origin access denied: {0}")]
    AccessFault(String),
    /// Received data lacks the expected discriminator or shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// Posting to one specific frame failed.
    #[error("delivery failed: {0}")]
    DeliveryFault(String),
    /// No response arrived after every scheduled request.
    #[error(
        "No response from parent window after {attempts} request(s). \
         Install the postMessage listener in the parent page."
    )]
    RelayTimeout {
        /// Number of requests sent before giving up.
        attempts: u32,
    },
    /// A lifecycle call arrived after teardown.
    #[error("relay already disposed")]
    Disposed,
}

impl RelayError {
    /// Build an access fault from any displayable cause.
    pub fn access(cause: impl std::fmt::Display) -> Self {
        Self::AccessFault(cause.to_string())
    }

    /// Build a delivery fault from any displayable cause.
    pub fn delivery(cause: impl std::fmt::Display) -> Self {
        Self::DeliveryFault(cause.to_string())
    }

    /// Build a malformed-message fault from any displayable cause.
    pub fn malformed(cause: impl std::fmt::Display) -> Self {
        Self::MalformedMessage(cause.to_string())
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
