//! Error types for the speech connector.
//!
//! This module provides the error hierarchy using `thiserror`, shared by the
//! validator and the turn handler.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration values
//! - `Error::NotConfigured`: A capability required by the attempted action is absent
//! - `Error::Validation`: Status probe failed or returned a non-OK body
//! - `Error::Media`: Attachment not fetched or unsupported MIME type
//! - `Error::Transport`: Network failure or non-2xx response
//! - `Error::ResponseShape`: Expected binary/JSON body not received
//! - `Error::Delivery`: The host stopped listening for replies

use std::fmt;

use thiserror::Error;

/// Which remote service an operation talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Speech-to-Text
    Stt,
    /// Text-to-Speech
    Tts,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Stt => write!(f, "STT"),
            Endpoint::Tts => write!(f, "TTS"),
        }
    }
}

/// Unified error type for the connector.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (unparseable or invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The action needs an endpoint that is not configured
    #[error("{endpoint} not configured, {hint}")]
    NotConfigured {
        /// The missing endpoint
        endpoint: Endpoint,
        /// What the caller can still do
        hint: String,
    },

    /// The status probe of an endpoint failed
    #[error("Checking {endpoint} Status failed - {detail}")]
    Validation {
        /// The endpoint whose probe failed
        endpoint: Endpoint,
        /// Rendered failure detail
        detail: String,
    },

    /// Media attachment errors
    #[error("{0}")]
    Media(String),

    /// The turn carried neither text nor media
    #[error("no text and no audio input given")]
    EmptyTurn,

    /// Transport errors with the action that failed (`TTS "hi"`, `STT`)
    #[error("{context} failed - {failure}")]
    Transport {
        /// Human-readable name of the failed action
        context: String,
        /// The underlying HTTP failure
        failure: HttpFailure,
    },

    /// The response did not have the expected shape
    #[error("{endpoint} failed, response is: {body}")]
    ResponseShape {
        /// The endpoint that answered
        endpoint: Endpoint,
        /// Shortened rendering of the body
        body: String,
    },

    /// The reply channel was closed by the host
    #[error("Reply could not be delivered: receiver closed")]
    Delivery,
}

impl Error {
    /// Create a new not-configured error.
    ///
    /// # Example
    ///
    /// ```
    /// use bsp_connector_common::error::{Endpoint, Error};
    ///
    /// let err = Error::not_configured(Endpoint::Tts, "only audio input supported");
    /// assert!(err.to_string().contains("TTS not configured"));
    /// ```
    pub fn not_configured(endpoint: Endpoint, hint: impl Into<String>) -> Self {
        Error::NotConfigured {
            endpoint,
            hint: hint.into(),
        }
    }

    /// Create a new validation error for a failed status probe.
    pub fn validation(endpoint: Endpoint, detail: impl Into<String>) -> Self {
        Error::Validation {
            endpoint,
            detail: detail.into(),
        }
    }

    /// Create a new media error.
    pub fn media(message: impl Into<String>) -> Self {
        Error::Media(message.into())
    }

    /// Create a new transport error.
    ///
    /// # Example
    ///
    /// ```
    /// use bsp_connector_common::error::{Error, HttpFailure};
    ///
    /// let err = Error::transport("STT", HttpFailure::status(502, "bad gateway"));
    /// assert_eq!(err.to_string(), "STT failed - Status: 502 / Response: bad gateway");
    /// ```
    pub fn transport(context: impl Into<String>, failure: HttpFailure) -> Self {
        Error::Transport {
            context: context.into(),
            failure,
        }
    }

    /// Create a new response-shape error.
    pub fn response_shape(endpoint: Endpoint, body: impl Into<String>) -> Self {
        Error::ResponseShape {
            endpoint,
            body: body.into(),
        }
    }
}

/// Configuration errors.
///
/// These errors occur when loading or resolving configuration from the
/// capability map or environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is not set
    #[error("Required configuration value {0} is not set")]
    Missing(String),

    /// A value is set but cannot be used
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing value error.
    pub fn missing(name: impl Into<String>) -> Self {
        ConfigError::Missing(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// A failed HTTP exchange.
///
/// Failures that produced a response report the status code and a shortened
/// body; failures without a response report the underlying message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpFailure {
    /// The server answered with a non-2xx status
    #[error("Status: {status} / Response: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Shortened response body
        body: String,
    },

    /// No response was received (connect error, timeout, ...)
    #[error("{0}")]
    Transport(String),
}

impl HttpFailure {
    /// Create a failure for a non-2xx response.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        HttpFailure::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a failure for a request that never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        HttpFailure::Transport(message.into())
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpFailure::Transport(format!("request timed out: {err}"))
        } else {
            HttpFailure::Transport(err.to_string())
        }
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
