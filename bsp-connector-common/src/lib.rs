//! BSP Connector Common Library
//!
//! Shared configuration, error types, payload rendering and tracing setup
//! for the speech synthesis & recognition connector.

pub mod config;
pub mod error;
pub mod render;
pub mod tracing;


pub use config::{ConfigValue, EndpointConfig, SpeechConfig};
pub use error::{ConfigError, Endpoint, Error, HttpFailure, Result};
