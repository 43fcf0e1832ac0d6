//! Configuration module for the STT and TTS endpoints.
//!
//! Settings come from a flat capability map (as handed over by the host
//! harness) or from environment variables. Parameters, headers and bodies
//! accept either JSON text or an already-structured JSON value; both are
//! normalized by [`ConfigValue`] when the request template is built.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ConfigError, Endpoint};

/// Capability names in the flat configuration namespace.
pub mod keys {
    pub const STT_URL: &str = "BSP_STT_URL";
    pub const STT_PARAMS: &str = "BSP_STT_PARAMS";
    pub const STT_METHOD: &str = "BSP_STT_METHOD";
    pub const STT_BODY: &str = "BSP_STT_BODY";
    pub const STT_HEADERS: &str = "BSP_STT_HEADERS";
    pub const STT_TIMEOUT: &str = "BSP_STT_TIMEOUT";
    pub const TTS_URL: &str = "BSP_TTS_URL";
    pub const TTS_PARAMS: &str = "BSP_TTS_PARAMS";
    pub const TTS_METHOD: &str = "BSP_TTS_METHOD";
    pub const TTS_BODY: &str = "BSP_TTS_BODY";
    pub const TTS_HEADERS: &str = "BSP_TTS_HEADERS";
    pub const TTS_TIMEOUT: &str = "BSP_TTS_TIMEOUT";
}

/// Default HTTP method for STT requests.
pub const DEFAULT_STT_METHOD: &str = "POST";

/// Default HTTP method for TTS requests.
pub const DEFAULT_TTS_METHOD: &str = "GET";

/// Default request timeout for both endpoints, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// A configuration value that may be absent, JSON text, or structured JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigValue {
    /// Not set
    #[default]
    Absent,
    /// Serialized JSON, parsed on resolve
    Text(String),
    /// Already-structured JSON
    Structured(Value),
}

impl ConfigValue {
    /// Classify a raw capability value.
    ///
    /// `null` and blank strings count as absent.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => ConfigValue::Absent,
            Some(Value::String(s)) if s.trim().is_empty() => ConfigValue::Absent,
            Some(Value::String(s)) => ConfigValue::Text(s.clone()),
            Some(other) => ConfigValue::Structured(other.clone()),
        }
    }

    /// Whether the value is unset.
    pub fn is_absent(&self) -> bool {
        matches!(self, ConfigValue::Absent)
    }

    /// Resolve to a JSON value, parsing text.
    ///
    /// `key` names the setting in error messages.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if the text is not valid JSON.
    pub fn resolve(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self {
            ConfigValue::Absent => Ok(None),
            ConfigValue::Text(text) => serde_json::from_str::<Value>(text)
                .map(|v| if v.is_null() { None } else { Some(v) })
                .map_err(|e| ConfigError::invalid_value(key, format!("not valid JSON: {e}"))),
            ConfigValue::Structured(Value::Null) => Ok(None),
            ConfigValue::Structured(value) => Ok(Some(value.clone())),
        }
    }

    /// Resolve to a JSON object, defaulting to `{}` when unset.
    ///
    /// Used for query parameters and headers.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for invalid JSON or a non-object value.
    pub fn resolve_map(&self, key: &str) -> Result<Map<String, Value>, ConfigError> {
        match self.resolve(key)? {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(ConfigError::invalid_value(
                key,
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    /// Resolve to an optional JSON value, defaulting to `None` when unset.
    ///
    /// Used for request bodies.
    pub fn resolve_optional(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        self.resolve(key)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Settings for one remote endpoint (STT or TTS).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// Which endpoint these settings belong to
    pub endpoint: Endpoint,
    /// Endpoint URL; the endpoint is disabled when unset
    pub url: Option<String>,
    /// Query parameters
    pub params: ConfigValue,
    /// HTTP method override
    pub method: Option<String>,
    /// Request body (TTS: JSON body, STT: extra multipart fields)
    pub body: ConfigValue,
    /// Request headers
    pub headers: ConfigValue,
    /// Request timeout override, in milliseconds
    pub timeout_ms: Option<u64>,
}

impl EndpointConfig {
    /// An endpoint with nothing configured.
    pub fn unset(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            url: None,
            params: ConfigValue::Absent,
            method: None,
            body: ConfigValue::Absent,
            headers: ConfigValue::Absent,
            timeout_ms: None,
        }
    }

    /// An endpoint pointing at `url` with all other settings defaulted.
    pub fn with_url(endpoint: Endpoint, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::unset(endpoint)
        }
    }

    /// Full capability name for a setting of this endpoint, e.g. `BSP_STT_PARAMS`.
    pub fn key(&self, suffix: &str) -> String {
        format!("BSP_{}_{}", self.endpoint, suffix)
    }

    /// Whether a URL is configured.
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// HTTP method, falling back to the endpoint default.
    pub fn method(&self) -> &str {
        match (&self.method, self.endpoint) {
            (Some(method), _) => method,
            (None, Endpoint::Stt) => DEFAULT_STT_METHOD,
            (None, Endpoint::Tts) => DEFAULT_TTS_METHOD,
        }
    }

    /// Request timeout, falling back to [`DEFAULT_TIMEOUT_MS`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    fn load(
        endpoint: Endpoint,
        get: &impl Fn(&str) -> Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::unset(endpoint);

        let url_key = config.key("URL");
        config.url = match get(&url_key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => return Err(ConfigError::invalid_value(url_key, "expected a string")),
        };

        config.params = ConfigValue::from_json(get(&config.key("PARAMS")).as_ref());
        config.body = ConfigValue::from_json(get(&config.key("BODY")).as_ref());
        config.headers = ConfigValue::from_json(get(&config.key("HEADERS")).as_ref());

        let method_key = config.key("METHOD");
        config.method = match get(&method_key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_uppercase()),
            Some(_) => return Err(ConfigError::invalid_value(method_key, "expected a string")),
        };

        let timeout_key = config.key("TIMEOUT");
        config.timeout_ms = parse_timeout(&timeout_key, get(&timeout_key))?;

        Ok(config)
    }
}

fn parse_timeout(key: &str, value: Option<Value>) -> Result<Option<u64>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid_value(key, format!("{n} is not a non-negative integer"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(key, format!("'{s}' is not a number of milliseconds"))),
        Some(_) => Err(ConfigError::invalid_value(key, "expected a number of milliseconds")),
    }
}

/// Connector configuration: one endpoint block each for STT and TTS.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    /// Speech-to-Text endpoint
    pub stt: EndpointConfig,
    /// Text-to-Speech endpoint
    pub tts: EndpointConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt: EndpointConfig::unset(Endpoint::Stt),
            tts: EndpointConfig::unset(Endpoint::Tts),
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a flat capability map.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for a malformed URL, method or timeout.
    pub fn from_caps(caps: &Map<String, Value>) -> Result<Self, ConfigError> {
        let get = |key: &str| caps.get(key).cloned();
        Ok(Self {
            stt: EndpointConfig::load(Endpoint::Stt, &get)?,
            tts: EndpointConfig::load(Endpoint::Tts, &get)?,
        })
    }

    /// Load configuration from an arbitrary string lookup.
    ///
    /// Every value is treated as text, the way environment variables arrive.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(Value::String);
        Ok(Self {
            stt: EndpointConfig::load(Endpoint::Stt, &get)?,
            tts: EndpointConfig::load(Endpoint::Tts, &get)?,
        })
    }

    /// Load configuration from environment variables and .env file.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        ::tracing::debug!(
            stt = config.stt.is_configured(),
            tts = config.tts.is_configured(),
            "Loaded speech configuration from environment"
        );
        Ok(config)
    }

    /// Settings for the given endpoint.
    pub fn endpoint(&self, endpoint: Endpoint) -> &EndpointConfig {
        match endpoint {
            Endpoint::Stt => &self.stt,
            Endpoint::Tts => &self.tts,
        }
    }
}
