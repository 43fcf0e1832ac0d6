//! HTTP request templates built from endpoint configuration.
//!
//! A [`RequestTemplate`] is resolved once during validation and reused for
//! every turn. Per-turn requests start from the template and add the turn
//! specific parts (TTS text, STT audio, WER reference).

use std::collections::BTreeMap;
use std::time::Duration;

use bsp_connector_common::config::EndpointConfig;
use bsp_connector_common::error::{ConfigError, Endpoint, HttpFailure};
use bsp_connector_common::render;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the liveness probe on every speech service host.
pub const STATUS_PATH: &str = "/api/status";

/// Derive the status-check URL from an endpoint URL.
///
/// The URL is cut at the first `/` following the `scheme://` part and
/// [`STATUS_PATH`] is appended. A URL without a path is kept whole.
///
/// ```
/// use bsp_connector::request::status_url;
///
/// assert_eq!(
///     status_url("https://host.example.com:8080/v2/tts"),
///     "https://host.example.com:8080/api/status"
/// );
/// ```
pub fn status_url(base_url: &str) -> String {
    let authority_start = base_url.find("://").map(|i| i + 3).unwrap_or(0);
    let host_end = base_url[authority_start..]
        .find(['/', '?', '#'])
        .map(|i| authority_start + i)
        .unwrap_or(base_url.len());
    format!("{}{}", &base_url[..host_end], STATUS_PATH)
}

/// Whether a response content type means "not audio".
pub(crate) fn is_textual_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("text/") || ct.starts_with("application/json") || ct.contains("+json")
}

/// Reusable request settings for one endpoint.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub endpoint: Endpoint,
    pub url: String,
    pub method: Method,
    /// Query parameters, already rendered to strings.
    pub params: BTreeMap<String, String>,
    pub headers: HeaderMap,
    /// TTS: JSON body. STT: extra multipart fields, always an object.
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl RequestTemplate {
    /// Resolve an endpoint configuration into a template.
    ///
    /// # Errors
    /// Returns `ConfigError` when the URL is missing or any value cannot be
    /// turned into a valid HTTP request part.
    pub fn from_endpoint(config: &EndpointConfig) -> Result<Self, ConfigError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ConfigError::missing(config.key("URL")))?;

        let method_key = config.key("METHOD");
        let method = Method::from_bytes(config.method().as_bytes())
            .map_err(|_| ConfigError::invalid_value(&method_key, "not a valid HTTP method"))?;

        let params_key = config.key("PARAMS");
        let params = query_params(&config.params.resolve_map(&params_key)?);

        let headers_key = config.key("HEADERS");
        let headers = header_map(&headers_key, &config.headers.resolve_map(&headers_key)?)?;

        let body_key = config.key("BODY");
        let body = config.body.resolve_optional(&body_key)?;
        if config.endpoint == Endpoint::Stt {
            if let Some(other) = body.as_ref().filter(|b| !b.is_object()) {
                return Err(ConfigError::invalid_value(
                    body_key,
                    format!("expected a JSON object of form fields, got {other}"),
                ));
            }
        }

        Ok(Self {
            endpoint: config.endpoint,
            url,
            method,
            params,
            headers,
            body,
            timeout: config.timeout(),
        })
    }

    /// Status-check URL for this endpoint's host.
    pub fn status_url(&self) -> String {
        status_url(&self.url)
    }

    /// Start a request against the template URL with `params` and `headers`.
    pub(crate) fn builder(
        &self,
        http: &reqwest::Client,
        params: &BTreeMap<String, String>,
        headers: &HeaderMap,
    ) -> RequestBuilder {
        http.request(self.method.clone(), &self.url)
            .query(params)
            .headers(headers.clone())
            .timeout(self.timeout)
    }

    /// Diagnostic snapshot of a request derived from this template.
    pub(crate) fn trace(
        &self,
        params: &BTreeMap<String, String>,
        headers: &HeaderMap,
        body: BodyTrace,
    ) -> RequestTrace {
        RequestTrace {
            method: self.method.to_string(),
            url: self.url.clone(),
            params: params.clone(),
            headers: headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            body,
        }
    }
}

fn query_params(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), value_as_text(v)))
        .collect()
}

fn header_map(key: &str, map: &Map<String, Value>) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in map.iter().filter(|(_, v)| !v.is_null()) {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::invalid_value(key, format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(&value_as_text(value)).map_err(|_| {
            ConfigError::invalid_value(key, format!("invalid value for header '{name}'"))
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Summary of the body of a traced request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BodyTrace {
    None,
    Json { value: Value },
    Audio { content_type: String, bytes: usize },
    Multipart { fields: Vec<String>, audio_bytes: usize },
}

/// Serializable snapshot of an outbound request, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTrace {
    pub method: String,
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
    pub body: BodyTrace,
}

/// Send a request, turning non-2xx answers into [`HttpFailure::Status`].
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, HttpFailure> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        return Err(HttpFailure::status(status.as_u16(), render::shorten_bytes(&body)));
    }
    Ok(response)
}

/// Read a successful response into its content type and body bytes.
pub(crate) async fn read_body(response: Response) -> Result<(Option<String>, Vec<u8>), HttpFailure> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;
    Ok((content_type, bytes.to_vec()))
}
