//! Explicit connection context shared by the REST client and realtime feed.
//!
//! An [`ApiContext`] is built once by the embedding application and passed
//! down to every collaborator instead of being read from ambient globals.

use std::fmt;

use secrecy::SecretString;
use thiserror::Error;

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
/// Environment variable holding the API base URL.
pub const API_BASE_ENV: &str = "RESIGHT_API_BASE";
/// Environment variable holding an optional bearer token.
pub const API_TOKEN_ENV: &str = "RESIGHT_API_TOKEN";
/// Path segment appended to the base URL for the realtime feed.
pub const STREAM_PATH: &str = "/ws";

/// Errors raised while building an [`ApiContext`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The base URL does not use an `http` or `https` scheme.
    #[error("invalid api base url {0:?}: expected an http:// or https:// url")]
    InvalidBaseUrl(String),
}

/// API base URL and credentials for one dashboard backend.
#[derive(Clone)]
pub struct ApiContext {
    base_url: String,
    stream_endpoint: String,
    auth_token: Option<SecretString>,
}

impl ApiContext {
    /// Creates a context for `base_url` without credentials.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(base_url.as_ref());
        let stream_endpoint = derive_stream_endpoint(&base_url)?;
        Ok(Self {
            base_url,
            stream_endpoint,
            auth_token: None,
        })
    }

    /// Builds a context from `RESIGHT_API_BASE` and `RESIGHT_API_TOKEN`.
    ///
    /// Falls back to [`DEFAULT_API_BASE_URL`] when the base URL is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let context = Self::new(base_url)?;
        Ok(match std::env::var(API_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                context.with_auth_token(SecretString::new(token.trim().to_string()))
            }
            _ => context,
        })
    }

    /// Attaches a bearer token sent with REST requests.
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Realtime feed endpoint derived from the base URL.
    pub fn stream_endpoint(&self) -> &str {
        &self.stream_endpoint
    }

    pub fn auth_token(&self) -> Option<&SecretString> {
        self.auth_token.as_ref()
    }

    /// Joins `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("base_url", &self.base_url)
            .field("stream_endpoint", &self.stream_endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ApiContext {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            stream_endpoint: format!("ws://localhost:8000{STREAM_PATH}"),
            auth_token: None,
        }
    }
}

/// Derives the realtime feed endpoint from an API base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and `/ws` is appended.
pub fn derive_stream_endpoint(base_url: &str) -> Result<String, ConfigError> {
    let base_url = normalize_base_url(base_url);
    let mapped = strip_scheme(&base_url, "https://")
        .map(|rest| format!("wss://{rest}"))
        .or_else(|| strip_scheme(&base_url, "http://").map(|rest| format!("ws://{rest}")));

    match mapped {
        Some(endpoint) => Ok(format!("{endpoint}{STREAM_PATH}")),
        None => Err(ConfigError::InvalidBaseUrl(base_url)),
    }
}

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let head = url.get(..scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let rest = &url[scheme.len()..];
    (!rest.is_empty()).then_some(rest)
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::{derive_stream_endpoint, ApiContext, ConfigError, DEFAULT_API_BASE_URL};

    #[test]
    fn plain_http_maps_to_ws() {
        assert_eq!(
            derive_stream_endpoint("http://localhost:8000").expect("derive"),
            "ws://localhost:8000/ws"
        );
    }

    #[test]
    fn https_maps_to_wss() {
        assert_eq!(
            derive_stream_endpoint("https://api.example.com").expect("derive"),
            "wss://api.example.com/ws"
        );
    }

    #[test]
    fn trailing_slash_and_whitespace_are_ignored() {
        assert_eq!(
            derive_stream_endpoint("  https://api.example.com/v2/ \n").expect("derive"),
            "wss://api.example.com/v2/ws"
        );
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        assert_eq!(
            derive_stream_endpoint("ftp://files.example.com"),
            Err(ConfigError::InvalidBaseUrl(
                "ftp://files.example.com".to_string()
            ))
        );
        assert!(derive_stream_endpoint("http://").is_err());
    }

    #[test]
    fn context_joins_paths_onto_base_url() {
        let context = ApiContext::new("http://localhost:9000/").expect("context");
        assert_eq!(context.base_url(), "http://localhost:9000");
        assert_eq!(context.endpoint("/metrics"), "http://localhost:9000/metrics");
        assert_eq!(context.stream_endpoint(), "ws://localhost:9000/ws");
    }

    #[test]
    fn default_context_matches_default_base_url() {
        let context = ApiContext::default();
        let derived = ApiContext::new(DEFAULT_API_BASE_URL).expect("context");
        assert_eq!(context.base_url(), derived.base_url());
        assert_eq!(context.stream_endpoint(), derived.stream_endpoint());
    }

    #[test]
    fn debug_output_redacts_token() {
        let context = ApiContext::default()
            .with_auth_token(SecretString::new("super-secret".to_string()));
        let rendered = format!("{context:?}");
        assert!(!rendered.contains("super-secret"));
        assert_eq!(
            context.auth_token().map(|token| token.expose_secret().as_str()),
            Some("super-secret")
        );
    }
}
