//! Raw HTTP layer shared by the dispatcher and the auth endpoints.
//!
//! The transport knows nothing about sessions: it joins API paths onto the
//! base URL, merges headers, sends the request and hands back the status and
//! body. Whether a 401 leads to a refresh is decided one layer up.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::error::ApiError;

const USER_AGENT: &str = concat!("evcharge-client/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP transport, cheap to clone.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Method, body and header overrides for one request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Pre-serialized JSON body.
    pub body: Option<String>,
    /// Headers that win over the defaults and the bearer token.
    pub headers: HeaderMap,
}

impl RequestOptions {
    /// A bodiless `GET`.
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// A bodiless `DELETE`.
    #[must_use]
    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::get()
        }
    }

    /// A `POST` carrying `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Parse` if the body cannot be serialized.
    pub fn post_json<T: Serialize + ?Sized>(body: &T) -> Result<Self, ApiError> {
        Ok(Self {
            method: Method::POST,
            body: Some(serde_json::to_string(body)?),
            headers: HeaderMap::new(),
        })
    }

    /// Add a header override.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response body as text.
    pub body: String,
}

impl RawResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parse the body as JSON. An empty body yields `null`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Parse` if the body is not valid JSON.
    pub fn into_json(self) -> Result<serde_json::Value, ApiError> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a failed response into an error naming the request.
    #[must_use]
    pub fn into_error(self, method: &Method, endpoint: &str) -> ApiError {
        let message = if self.body.trim().is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        } else {
            self.body
        };

        ApiError::Status {
            method: method.clone(),
            endpoint: endpoint.to_string(),
            status: self.status,
            message,
        }
    }
}

impl Transport {
    /// Create a transport for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            inner: Arc::new(TransportInner { client, base_url }),
        })
    }

    /// Base URL every endpoint is appended to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve an API path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidEndpoint` unless `endpoint` is a relative API
    /// path starting with a single `/`.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        validate_endpoint(endpoint)?;

        let joined = format!(
            "{}{endpoint}",
            self.inner.base_url.as_str().trim_end_matches('/')
        );
        Url::parse(&joined).map_err(|e| ApiError::InvalidEndpoint(format!("{endpoint}: {e}")))
    }

    /// Send one request and return its status and body, whatever the status.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid, a header cannot be
    /// encoded, or the request fails before a response arrives.
    #[instrument(skip(self, options, token), fields(method = %options.method))]
    pub async fn send(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        token: Option<&SecretString>,
    ) -> Result<RawResponse, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let headers = merge_headers(token, &options.headers)?;

        let mut request = self
            .inner
            .client
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "API response");

        Ok(RawResponse { status, body })
    }

    /// `POST` a JSON body without authentication and parse the JSON reply.
    ///
    /// Used by the auth endpoints; a 401 here is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for a non-2xx answer, or a transport or
    /// parse error.
    pub async fn post_unauthenticated<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = RequestOptions::post_json(body)?;
        let response = self.send(endpoint, &options, None).await?;
        if !response.is_success() {
            return Err(response.into_error(&options.method, endpoint));
        }
        Ok(serde_json::from_value(response.into_json()?)?)
    }

    /// `GET` with an explicit bearer token, bypassing the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for a non-2xx answer, or a transport or
    /// parse error.
    pub async fn get_with_token<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        token: &SecretString,
    ) -> Result<T, ApiError> {
        let options = RequestOptions::get();
        let response = self.send(endpoint, &options, Some(token)).await?;
        if !response.is_success() {
            return Err(response.into_error(&options.method, endpoint));
        }
        Ok(serde_json::from_value(response.into_json()?)?)
    }
}

/// Reject anything that is not a relative API path.
fn validate_endpoint(endpoint: &str) -> Result<(), ApiError> {
    let invalid = |reason: &str| Err(ApiError::InvalidEndpoint(format!("{endpoint:?}: {reason}")));

    if !endpoint.starts_with('/') {
        return invalid("must start with '/'");
    }
    if endpoint.starts_with("//") {
        return invalid("must not name an authority");
    }
    if endpoint.contains("://") {
        return invalid("must not carry a scheme");
    }
    if endpoint.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("must not contain whitespace");
    }
    Ok(())
}

/// Defaults first, then the bearer token, then caller overrides.
fn merge_headers(
    token: Option<&SecretString>,
    overrides: &HeaderMap,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    for name in overrides.keys() {
        headers.remove(name);
    }
    for (name, value) in overrides {
        headers.append(name.clone(), value.clone());
    }

    Ok(headers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transport(base: &str) -> Transport {
        Transport::new(Url::parse(base).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_url_appends_path_to_base() {
        let t = transport("http://localhost:8080/api");
        assert_eq!(
            t.endpoint_url("/reservations/getall").unwrap().as_str(),
            "http://localhost:8080/api/reservations/getall"
        );

        let t = transport("http://localhost:8080/api/");
        assert_eq!(
            t.endpoint_url("/stations/free?timestamp=1700000000")
                .unwrap()
                .as_str(),
            "http://localhost:8080/api/stations/free?timestamp=1700000000"
        );
    }

    #[test]
    fn test_endpoint_url_rejects_non_api_paths() {
        let t = transport("http://localhost:8080/api");
        for bad in [
            "reservations",
            "//evil.example.com/x",
            "/redirect?to=https://evil.example.com",
            "/a b",
            "",
        ] {
            assert!(
                matches!(t.endpoint_url(bad), Err(ApiError::InvalidEndpoint(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_merge_headers_order() {
        let token = SecretString::from("at-1");

        let headers = merge_headers(Some(&token), &HeaderMap::new()).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer at-1");

        let mut overrides = HeaderMap::new();
        overrides.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        overrides.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let headers = merge_headers(Some(&token), &overrides).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
        assert_eq!(headers[AUTHORIZATION], "Basic abc");
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_merge_headers_without_token() {
        let headers = merge_headers(None, &HeaderMap::new()).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_raw_response_empty_body_is_null() {
        let response = RawResponse {
            status: StatusCode::OK,
            body: "  ".to_string(),
        };
        assert_eq!(response.into_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_raw_response_error_keeps_server_message() {
        let response = RawResponse {
            status: StatusCode::BAD_REQUEST,
            body: "Station already exists".to_string(),
        };
        let err = response.into_error(&Method::POST, "/admin/stations/add");
        assert_eq!(
            err.to_string(),
            "POST /admin/stations/add failed (400 Bad Request): Station already exists"
        );

        let response = RawResponse {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        let err = response.into_error(&Method::DELETE, "/reservations/cancel/9");
        assert!(err.to_string().ends_with("Not Found"));
    }

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::post_json(&serde_json::json!({"email": "d@example.com"}))
            .unwrap()
            .with_header(
                HeaderName::from_static("x-request-id"),
                HeaderValue::from_static("abc"),
            );
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.body.as_deref(), Some(r#"{"email":"d@example.com"}"#));
        assert_eq!(options.headers["x-request-id"], "abc");

        assert_eq!(RequestOptions::delete().method, Method::DELETE);
        assert!(RequestOptions::default().body.is_none());
    }
}
