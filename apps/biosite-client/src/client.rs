//! # biosite HTTP Client
//!
//! [`ApiClient`] owns the HTTP connection pool, the base URL, the token
//! store and the two interceptor chains. Every call goes through the same
//! pipeline:
//!
//! ```text
//! build_url -> request interceptors -> send -> read body
//!           -> response interceptors -> normalize errors -> decode
//! ```

use crate::error::ClientError;
use crate::interceptors::{BearerAuth, RequestInterceptor, ResponseInterceptor, TokenCapture};
use crate::request::{ApiRequest, ApiResponse, build_url};
use crate::token_store::{MemoryTokenStore, TokenStore};
use biosite_core::ValidationErrors;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the biosite REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .finish()
    }
}

impl ApiClient {
    /// Client with an in-memory token store and the default interceptors.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        ApiClientBuilder::new(base_url).build()
    }

    pub fn builder(base_url: &str) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// The cached bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.tokens.get()
    }

    /// Expand a path template against this client's base URL.
    pub fn url(
        &self,
        template: &str,
        params: &[(&str, &str)],
        query: &[(&str, Option<String>)],
    ) -> Result<Url, ClientError> {
        build_url(&self.base_url, template, params, query)
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Run one call through the full pipeline and return the raw response.
    ///
    /// Non-2xx statuses come back as [`ClientError::Http`], after the
    /// response interceptors have seen them.
    pub async fn send(
        &self,
        method: Method,
        template: &str,
        params: &[(&str, &str)],
        query: &[(&str, Option<String>)],
        body: Option<Value>,
    ) -> Result<ApiResponse, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut request = ApiRequest {
            method,
            url: self.url(template, params, query)?,
            headers,
            body,
        };
        for interceptor in &self.request_interceptors {
            interceptor.on_request(&mut request)?;
        }

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");
        let resp = builder.send().await.map_err(|source| ClientError::Network {
            url: request.url.to_string(),
            source,
        })?;

        let mut response = self.read_response(request.method, resp).await?;
        for interceptor in &self.response_interceptors {
            interceptor.on_response(&mut response)?;
        }

        if !response.status.is_success() {
            return Err(normalize_error(&response));
        }
        Ok(response)
    }

    /// Send and decode a JSON body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        template: &str,
        params: &[(&str, &str)],
        query: &[(&str, Option<String>)],
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let response = self.send(method, template, params, query, body).await?;
        let value = response.body.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            ClientError::Decode(format!(
                "{} {}: {e}",
                response.method, response.path
            ))
        })
    }

    /// Send and discard the body (for `204 No Content` endpoints).
    pub async fn request_empty(
        &self,
        method: Method,
        template: &str,
        params: &[(&str, &str)],
        query: &[(&str, Option<String>)],
        body: Option<Value>,
    ) -> Result<(), ClientError> {
        self.send(method, template, params, query, body).await?;
        Ok(())
    }

    async fn read_response(
        &self,
        method: Method,
        resp: reqwest::Response,
    ) -> Result<ApiResponse, ClientError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let path = resp.url().path().to_string();
        let url = resp.url().to_string();
        let text = resp
            .text()
            .await
            .map_err(|source| ClientError::Network { url, source })?;

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Some(value),
                Err(e) if status.is_success() => {
                    return Err(ClientError::Decode(format!("{method} {path}: {e}")));
                }
                Err(_) => None,
            }
        };

        Ok(ApiResponse {
            method,
            path,
            status,
            headers,
            body,
            text,
        })
    }
}

/// Turn a non-2xx response into [`ClientError::Http`].
///
/// The message is the body's `error` string when present, else the
/// canonical reason phrase. `details` is kept only when it parses as a
/// field map.
fn normalize_error(response: &ApiResponse) -> ClientError {
    let status = response.status;
    let message = response
        .body
        .as_ref()
        .and_then(|body| body.get("error"))
        .and_then(|error| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| reason(status));
    let details = response
        .body
        .as_ref()
        .and_then(|body| body.get("details"))
        .and_then(|details| serde_json::from_value::<ValidationErrors>(details.clone()).ok());

    tracing::debug!(status = status.as_u16(), path = %response.path, %message, "Request failed");
    ClientError::Http {
        status: status.as_u16(),
        message,
        details,
    }
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

// =============================================================================
// BUILDER
// =============================================================================

/// Configures an [`ApiClient`].
///
/// `BearerAuth` and `TokenCapture` run first unless
/// [`without_default_interceptors`](Self::without_default_interceptors) is
/// called; custom interceptors run after them in the order added.
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    tokens: Option<Arc<dyn TokenStore>>,
    defaults: bool,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ApiClientBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout: DEFAULT_TIMEOUT,
            tokens: None,
            defaults: true,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn without_default_interceptors(mut self) -> Self {
        self.defaults = false;
        self
    }

    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Url(format!("{}: {e}", self.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Url(format!(
                "{} cannot be used as a base URL",
                self.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| ClientError::Network {
                url: self.base_url.clone(),
                source,
            })?;

        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));

        let mut request_interceptors: Vec<Arc<dyn RequestInterceptor>> = Vec::new();
        let mut response_interceptors: Vec<Arc<dyn ResponseInterceptor>> = Vec::new();
        if self.defaults {
            request_interceptors.push(Arc::new(BearerAuth::new(tokens.clone())));
            response_interceptors.push(Arc::new(TokenCapture::new(tokens.clone())));
        }
        request_interceptors.extend(self.request_interceptors);
        response_interceptors.extend(self.response_interceptors);

        Ok(ApiClient {
            http,
            base_url,
            tokens,
            request_interceptors,
            response_interceptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode, body: Option<Value>) -> ApiResponse {
        ApiResponse {
            method: Method::GET,
            path: "/x".into(),
            status,
            headers: HeaderMap::new(),
            body,
            text: String::new(),
        }
    }

    #[test]
    fn normalize_prefers_server_message() {
        let err = normalize_error(&response(
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(serde_json::json!({
                "error": "Validation failed",
                "details": {"email": ["is required"]}
            })),
        ));
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.to_string(), "HTTP 422: Validation failed");
        let details = err.validation_details().expect("details");
        assert_eq!(details.field("email"), Some(&["is required".to_string()][..]));
    }

    #[test]
    fn normalize_falls_back_to_reason() {
        let err = normalize_error(&response(StatusCode::BAD_GATEWAY, None));
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[test]
    fn builder_rejects_bad_base() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ClientError::Url(_))
        ));
        assert!(matches!(
            ApiClient::new("data:text/plain,hi"),
            Err(ClientError::Url(_))
        ));
    }

    #[test]
    fn default_interceptors_can_be_disabled() {
        let client = ApiClient::builder("http://localhost:8080")
            .without_default_interceptors()
            .build()
            .expect("client");
        assert!(client.request_interceptors.is_empty());
        assert!(client.response_interceptors.is_empty());

        let client = ApiClient::new("http://localhost:8080").expect("client");
        assert_eq!(client.request_interceptors.len(), 1);
        assert_eq!(client.response_interceptors.len(), 1);
    }
}
