// HTTP transport abstraction.
//
// Everything above this module talks to the backend through the `Transport`
// trait, so tests (and embedders with their own HTTP stack) can swap the
// reqwest-backed implementation out. TLS and timeout settings live in
// `TransportConfig`, shared by every client built from it.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::trace;
use url::Url;

use crate::error::{Error, preview};

const USER_AGENT: &str = concat!("galileo-rs/", env!("CARGO_PKG_VERSION"));

// ── Request / response ───────────────────────────────────────────────

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    /// Raw bytes sent with the given content type (file uploads).
    Bytes {
        content_type: &'static str,
        data: Vec<u8>,
    },
}

/// A fully composed HTTP request, ready to hand to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn bytes(mut self, content_type: &'static str, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes { content_type, data });
        self
    }
}

/// Status, headers and body text of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&self.body)),
            body: self.body.clone(),
        })
    }

    /// Decode the body as an arbitrary JSON value. An empty body is `null`.
    pub fn json_value(&self) -> Result<serde_json::Value, Error> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        self.json()
    }
}

// ── Transport trait ──────────────────────────────────────────────────

/// Performs HTTP exchanges.
///
/// Implementations must report connection-level failures (timeout, refused
/// connection, DNS) as [`Error::TransportUnavailable`] and must return every
/// response that arrived, whatever its status, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}

// ── TransportConfig ──────────────────────────────────────────────────

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the bundled webpki root store.
    #[default]
    System,
    /// Trust an additional CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed development backends).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── HttpTransport ────────────────────────────────────────────────────

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.http.request(method, url).headers(headers);
        match body {
            Some(RequestBody::Json(body)) => builder = builder.json(&body),
            Some(RequestBody::Bytes { content_type, data }) => {
                builder = builder.header(CONTENT_TYPE, content_type).body(data);
            }
            None => {}
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        trace!(%status, bytes = body.len(), "response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[test]
    fn empty_body_decodes_as_null() {
        assert_eq!(response("  ").json_value().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn invalid_json_keeps_raw_body() {
        let err = response("<html>").json_value().unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert_eq!(body, "<html>"),
            other => panic!("expected Deserialization, got {other:?}"),
        }
    }

    #[test]
    fn bytes_body_replaces_json_body() {
        let url = Url::parse("https://galileo.test/upload").unwrap();
        let request = HttpRequest::new(Method::PUT, url)
            .json(serde_json::json!({ "ignored": true }))
            .bytes("application/octet-stream", b"abc".to_vec());
        assert_eq!(
            request.body,
            Some(RequestBody::Bytes {
                content_type: "application/octet-stream",
                data: b"abc".to_vec(),
            })
        );
    }

    #[test]
    fn default_config_verifies_certificates() {
        let config = TransportConfig::default();
        assert!(matches!(config.tls, TlsMode::System));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.build_client().is_ok());
    }
}
