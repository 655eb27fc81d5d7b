// Authenticated REST execution
//
// `RequestExecutor` composes the URL, attaches the bearer header, and
// applies the one-refresh-one-retry rule on 401. Repositories in
// `galileo-core` sit on top of it and never touch the transport directly.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;
use url::form_urlencoded;

use crate::auth::{Credential, TokenStore, authorize};
use crate::endpoint::ApiBase;
use crate::error::Error;
use crate::transport::{HttpRequest, HttpResponse, RequestBody, Transport};

const OCTET_STREAM: &str = "application/octet-stream";

// ── Query ────────────────────────────────────────────────────────────

/// Ordered query parameters, form-encoded on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an already encoded query string (`a=1&b=2`).
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim_start_matches('?');
        Self {
            pairs: form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    #[must_use]
    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_owned(), value.to_string()));
        self
    }

    #[must_use]
    pub fn push_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    /// Add a comma-joined list parameter. An empty list adds nothing.
    #[must_use]
    pub fn push_list<S: AsRef<str>>(self, key: &str, values: &[S]) -> Self {
        if values.is_empty() {
            return self;
        }
        let joined = values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self.push(key, joined)
    }

    /// Pagination parameters, passed through as `page` and `items`.
    #[must_use]
    pub fn page(self, page: Option<u32>, items: Option<u32>) -> Self {
        self.push_opt("page", page).push_opt("items", items)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish()
    }
}

// ── RequestExecutor ──────────────────────────────────────────────────

/// Issues authenticated requests against the Galileo REST API.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    tokens: Arc<TokenStore>,
}

impl RequestExecutor {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn base(&self) -> &ApiBase {
        self.tokens.base()
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.tokens.transport()
    }

    /// Execute a request against `endpoint`.
    ///
    /// A 401 triggers one token refresh and one retry; a second 401 is
    /// [`Error::Unauthorized`]. Any other non-2xx status is
    /// [`Error::RequestFailed`]. Network failures are not retried.
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: Option<&Query>,
    ) -> Result<HttpResponse, Error> {
        let encoded = query.map(Query::encode);
        let url = self.base().url(endpoint, encoded.as_deref(), None)?;
        self.execute_url(method, url, body).await
    }

    /// Execute against a fully composed URL (see [`ApiBase::url`]).
    pub async fn execute_url(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<HttpResponse, Error> {
        let body = body.map(|b| RequestBody::Json(b.clone()));
        self.dispatch(method, url, body.as_ref()).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&RequestBody>,
    ) -> Result<HttpResponse, Error> {
        let credential = self.tokens.current_for_request().await?;
        debug!(%method, %url, "sending request");

        let resp = self.send_once(&method, &url, body, &credential).await?;
        if resp.status != StatusCode::UNAUTHORIZED {
            return into_result(resp);
        }

        debug!(%url, "401 received, refreshing credential and retrying once");
        let fresh = self.tokens.refresh_stale(&credential).await?;
        let retry = self.send_once(&method, &url, body, &fresh).await?;
        if retry.status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        into_result(retry)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&RequestBody>,
        credential: &Credential,
    ) -> Result<HttpResponse, Error> {
        let mut request = authorize(HttpRequest::new(method.clone(), url.clone()), credential);
        request.body = body.cloned();
        let resp = self.transport().send(request).await?;
        trace!(status = %resp.status, "request completed");
        Ok(resp)
    }

    // ── Typed helpers ────────────────────────────────────────────────

    /// GET and decode the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&Query>,
    ) -> Result<T, Error> {
        self.execute(Method::GET, endpoint, None, query).await?.json()
    }

    /// GET and return the body as untyped JSON.
    pub async fn get(&self, endpoint: &str, query: Option<&Query>) -> Result<Value, Error> {
        self.execute(Method::GET, endpoint, None, query)
            .await?
            .json_value()
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, Error> {
        self.execute(Method::POST, endpoint, Some(body), None)
            .await?
            .json_value()
    }

    pub async fn put(&self, endpoint: &str, body: Option<&Value>) -> Result<Value, Error> {
        self.execute(Method::PUT, endpoint, body, None)
            .await?
            .json_value()
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, Error> {
        self.execute(Method::DELETE, endpoint, None, None)
            .await?
            .json_value()
    }

    /// PUT raw bytes as `application/octet-stream`. Same 401 handling as
    /// [`execute`](Self::execute).
    pub async fn upload(
        &self,
        endpoint: &str,
        query: Option<&Query>,
        data: Vec<u8>,
    ) -> Result<Value, Error> {
        let encoded = query.map(Query::encode);
        let url = self.base().url(endpoint, encoded.as_deref(), None)?;
        let body = RequestBody::Bytes {
            content_type: OCTET_STREAM,
            data,
        };
        self.dispatch(Method::PUT, url, Some(&body))
            .await?
            .json_value()
    }
}

fn into_result(resp: HttpResponse) -> Result<HttpResponse, Error> {
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(Error::RequestFailed {
            status: resp.status.as_u16(),
            body: resp.body,
        })
    }
}
