// URL composition for the Galileo user-interface API.
//
// Every REST call lands on
// `scheme://host[:port]/galileo/user_interface/v1/<endpoint>?<query>#<fragment>`.
// Only scheme, host and port are taken from the configured backend address.

use url::Url;

use crate::error::Error;

/// Fixed path prefix of the user-interface API.
pub const API_PREFIX: &str = "/galileo/user_interface/v1";

/// Endpoint of the push channel, relative to [`API_PREFIX`].
const PUSH_ENDPOINT: &str = "events";

/// The backend origin every request URL is composed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    origin: Url,
}

impl ApiBase {
    /// Build from a backend address such as `https://api.galileo.example:8443`.
    ///
    /// Any path, query or fragment on the address is discarded.
    pub fn new(backend: &Url) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidBackend {
            address: backend.to_string(),
            reason: reason.into(),
        };

        if !matches!(backend.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if backend.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }

        let mut origin = backend.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);
        Ok(Self { origin })
    }

    /// Parse a backend address string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        Self::new(&Url::parse(raw)?)
    }

    /// The origin (scheme, host, port) requests are sent to.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Compose the full URL for an endpoint.
    ///
    /// Leading slashes on `endpoint` are ignored. An absent or empty query
    /// or fragment produces no `?` / `#` at all.
    pub fn url(
        &self,
        endpoint: &str,
        query: Option<&str>,
        fragment: Option<&str>,
    ) -> Result<Url, Error> {
        let endpoint = endpoint.trim_start_matches('/');
        let mut url = self.origin.clone();
        url.set_path(&format!("{API_PREFIX}/{endpoint}"));
        url.set_query(query.filter(|q| !q.is_empty()));
        url.set_fragment(fragment.filter(|f| !f.is_empty()));
        Ok(url)
    }

    /// The push channel URL: the same origin with `ws`/`wss` instead of `http`/`https`.
    pub fn push_url(&self) -> Result<Url, Error> {
        let scheme = match self.origin.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        let host = self.origin.host_str().unwrap_or_default();
        let authority = match self.origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        Ok(Url::parse(&format!(
            "{scheme}://{authority}{API_PREFIX}/{PUSH_ENDPOINT}"
        ))?)
    }
}
