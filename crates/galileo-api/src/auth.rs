// Bearer credential management.
//
// `TokenStore` owns the access/refresh token pair. Readers load it lock-free
// through an `ArcSwapOption`; login and refresh replace the whole pair in one
// store. Refresh is single-flight: callers hand back the credential they saw
// fail, and whoever takes the refresh lock first performs the exchange while
// the rest pick up its result.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::endpoint::ApiBase;
use crate::error::{Error, preview};
use crate::models::TokenResponse;
use crate::transport::{HttpRequest, Transport};

/// Refresh ahead of expiry by this many seconds.
const EXPIRY_MARGIN_SECS: i64 = 60;

const LOGIN_ENDPOINT: &str = "auth/login";
const REFRESH_ENDPOINT: &str = "auth/refresh";

// ── Credential ───────────────────────────────────────────────────────

/// An access/refresh token pair with an optional expiry.
#[derive(Debug)]
pub struct Credential {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: Option<DateTime<Utc>>,
    bearer: HeaderValue,
}

impl Credential {
    /// Build a credential from raw tokens.
    ///
    /// Fails if the access token cannot be carried in an HTTP header.
    pub fn new(
        access_token: SecretString,
        refresh_token: SecretString,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, Error> {
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {}", access_token.expose_secret())).map_err(
                |_| Error::Deserialization {
                    message: "access token contains characters not allowed in a header".into(),
                    body: String::new(),
                },
            )?;
        bearer.set_sensitive(true);

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            bearer,
        })
    }

    /// Build from a token response. A response without a refresh token
    /// keeps `previous_refresh`.
    fn from_response(
        response: TokenResponse,
        previous_refresh: Option<&SecretString>,
    ) -> Result<Self, Error> {
        let refresh_token = match (response.refresh_token, previous_refresh) {
            (Some(token), _) => SecretString::from(token),
            (None, Some(previous)) => SecretString::from(previous.expose_secret().to_owned()),
            (None, None) => {
                return Err(Error::Deserialization {
                    message: "login response carried no refresh_token".into(),
                    body: String::new(),
                });
            }
        };

        let now = Utc::now();
        let expires_at = response
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        Self::new(
            SecretString::from(response.access_token),
            refresh_token,
            expires_at,
        )
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The `Authorization` header value, marked sensitive.
    pub fn bearer(&self) -> &HeaderValue {
        &self.bearer
    }

    /// Whether the access token expires within the refresh margin of `now`.
    /// A credential without a known expiry never needs a proactive refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - now <= TimeDelta::seconds(EXPIRY_MARGIN_SECS))
    }
}

// ── TokenStore ───────────────────────────────────────────────────────

/// Holds the current credential and renews it against the backend.
pub struct TokenStore {
    transport: Arc<dyn Transport>,
    base: ApiBase,
    credential: ArcSwapOption<Credential>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenStore {
    pub fn new(transport: Arc<dyn Transport>, base: ApiBase) -> Self {
        Self {
            transport,
            base,
            credential: ArcSwapOption::empty(),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Start with an externally obtained credential.
    #[must_use]
    pub fn with_credential(self, credential: Credential) -> Self {
        self.credential.store(Some(Arc::new(credential)));
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.load().is_some()
    }

    /// Snapshot of the current credential.
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.credential.load_full()
    }

    /// Replace the credential with externally obtained tokens.
    pub fn set_credential(&self, credential: Credential) {
        self.credential.store(Some(Arc::new(credential)));
    }

    /// The current access token.
    pub fn get_access_token(&self) -> Result<SecretString, Error> {
        self.credential
            .load()
            .as_ref()
            .map(|c| SecretString::from(c.access_token.expose_secret().to_owned()))
            .ok_or(Error::NotAuthenticated)
    }

    /// Authenticate with a username and password.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let url = self.base.url(LOGIN_ENDPOINT, None, None)?;
        debug!(username, "logging in");

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });
        let resp = self
            .transport
            .send(HttpRequest::new(Method::POST, url).json(body))
            .await?;

        let status = resp.status.as_u16();
        if matches!(status, 400 | 401 | 403) {
            warn!(status, "login rejected");
            return Err(Error::Unauthorized);
        }
        if !resp.is_success() {
            return Err(Error::RequestFailed {
                status,
                body: resp.body,
            });
        }

        let credential = Credential::from_response(resp.json()?, None)?;
        self.credential.store(Some(Arc::new(credential)));
        info!(username, "login successful");
        Ok(())
    }

    /// Drop the credential. Subsequent requests fail with `NotAuthenticated`.
    pub fn logout(&self) {
        if self.credential.swap(None).is_some() {
            debug!("credential discarded");
        }
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self) -> Result<SecretString, Error> {
        let current = self.credential().ok_or(Error::NotAuthenticated)?;
        let fresh = self.refresh_stale(&current).await?;
        Ok(SecretString::from(
            fresh.access_token.expose_secret().to_owned(),
        ))
    }

    /// The credential to attach to an outgoing request, refreshed first if
    /// it is about to expire.
    pub async fn current_for_request(&self) -> Result<Arc<Credential>, Error> {
        let current = self.credential().ok_or(Error::NotAuthenticated)?;
        if current.needs_refresh(Utc::now()) {
            debug!("access token near expiry, refreshing proactively");
            return self.refresh_stale(&current).await;
        }
        Ok(current)
    }

    /// Refresh after `stale` was rejected.
    ///
    /// If another caller already replaced `stale` while this one waited for
    /// the lock, the replacement is returned without a second exchange.
    pub async fn refresh_stale(&self, stale: &Arc<Credential>) -> Result<Arc<Credential>, Error> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.credential().ok_or(Error::NotAuthenticated)?;
        if !Arc::ptr_eq(&current, stale) {
            debug!("credential already refreshed by a concurrent caller");
            return Ok(current);
        }

        match self.exchange_refresh_token(&current).await {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                self.credential.store(Some(Arc::clone(&fresh)));
                info!("access token refreshed");
                Ok(fresh)
            }
            Err(err @ Error::RefreshRejected { .. }) => {
                // A rejected refresh token cannot recover; force a new login.
                self.credential.store(None);
                warn!(error = %err, "refresh token rejected, credential cleared");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange_refresh_token(&self, current: &Credential) -> Result<Credential, Error> {
        let url = self.base.url(REFRESH_ENDPOINT, None, None)?;
        let body = json!({ "refresh_token": current.refresh_token.expose_secret() });
        let resp = self
            .transport
            .send(HttpRequest::new(Method::POST, url).json(body))
            .await?;

        let status = resp.status.as_u16();
        if matches!(status, 400 | 401 | 403) {
            return Err(Error::RefreshRejected {
                message: format!("HTTP {status}: {}", preview(&resp.body)),
            });
        }
        if !resp.is_success() {
            return Err(Error::RequestFailed {
                status,
                body: resp.body,
            });
        }

        Credential::from_response(resp.json()?, Some(&current.refresh_token))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("base", &self.base)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// Attach the bearer header of `credential` to `request`.
pub(crate) fn authorize(request: HttpRequest, credential: &Credential) -> HttpRequest {
    request.header(AUTHORIZATION, credential.bearer().clone())
}
