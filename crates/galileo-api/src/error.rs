use thiserror::Error;

/// Top-level error type for the `galileo-api` crate.
///
/// Covers every failure mode of the client plumbing: credentials,
/// transport, backend responses, payload decoding, and the push channel.
/// `galileo-core` maps these into its own `CoreError`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// No credential has been established yet (never logged in).
    #[error("Not authenticated -- log in before issuing requests")]
    NotAuthenticated,

    /// The backend rejected the refresh token. A fresh login is required.
    #[error("Refresh token rejected -- re-authentication required: {message}")]
    RefreshRejected { message: String },

    /// Access was denied even after one token refresh.
    #[error("Unauthorized -- access denied after token refresh")]
    Unauthorized,

    // ── Transport ───────────────────────────────────────────────────
    /// Network-level failure: timeout, connection refused, DNS, TLS handshake.
    #[error("Backend unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The configured backend address cannot be used as an API origin.
    #[error("Invalid backend address '{address}': {reason}")]
    InvalidBackend { address: String, reason: String },

    /// TLS configuration error (unreadable or invalid CA certificate).
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Backend ─────────────────────────────────────────────────────
    /// Any non-2xx response other than an authentication failure.
    #[error("Request failed (HTTP {status}): {body}")]
    RequestFailed { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Push channel ────────────────────────────────────────────────
    /// The push channel handshake failed.
    #[error("Push channel connection failed: {0}")]
    PushConnect(String),
}

impl Error {
    /// Returns `true` if the caller must re-authenticate before retrying.
    pub fn is_auth_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::RefreshRejected { .. } | Self::Unauthorized
        )
    }

    /// Returns `true` if this is a transient error worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportUnavailable { .. } | Self::PushConnect(_) => true,
            Self::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::TransportUnavailable { reason }
    }
}

/// First 200 characters of a response body, for log lines and error messages.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
