// ── Core error types ──
//
// Errors surfaced by galileo-core. Transport-layer failures from
// `galileo-api` are translated by the `From` impl below; conversion and
// lifecycle failures originate here.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Not authenticated -- log in first")]
    NotAuthenticated,

    #[error("Refresh token rejected -- re-authentication required: {message}")]
    RefreshRejected { message: String },

    #[error("Unauthorized -- access denied after token refresh")]
    Unauthorized,

    // ── Transport / backend ──────────────────────────────────────────
    #[error("Backend unavailable: {reason}")]
    TransportUnavailable { reason: String },

    #[error("Request failed (HTTP {status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Push channel error: {reason}")]
    PushChannel { reason: String },

    // ── Data ─────────────────────────────────────────────────────────
    /// A payload lacked a required field, had one of the wrong shape,
    /// or carried an unknown status or invalid timestamp.
    #[error("Malformed {entity} payload: {reason}")]
    MalformedPayload { entity: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A local file or directory handed to an upload could not be read.
    #[error("Cannot read {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration / lifecycle ────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Shut down")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn malformed(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Failures a poller tolerates and retries on its next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable { .. } | Self::RequestFailed { .. } | Self::PushChannel { .. }
        )
    }

    /// Failures that need a new login before anything can succeed.
    pub fn is_auth_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::RefreshRejected { .. } | Self::Unauthorized
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<galileo_api::Error> for CoreError {
    fn from(err: galileo_api::Error) -> Self {
        use galileo_api::Error as Api;

        match err {
            Api::NotAuthenticated => Self::NotAuthenticated,
            Api::RefreshRejected { message } => Self::RefreshRejected { message },
            Api::Unauthorized => Self::Unauthorized,
            Api::TransportUnavailable { reason } => Self::TransportUnavailable { reason },
            Api::RequestFailed { status, body } => Self::RequestFailed { status, body },
            Api::PushConnect(reason) => Self::PushChannel { reason },
            Api::Deserialization { message, .. } => Self::MalformedPayload {
                entity: "response".into(),
                reason: message,
            },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::InvalidBackend { address, reason } => Self::Config {
                message: format!("invalid backend address '{address}': {reason}"),
            },
            Api::Tls(message) => Self::Config {
                message: format!("TLS: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_their_classification() {
        let err = CoreError::from(galileo_api::Error::RequestFailed {
            status: 502,
            body: "bad gateway".into(),
        });
        assert!(err.is_transient());
        assert!(!err.is_auth_fatal());

        let err = CoreError::from(galileo_api::Error::RefreshRejected {
            message: "revoked".into(),
        });
        assert!(err.is_auth_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn malformed_payload_is_not_transient() {
        let err = CoreError::malformed("machine", "missing field `status`");
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Malformed machine payload: missing field `status`"
        );
    }
}
