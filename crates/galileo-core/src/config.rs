// ── Runtime SDK configuration ──
//
// Describes how to reach and authenticate with a Galileo backend. Carries
// credentials and tuning, never touches disk: `galileo-config` (or the
// embedding application) builds an `SdkConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use galileo_api::{ReconnectConfig, TlsMode, TransportConfig};

use crate::sync::EngineConfig;

/// How to authenticate.
#[derive(Debug, Clone)]
pub enum SdkCredentials {
    /// Log in with a username and password on connect.
    Password {
        username: String,
        password: SecretString,
    },
    /// Tokens obtained elsewhere. The access token is refreshed as needed.
    Tokens {
        access: SecretString,
        refresh: SecretString,
    },
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Bundled root store (strict).
    #[default]
    SystemDefaults,
    /// Additionally trust the CA in this PEM file.
    CustomCa(PathBuf),
    /// Skip verification. Development backends only.
    DangerAcceptInvalid,
}

/// Everything the [`Galileo`](crate::Galileo) facade needs.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Backend address, e.g. `https://api.galileo.example`. The API prefix
    /// is appended by the SDK.
    pub url: Url,
    pub credentials: SdkCredentials,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Open the push channel on connect.
    pub push_enabled: bool,
    pub reconnect: ReconnectConfig,
    /// Background snapshot period. `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Page size for snapshot pulls.
    pub page_size: u32,
}

impl SdkConfig {
    /// A config with defaults for everything but the address and credentials.
    pub fn new(url: Url, credentials: SdkCredentials) -> Self {
        Self {
            url,
            credentials,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            push_enabled: true,
            reconnect: ReconnectConfig::default(),
            poll_interval: None,
            page_size: crate::repository::SNAPSHOT_PAGE_SIZE,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }

    pub(crate) fn engine(&self) -> EngineConfig {
        EngineConfig {
            reconnect: self.reconnect.clone(),
            poll_interval: self.poll_interval,
        }
    }
}
