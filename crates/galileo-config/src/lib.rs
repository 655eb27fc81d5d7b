//! Configuration profiles for Galileo tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `galileo_core::SdkConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use galileo_core::{ReconnectConfig, SdkConfig, SdkCredentials, TlsVerification};

/// Keyring service name for stored secrets.
pub const KEYRING_SERVICE: &str = "galileo";

/// Environment variable consulted for the password before the keyring.
pub const PASSWORD_ENV: &str = "GALILEO_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: `requested`, else `default_profile`,
    /// else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Values applied to every profile that does not override them.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Open the push channel.
    #[serde(default = "default_push")]
    pub push: bool,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            push: default_push(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_push() -> bool {
    true
}
fn default_page_size() -> u32 {
    100
}

/// A named backend profile.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Profile {
    /// Backend base URL (e.g. "https://api.galileo.example").
    pub url: String,

    /// Username for password login.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Externally obtained tokens, used when no username is set.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,

    /// Path to a custom CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,

    /// Request timeout override, seconds.
    pub timeout: Option<u64>,

    /// Push channel override.
    pub push: Option<bool>,

    /// Background snapshot period in seconds. Absent or zero disables it.
    pub poll_interval: Option<u64>,

    pub page_size: Option<u32>,

    /// Give up on the push channel after this many failed handshakes.
    pub max_reconnects: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "galileo", "galileo").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("galileo");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest on a double underscore:
/// `GALILEO_PROFILES__LAB__URL` sets `profiles.lab.url`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("GALILEO_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password: profile's `password_env`, `GALILEO_PASSWORD`,
/// system keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env vars
    let env_names = profile.password_env.as_deref().into_iter().chain([PASSWORD_ENV]);
    for name in env_names {
        if let Ok(pw) = std::env::var(name) {
            return Ok(SecretString::from(pw));
        }
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Pick the login mode: a username means password login, otherwise both
/// tokens must be present.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<SdkCredentials, ConfigError> {
    if let Some(ref username) = profile.username {
        let password = resolve_password(profile, profile_name)?;
        return Ok(SdkCredentials::Password {
            username: username.clone(),
            password,
        });
    }

    match (&profile.access_token, &profile.refresh_token) {
        (Some(access), Some(refresh)) => Ok(SdkCredentials::Tokens {
            access: SecretString::from(access.clone()),
            refresh: SecretString::from(refresh.clone()),
        }),
        (Some(_), None) | (None, Some(_)) => Err(ConfigError::Validation {
            field: "access_token".into(),
            reason: "access_token and refresh_token must be set together".into(),
        }),
        (None, None) => Err(ConfigError::NoCredentials {
            profile: profile_name.into(),
        }),
    }
}

// ── Profile → SdkConfig ─────────────────────────────────────────────

/// Build an `SdkConfig` from a profile, falling back to `defaults` for
/// anything the profile leaves unset.
pub fn profile_to_sdk_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SdkConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let credentials = resolve_credentials(profile, profile_name)?;

    let page_size = profile.page_size.unwrap_or(defaults.page_size);
    if page_size == 0 {
        return Err(ConfigError::Validation {
            field: "page_size".into(),
            reason: "must be at least 1".into(),
        });
    }

    let mut config = SdkConfig::new(url, credentials);
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.push_enabled = profile.push.unwrap_or(defaults.push);
    config.poll_interval = profile
        .poll_interval
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    config.page_size = page_size;
    config.reconnect = ReconnectConfig {
        max_retries: profile.max_reconnects,
        ..ReconnectConfig::default()
    };

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn token_profile() -> Profile {
        Profile {
            url: "https://api.galileo.example".into(),
            access_token: Some("a1".into()),
            refresh_token: Some("r1".into()),
            ..Profile::default()
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults, Defaults::default());
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "lab"

[defaults]
timeout = 10

[profiles.lab]
url = "https://lab.galileo.example"
username = "ada"
poll_interval = 60
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        let lab = cfg.profile("lab").unwrap();

        assert_eq!(cfg.active_profile_name(None), "lab");
        assert_eq!(cfg.active_profile_name(Some("prod")), "prod");
        assert_eq!(cfg.defaults.timeout, 10);
        assert!(cfg.defaults.push);
        assert_eq!(lab.username.as_deref(), Some("ada"));
        assert_eq!(lab.poll_interval, Some(60));
        assert!(matches!(
            cfg.profile("prod"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert("default".into(), token_profile());

        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.profile("default").unwrap(), &token_profile());
    }

    #[test]
    fn token_profile_maps_to_sdk_config() {
        let profile = Profile {
            ca_cert: Some(PathBuf::from("/etc/galileo/ca.pem")),
            poll_interval: Some(0),
            max_reconnects: Some(5),
            ..token_profile()
        };
        let defaults = Defaults {
            push: false,
            ..Defaults::default()
        };

        let cfg = profile_to_sdk_config(&profile, "default", &defaults).unwrap();

        assert_eq!(cfg.url.as_str(), "https://api.galileo.example/");
        assert_eq!(
            cfg.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/galileo/ca.pem"))
        );
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(!cfg.push_enabled);
        assert_eq!(cfg.poll_interval, None);
        assert_eq!(cfg.reconnect.max_retries, Some(5));
        match cfg.credentials {
            SdkCredentials::Tokens { access, refresh } => {
                assert_eq!(access.expose_secret(), "a1");
                assert_eq!(refresh.expose_secret(), "r1");
            }
            SdkCredentials::Password { .. } => panic!("expected tokens"),
        }
    }

    #[test]
    fn insecure_wins_over_ca_cert() {
        let profile = Profile {
            insecure: Some(true),
            ca_cert: Some(PathBuf::from("ca.pem")),
            poll_interval: Some(15),
            ..token_profile()
        };
        let cfg = profile_to_sdk_config(&profile, "default", &Defaults::default()).unwrap();

        assert_eq!(cfg.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(cfg.poll_interval, Some(Duration::from_secs(15)));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let profile = Profile {
            url: "not a url".into(),
            ..token_profile()
        };
        let err = profile_to_sdk_config(&profile, "default", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
    }

    #[test]
    fn half_a_token_pair_is_rejected() {
        let profile = Profile {
            refresh_token: None,
            ..token_profile()
        };
        assert!(matches!(
            resolve_credentials(&profile, "default"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn profile_without_credentials_is_rejected() {
        let profile = Profile {
            url: "https://api.galileo.example".into(),
            ..Profile::default()
        };
        assert!(matches!(
            resolve_credentials(&profile, "default"),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let profile = Profile {
            page_size: Some(0),
            ..token_profile()
        };
        assert!(profile_to_sdk_config(&profile, "default", &Defaults::default()).is_err());
    }
}
