//! Agent errors with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use galileo_config::ConfigError;
use galileo_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(galileo::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Expected config at: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(
        code(galileo::config),
        help("Check the profile in your config file or the GALILEO_* environment variables.")
    )]
    Config(#[from] ConfigError),

    #[error("Authentication failed")]
    #[diagnostic(
        code(galileo::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             The password is read from GALILEO_PASSWORD, the system keyring, or the config file."
        )
    )]
    AuthFailed {
        profile: String,
        #[source]
        source: CoreError,
    },

    #[error("Could not reach the Galileo backend")]
    #[diagnostic(code(galileo::connection_failed))]
    Core(#[from] CoreError),
}

impl AgentError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProfileNotFound { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Core(err) if err.is_transient() => exit_code::CONNECTION,
            Self::Core(_) => exit_code::GENERAL,
        }
    }
}
