//! `galileo-agent`: accepts pending landing requests until interrupted.

mod cli;
mod error;

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use galileo_config::Config;
use galileo_core::{AutoAcceptAgent, Galileo, SdkConfig, topics};

use crate::cli::Cli;
use crate::error::AgentError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), AgentError> {
    let (profile_name, sdk_config) = build_sdk_config(&cli)?;

    let galileo = Galileo::new(sdk_config)?;
    galileo.connect().await.map_err(|source| {
        if source.is_auth_fatal() {
            AgentError::AuthFailed {
                profile: profile_name.clone(),
                source,
            }
        } else {
            AgentError::Core(source)
        }
    })?;
    info!(profile = %profile_name, "connected");

    galileo.on(topics::REQUEST_RECEIVED, |event| {
        info!(sequence = event.sequence, "landing request received");
        Ok(())
    });

    let agent = AutoAcceptAgent::new(
        galileo.requests().clone(),
        Duration::from_secs(cli.interval),
    )
    .for_machines(cli.machines);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                return;
            }
            info!("interrupt received, shutting down");
            cancel.cancel();
        });
    }

    let stats = agent.run(cancel).await;
    galileo.disconnect().await;
    info!(
        cycles = stats.cycles,
        accepted = stats.accepted,
        "agent finished"
    );
    Ok(())
}

/// Load the config file and turn the selected profile into an `SdkConfig`.
fn build_sdk_config(cli: &Cli) -> Result<(String, SdkConfig), AgentError> {
    let path = cli.config.clone().unwrap_or_else(galileo_config::config_path);
    let cfg = galileo_config::load_config_from(&path)?;
    let profile_name = cfg.active_profile_name(cli.profile.as_deref());

    let Ok(profile) = cfg.profile(&profile_name) else {
        return Err(AgentError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
            path: path.display().to_string(),
        });
    };

    let sdk_config = galileo_config::profile_to_sdk_config(profile, &profile_name, &cfg.defaults)?;
    Ok((profile_name, sdk_config))
}

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}
