//! Clap derive structures for `galileo-agent`.

use std::path::PathBuf;

use clap::Parser;

/// Accepts pending landing requests on your Galileo machines.
#[derive(Debug, Parser)]
#[command(
    name = "galileo-agent",
    version,
    about = "Accept pending Galileo landing requests on a fixed interval",
    long_about = "Polls the Galileo backend for landing requests in the pending state\n\
        and accepts each one. Runs until interrupted with Ctrl-C."
)]
pub struct Cli {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "GALILEO_PROFILE")]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "GALILEO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds between polling cycles
    #[arg(
        long,
        short = 'i',
        default_value = "2",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Only accept requests for this machine (repeatable)
    #[arg(long = "machine", short = 'm', value_name = "MID")]
    pub machines: Vec<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn interval_must_be_positive() {
        assert!(Cli::try_parse_from(["galileo-agent", "--interval", "0"]).is_err());
        let cli = Cli::try_parse_from(["galileo-agent", "-vv", "-m", "m1", "-m", "m2"]);
        assert!(matches!(cli, Ok(ref c) if c.verbose == 2 && c.machines.len() == 2 && c.interval == 2));
    }
}
