use clap::Parser;
use eyre::eyre;
use std::time::Duration;

use crate::chunk_io::ChunkBounds;
use crate::scenario::{Scenario, ScenarioConfig};

/// A black-box conformance harness for TCP relays
#[derive(Parser)]
#[command(name = "relaycheck")]
#[command(about = "Black-box conformance harness for TCP relays")]
#[command(version)]
pub struct Cli {
    /// Host the relay is asked to bind on
    #[arg(long, default_value = "localhost")]
    pub bind_host: String,

    /// Base seed for the per-role chunk generators
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Smallest randomized chunk size in bytes
    #[arg(long, default_value = "1")]
    pub min_chunk: usize,

    /// Largest randomized chunk size in bytes
    #[arg(long, default_value = "8192")]
    pub max_chunk: usize,

    /// Deadline for every blocking network operation (seconds)
    #[arg(long, default_value = "10")]
    pub io_timeout_secs: u64,

    /// Grace period between shutdown escalation steps (ms)
    #[arg(long, default_value = "200")]
    pub grace_ms: u64,

    /// Run only the named scenarios (may be repeated)
    #[arg(long = "scenario")]
    pub scenarios: Vec<String>,

    /// Skip the iperf3 smoke test (when the benchmark is not installed)
    #[arg(long)]
    pub skip_iperf3: bool,

    /// Relay launch command; `<bind-host> 0 <target-host> <target-port>`
    /// is appended to it
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub proxy_command: Vec<String>,
}

/// Configuration for a conformance run
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared scenario parameters
    pub scenario: ScenarioConfig,
    /// Scenarios selected for this run, in execution order
    pub scenarios: Vec<Scenario>,
}

impl Config {
    /// Parse command line arguments into configuration
    pub fn from_cli(cli: Cli) -> crate::Result<Self> {
        let chunk_bounds = ChunkBounds::new(cli.min_chunk, cli.max_chunk)?;

        let mut scenario = ScenarioConfig::new(cli.proxy_command);
        scenario.bind_host = cli.bind_host;
        scenario.seed = cli.seed;
        scenario.chunk_bounds = chunk_bounds;
        scenario.io_timeout = Duration::from_secs(cli.io_timeout_secs);
        scenario.grace = Duration::from_millis(cli.grace_ms);

        let mut scenarios: Vec<Scenario> = if cli.scenarios.is_empty() {
            Scenario::ALL.to_vec()
        } else {
            cli.scenarios
                .iter()
                .map(|name| {
                    Scenario::from_name(name)
                        .ok_or_else(|| eyre!("unknown scenario '{name}'"))
                })
                .collect::<crate::Result<_>>()?
        };
        if cli.skip_iperf3 {
            scenarios.retain(|s| *s != Scenario::Iperf3);
        }

        Ok(Config {
            scenario,
            scenarios,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_every_scenario() {
        let cli = Cli::parse_from(["relaycheck", "proxy"]);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.scenarios, Scenario::ALL.to_vec());
        assert_eq!(config.scenario.proxy_command, vec!["proxy".to_string()]);
        assert_eq!(config.scenario.chunk_bounds.max, 8192);
    }

    #[test]
    fn scenario_filter_and_skip() {
        let cli = Cli::parse_from([
            "relaycheck",
            "--scenario",
            "echo",
            "--scenario",
            "iperf3",
            "--skip-iperf3",
            "proxy",
        ]);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.scenarios, vec![Scenario::Echo]);
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let cli = Cli::parse_from(["relaycheck", "--scenario", "bogus", "proxy"]);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn inverted_chunk_bounds_are_rejected() {
        let cli = Cli::parse_from(["relaycheck", "--min-chunk", "9000", "proxy"]);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn relay_command_keeps_leading_arguments() {
        let cli = Cli::parse_from(["relaycheck", "python3", "relay.py", "--verbose"]);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(
            config.scenario.proxy_command,
            vec![
                "python3".to_string(),
                "relay.py".to_string(),
                "--verbose".to_string()
            ]
        );
    }
}
