use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relaycheck::cli::{Cli, Config};
use relaycheck::error::HarnessError;
use relaycheck::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    info!(
        "relaycheck starting, relay command: {:?}",
        config.scenario.proxy_command
    );

    let mut failed = Vec::new();
    for scenario in &config.scenarios {
        info!("running scenario {}", scenario.name());
        match scenario.run(&config.scenario).await {
            Ok(()) => info!("scenario {} passed", scenario.name()),
            Err(report) => {
                // A child that survived SIGKILL means the harness can no
                // longer clean up after itself; abort the whole run rather
                // than fold it into the pass/fail tally.
                if let Some(HarnessError::ProcessSurvivedKill { .. }) =
                    report.downcast_ref::<HarnessError>()
                {
                    error!("scenario {}: harness fault: {report:#}", scenario.name());
                    return Err(report);
                }
                error!("scenario {} failed: {report:#}", scenario.name());
                failed.push(scenario.name());
            }
        }
    }

    if !failed.is_empty() {
        eyre::bail!(
            "{}/{} scenarios failed: {}",
            failed.len(),
            config.scenarios.len(),
            failed.join(", ")
        );
    }

    info!("all {} scenarios passed", config.scenarios.len());
    Ok(())
}
