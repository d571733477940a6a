//! SERP Harvester - batch driver
//!
//! Reads a JSON config (path from the first argument, default
//! `serp-harvester.json`), runs every worker to completion and prints the
//! collected run report as JSON on stdout.
//!
//! Environment variables:
//! - `SERP_PROXY_USERNAME` - proxy credential base (overrides config file)
//! - `SERP_PROXY_PASSWORD` - proxy password (overrides config file)
//! - `RUST_LOG` - log filter (default: info)

use tracing::info;

use serp_harvester::HarvestConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = serp_harvester::init_logging();

    info!("Starting SERP Harvester");
    if let Some(dir) = serp_harvester::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "serp-harvester.json".to_string());
    let config = HarvestConfig::load(&config_path);
    config.validate()?;

    if !config.proxy.is_configured() {
        info!("No proxy credentials configured; workers will connect directly");
    }

    let report = serp_harvester::run(config).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
