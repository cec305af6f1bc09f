//! spim-resolver - resolve a volumetric imaging dataset and print it as JSON.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spim_resolver::{
    config::Config,
    io::{IoRouter, Location, S3Transport},
    open::SpimDataOpener,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let location = match Location::parse(&config.location) {
        Ok(location) => location,
        Err(e) => {
            error!("Invalid location: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Location: {}", location);
    info!("  Format: {}", config.format);
    info!("  S3 region: {}", config.s3_region);
    if config.s3_anonymous {
        info!("  S3 credentials: anonymous");
    }
    if config.shared_pool {
        info!(
            "  Shared pool: {} workers, {}MB cache",
            config.pool_workers,
            config.pool_cache_bytes / (1024 * 1024)
        );
    }

    let remote = S3Transport::new(config.s3_region.clone()).with_anonymous(config.s3_anonymous);
    let transport = Arc::new(IoRouter::new(remote));
    let opener = SpimDataOpener::new(transport).with_default_region(config.s3_region.clone());

    let dataset = match opener
        .open(&location, config.format, config.build_pool())
        .await
    {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("{}: {}", location, e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Opened {} setup(s) over {} timepoint(s)",
        dataset.sequence().setups().len(),
        dataset.sequence().timepoints().len()
    );

    match serde_json::to_string_pretty(&dataset) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize dataset: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "spim_resolver=debug"
    } else {
        "spim_resolver=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
