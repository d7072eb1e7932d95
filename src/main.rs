mod cli;
mod loopback;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    let enumeration = loopback::run(&args.loopback_options()).context("Enumeration failed")?;

    info!(
        "Enumerated device at address {} with configuration {}",
        enumeration.address, enumeration.configuration
    );
    info!(
        "Device descriptor: {:02x?}",
        enumeration.device_descriptor
    );
    info!(
        "Configuration descriptor: {} bytes",
        enumeration.configuration_descriptor.len()
    );
    info!(
        "Languages {:04x?}, strings {:?}",
        enumeration.language_ids, enumeration.strings
    );
    info!(
        "Status {:#06x}, {} transfers completed",
        enumeration.status, enumeration.completions
    );

    Ok(())
}
