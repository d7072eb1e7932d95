//! This module implements the CLI interface.
//!
//! The binary runs a host's enumeration sequence against the standard
//! request handler through an in-memory controller. The options describe
//! the simulated device and what the host asks of it.

use clap::Parser;

use crate::loopback::LoopbackOptions;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
pub struct Cli {
    /// Enable verbose logging. Can be specified multiple times to
    /// increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The maximum packet size of endpoint zero. Full-speed devices
    /// support 8, 16, 32 or 64 bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 64, value_parser = parse_max_packet_size)]
    max_packet_size: u16,

    /// The address the host assigns with SET_ADDRESS.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=127))]
    address: u8,

    /// The configuration value the host selects with SET_CONFIGURATION.
    #[arg(long, default_value_t = 1)]
    configuration: u8,

    /// Let the device refuse every configuration. The enumeration then
    /// fails at SET_CONFIGURATION.
    #[arg(long)]
    reject_configuration: bool,
}

impl Cli {
    pub const fn loopback_options(&self) -> LoopbackOptions {
        LoopbackOptions {
            max_packet_size: self.max_packet_size,
            address: self.address,
            configuration: self.configuration,
            reject_configuration: self.reject_configuration,
        }
    }
}

fn parse_max_packet_size(value: &str) -> Result<u16, String> {
    let size: u16 = value
        .parse()
        .map_err(|e| format!("`{value}` is not a packet size: {e}"))?;

    match size {
        8 | 16 | 32 | 64 => Ok(size),
        _ => Err(format!("{size} is not one of 8, 16, 32 or 64")),
    }
}
