//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Service UUID (full UUID or 16-bit hex alias)
    #[arg(short, long, global = true)]
    pub service: Option<String>,

    /// Characteristic UUID (full UUID or 16-bit hex alias)
    #[arg(short = 'k', long, global = true)]
    pub characteristic: Option<String>,

    /// Index of the BLE adapter to use
    #[arg(long, global = true)]
    pub adapter: Option<usize>,

    /// Scan window in milliseconds
    #[arg(long, global = true)]
    pub scan_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan for peripherals and list them
    Scan {
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to a device and exchange text lines interactively
    Chat {
        /// Device index from the scan list, advertised name, or address
        device: String,
    },
    /// Connect, send a single message and disconnect
    Send {
        /// Device index from the scan list, advertised name, or address
        device: String,
        /// Message content
        message: String,
        /// Treat the message as hex-encoded bytes
        #[arg(long)]
        hex: bool,
    },
    /// Print an example configuration file
    PrintConfig,
}

impl Cli {
    /// Configuration values given on the command line
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            service_uuid: self.service.clone(),
            characteristic_uuid: self.characteristic.clone(),
            adapter_index: self.adapter,
            scan_timeout_ms: self.scan_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_overrides() {
        let cli = Cli::parse_from([
            "blelink", "send", "--hex", "-s", "1234", "-k", "5678", "deviceA", "6869",
        ]);
        match &cli.command {
            Commands::Send {
                device,
                message,
                hex,
            } => {
                assert_eq!(device, "deviceA");
                assert_eq!(message, "6869");
                assert!(*hex);
            }
            other => panic!("Expected send command, got {:?}", other),
        }

        let overrides = cli.overrides();
        assert_eq!(overrides.service_uuid.as_deref(), Some("1234"));
        assert_eq!(overrides.characteristic_uuid.as_deref(), Some("5678"));
        assert!(overrides.adapter_index.is_none());
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from(["blelink", "-v", "scan", "--json"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Scan { json: true }));
    }
}
