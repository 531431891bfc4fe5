//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Slipstream command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "slipstream", about = "Slipstream race server")]
pub struct CliArgs {
    /// Server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Simulation/broadcast tick rate in Hz.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Ticks between unconditional full snapshots.
    #[arg(long)]
    pub full_snapshot_interval: Option<u32>,

    /// Spatial grid cell size in world units.
    #[arg(long)]
    pub cell_size: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(rate) = args.tick_rate {
            self.network.tick_rate = rate;
        }
        if let Some(interval) = args.full_snapshot_interval {
            self.sync.full_snapshot_interval = interval;
        }
        if let Some(size) = args.cell_size {
            self.spatial.cell_size = size;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
