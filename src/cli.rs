//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

/// Virtual energy plant that publishes live telemetry to a state store and
/// takes control commands back from an energy management system.
#[derive(Debug, Parser)]
#[command(name = "plant-sim", version)]
pub struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "PLANT_SIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `simulation.random_seed`.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Applies and starts this scenario on boot.
    #[arg(long, value_name = "ID", conflicts_with = "suite")]
    pub scenario: Option<String>,

    /// Starts the scenario suite on boot.
    #[arg(long)]
    pub suite: bool,

    /// Runs this many ticks on a synthetic clock and exits.
    #[arg(long, value_name = "N")]
    pub ticks: Option<usize>,

    /// Synthetic tick spacing for `--ticks`; defaults to the configured interval.
    #[arg(long, value_name = "MS", requires = "ticks")]
    pub tick_ms: Option<u64>,

    /// Writes per-tick results of a `--ticks` run as CSV.
    #[arg(long, value_name = "PATH", requires = "ticks")]
    pub telemetry_out: Option<PathBuf>,

    /// JSON file the state store is loaded from and persisted to.
    #[arg(long, value_name = "PATH", env = "PLANT_SIM_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Prints the scenario catalog and exits.
    #[arg(long)]
    pub list_scenarios: bool,

    /// Serves the HTTP API on this address while running.
    #[cfg(feature = "api")]
    #[arg(long, value_name = "ADDR")]
    pub api_bind: Option<std::net::SocketAddr>,
}
