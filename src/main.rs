//! plant-sim entry point: CLI wiring, store setup and the run loops.

use std::process;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plant_sim::cli::Cli;
use plant_sim::config::SimulatorConfig;
use plant_sim::io::export::export_csv;
use plant_sim::runtime::{local_now, run, run_headless};
use plant_sim::scenario::ScenarioRegistry;
use plant_sim::simulator::Simulator;
use plant_sim::store::{MemoryStore, SharedStore};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> SimulatorConfig {
    let mut config = match &cli.config {
        Some(path) => match SimulatorConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => SimulatorConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.simulation.random_seed = seed;
    }
    config.normalized()
}

fn open_store(cli: &Cli) -> SharedStore {
    let store = match &cli.state_file {
        Some(path) => match MemoryStore::open(path) {
            Ok(store) => store,
            Err(e) => {
                eprintln!("error: cannot open state file \"{}\": {e}", path.display());
                process::exit(1);
            }
        },
        None => MemoryStore::new(),
    };
    SharedStore::new(store)
}

fn print_catalog(config: &SimulatorConfig) {
    for info in ScenarioRegistry::standard().catalog(&config.scenario) {
        println!(
            "{:<26} {:<9} {:>6}s  {}",
            info.id,
            format!("{:?}", info.kind).to_lowercase(),
            info.duration_s,
            info.title
        );
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = load_config(&cli);
    if cli.list_scenarios {
        print_catalog(&config);
        return;
    }

    let store = open_store(&cli);
    let mut sim = Simulator::new(&config, store.clone());
    let boot = local_now();
    if let Err(e) = sim.initialize(boot) {
        eprintln!("error: initialization failed: {e}");
        process::exit(1);
    }

    if let Some(id) = &cli.scenario {
        if let Err(e) = sim.apply_scenario(id, true, boot) {
            eprintln!("error: {e}");
            process::exit(1);
        }
    } else if cli.suite {
        sim.start_suite(boot);
    }

    if let Some(ticks) = cli.ticks {
        let step_ms = cli.tick_ms.unwrap_or(config.simulation.update_interval_ms);
        info!(ticks, step_ms, "headless run");
        let results = run_headless(&mut sim, boot, ticks, step_ms);
        for r in &results {
            println!("{r}");
        }
        if let Some(path) = &cli.telemetry_out {
            if let Err(e) = export_csv(&results, path) {
                eprintln!("error: failed to write CSV: {e}");
                process::exit(1);
            }
            eprintln!("Telemetry written to {}", path.display());
        }
        return;
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        }
    };

    rt.block_on(async {
        #[cfg(feature = "api")]
        if let Some(addr) = cli.api_bind {
            let state = std::sync::Arc::new(plant_sim::api::AppState {
                store: store.clone(),
                catalog: sim.scenarios().registry().catalog(&config.scenario),
            });
            tokio::spawn(async move {
                if let Err(e) = plant_sim::api::serve(state, addr).await {
                    tracing::error!(%addr, error = %e, "API server failed");
                }
            });
        }

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        let ticks = run(&mut sim, store.command_signal(), shutdown).await;
        info!(ticks, "stopped");
    });
}
