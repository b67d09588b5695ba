//! Albor PUCCH Allocation Simulator
//!
//! Drives the cell PUCCH allocator slot by slot with synthetic DL/UL traffic
//! and reports how HARQ-ACK and SR resources were granted.

mod config;
mod driver;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use config::SimConfig;
use driver::SlotDriver;

/// Albor PUCCH allocation simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML, or TOML with a .toml extension)
    #[arg(short, long, default_value = "pucch_sim.yml")]
    config: String,

    /// Log level (trace, debug, info, warn, error), overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of slots to simulate, 0 runs until interrupted
    #[arg(long, default_value = "20000")]
    nof_slots: u64,

    /// Pace slots at the slot duration of the numerology
    #[arg(long)]
    realtime: bool,

    /// Seed of the traffic generator
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let sim_config = SimConfig::from_file(&args.config)?;

    // Initialize logging
    let log_level = args.log_level.clone().unwrap_or_else(|| sim_config.log.all_level.clone());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Albor PUCCH allocation simulator");
    info!("Configuration file: {}", args.config);

    let cell_cfg = Arc::new(sim_config.cell_configuration()?);
    let ues = sim_config.ue_configurations(&cell_cfg)?;
    let pusch_region = sim_config.pucch.pusch_region(&cell_cfg.ul_bwp);

    info!("Cell configuration:");
    info!("  PCI: {}", cell_cfg.pci.0);
    info!("  Cell ID: {}", cell_cfg.cell_id.0);
    info!("  Subcarrier spacing: {} kHz", cell_cfg.scs.to_khz());
    info!("  UL BWP: {} PRBs", cell_cfg.ul_bwp_size());
    info!("  PUCCH resource common: {}", cell_cfg.pucch_resource_common);
    info!("  UEs: {}", ues.len());

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut driver = SlotDriver::new(cell_cfg, ues, sim_config.sim.clone(), pusch_region, rng)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        res = driver.run(args.nof_slots, args.realtime) => {
            if let Err(e) = &res {
                error!("Slot processing stopped: {}", e);
            }
            res?;
        }
    }

    driver.log_stats();
    info!("Simulation complete");
    Ok(())
}
