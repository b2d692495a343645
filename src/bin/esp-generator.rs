//! systemd generator that mounts the EFI System Partition on demand.
//!
//! Invoked by systemd as `esp-generator NORMAL_DIR EARLY_DIR LATE_DIR`.
//! Units are only written into NORMAL_DIR.

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use bootesp::config::Config;
use bootesp::espgen::{get_esp_mount, RootHost};
use bootesp::evidence::CommandProbe;
use bootesp::kmsg::KmsgLogger;

const TAG: &str = "esp-generator";

#[derive(Parser)]
#[command(name = "esp-generator")]
#[command(about = "Generate mount units for the EFI System Partition")]
struct Cli {
    /// Generator output directory for normal-priority units
    normal_dir: Option<PathBuf>,
    /// Early-priority output directory (unused)
    early_dir: Option<PathBuf>,
    /// Late-priority output directory (unused)
    late_dir: Option<PathBuf>,
}

fn init_logging() {
    match KmsgLogger::open(TAG, LevelFilter::Info) {
        Ok(logger) => {
            if logger.init().is_ok() {
                return;
            }
        }
        Err(e) => eprintln!("{}: cannot open kernel log: {}", TAG, e),
    }
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load();
    let probe = CommandProbe::new(config.clone());
    let host = RootHost::new(config);

    let mount = match get_esp_mount(&host, &probe) {
        Ok(mount) => mount,
        Err(e) => {
            log::error!("{:#}", e);
            return Err(e);
        }
    };

    if let (Some(mount), Some(dir)) = (mount, cli.normal_dir.as_deref()) {
        mount
            .write_units(dir)
            .with_context(|| format!("Failed to write units into {}", dir.display()))?;
    }

    Ok(())
}
