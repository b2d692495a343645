//! Point EFI Boot#### load options at a new ESP partition UUID.
//!
//! Used after the ESP has been recreated (and got a new partition UUID) so
//! existing boot entries keep working.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;

use bootesp::config::Config;
use bootesp::efivar::{parse_guid, EfiVarStore};
use bootesp::loadopt::{patch_load_options, PatchOptions};

#[derive(Parser)]
#[command(name = "update-efi-uuid")]
#[command(about = "Update the partition UUID in EFI boot load options")]
struct Cli {
    /// Dump matching load options and show debugging messages
    #[arg(short, long)]
    verbose: bool,

    /// Only show what would be changed
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Current ESP partition UUID
    current_uuid: String,

    /// New ESP partition UUID
    new_uuid: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();

    let Some(current) = parse_guid(&cli.current_uuid) else {
        bail!("Invalid current UUID: {}", cli.current_uuid);
    };
    let Some(new) = parse_guid(&cli.new_uuid) else {
        bail!("Invalid new UUID: {}", cli.new_uuid);
    };

    let config = Config::load();
    let store = EfiVarStore::new(config.efivarfs);
    let opts = PatchOptions {
        current,
        new,
        dry_run: cli.dry_run,
    };

    let report = patch_load_options(&store, &opts)
        .with_context(|| format!("Cannot update load options in {}", store.dir().display()))?;

    for option in &report.matched {
        if cli.verbose {
            println!("{}", option.dump_before());
        }
        println!("Updating {} HD UUID from {} to {}", option.label, current, new);
        if cli.verbose {
            println!("{}", option.dump_after());
        }
    }

    if report.matched.is_empty() {
        println!("No load options reference partition {}", current);
    } else if cli.dry_run {
        println!(
            "Dry run: {} of {} load option(s) would be updated",
            report.matched.len(),
            report.scanned
        );
    } else {
        println!(
            "Updated {} of {} load option(s)",
            report.written.len(),
            report.scanned
        );
    }
    for (name, reason) in &report.failed {
        eprintln!("Failed to update {}: {}", name, reason);
    }

    if !report.success() {
        bail!("{} load option(s) could not be updated", report.failed.len());
    }
    Ok(())
}
