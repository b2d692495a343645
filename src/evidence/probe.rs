//! Evidence gathered from the running system with util-linux tools.

use anyhow::{Context, Result};
use std::fs;

use super::{
    parse_findmnt_json, parse_lsblk_json, CmdlineParams, EvidenceSource, MountEntry, MountOrigin,
    PartitionRecord,
};
use crate::config::Config;
use crate::process::Cmd;

const FINDMNT_COLUMNS: &str = "SOURCE,TARGET,FSTYPE,OPTIONS";
const LSBLK_COLUMNS: &str = "PATH,PKNAME,PTTYPE,PARTUUID,PARTTYPE,UUID,FSTYPE,TYPE";

/// Runs `findmnt` and `lsblk` and reads the kernel command line below the
/// configured root.
pub struct CommandProbe {
    config: Config,
}

impl CommandProbe {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl EvidenceSource for CommandProbe {
    fn live_mounts(&self) -> Result<Vec<MountEntry>> {
        let result = Cmd::new("findmnt")
            .args(["--json", "--list", "--output", FINDMNT_COLUMNS])
            .context("findmnt failed to list mounts")
            .run()?;
        parse_findmnt_json(&result.stdout, MountOrigin::Live)
    }

    fn fstab(&self) -> Result<Vec<MountEntry>> {
        // findmnt exits 1 without output when fstab has no entries.
        let result = Cmd::new("findmnt")
            .args(["--fstab", "--json", "--list", "--output", FINDMNT_COLUMNS])
            .tolerate_exit(1)
            .context("findmnt failed to list fstab")
            .run()?;
        if !result.success() && !result.stderr_trimmed().is_empty() {
            anyhow::bail!(
                "findmnt failed to list fstab (exit code {}):\n{}",
                result.code(),
                result.stderr_trimmed()
            );
        }
        if result.is_empty() {
            return Ok(Vec::new());
        }
        parse_findmnt_json(&result.stdout, MountOrigin::Fstab)
    }

    fn partitions(&self) -> Result<Vec<PartitionRecord>> {
        let result = Cmd::new("lsblk")
            .args(["--json", "--list", "--paths", "--output", LSBLK_COLUMNS])
            .context("lsblk failed to list block devices")
            .run()?;
        parse_lsblk_json(&result.stdout)
    }

    fn kernel_cmdline(&self) -> Result<CmdlineParams> {
        let path = self.config.cmdline_path();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(CmdlineParams::parse(&text))
    }
}
