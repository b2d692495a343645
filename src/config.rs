//! Configuration management for the ESP tooling.
//!
//! Reads configuration from environment variables. Everything that would
//! otherwise be an ambient global (root path, initrd flag, efivarfs location)
//! is captured here once so the decision code can be driven from tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Overrides the root that `/sys`, `/proc`, `/efi` and `/boot` resolve against.
pub const ROOT_PATH_VAR: &str = "ESPGEN_ROOT_PATH";
/// Set by systemd when generators run inside the initrd.
pub const IN_INITRD_VAR: &str = "SYSTEMD_IN_INITRD";
/// Location of the firmware variable store, same name libefivar honours.
pub const EFIVARFS_PATH_VAR: &str = "EFIVARFS_PATH";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the inspected system (default: /)
    pub root: PathBuf,
    /// Whether the generator is running in the initrd
    pub in_initrd: bool,
    /// Directory holding `<Name>-<GUID>` variable files
    pub efivarfs: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env_vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let root = env_vars
            .get(ROOT_PATH_VAR)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));

        let in_initrd = env_vars
            .get(IN_INITRD_VAR)
            .map(|v| parse_bool(v))
            .unwrap_or(false);

        let efivarfs = env_vars
            .get(EFIVARFS_PATH_VAR)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_efivarfs(&root));

        Self {
            root,
            in_initrd,
            efivarfs,
        }
    }

    /// Configuration for an explicit root, outside the initrd.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let efivarfs = default_efivarfs(&root);
        Self {
            root,
            in_initrd: false,
            efivarfs,
        }
    }

    /// Resolve an absolute system path against the configured root.
    pub fn rooted(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.root
            .join(path.strip_prefix("/").unwrap_or(path))
    }

    /// The firmware interface directory; present only on UEFI boots.
    pub fn firmware_efi_dir(&self) -> PathBuf {
        self.rooted("/sys/firmware/efi")
    }

    /// Path of the kernel command line file.
    pub fn cmdline_path(&self) -> PathBuf {
        self.rooted("/proc/cmdline")
    }
}

fn default_efivarfs(root: &Path) -> PathBuf {
    root.join("sys/firmware/efi/efivars")
}

/// systemd's boolean spelling rules, minus the error case.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "yes" | "y" | "true" | "t" | "on"
    )
}
