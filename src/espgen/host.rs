//! Host facts the decision engine needs besides the evidence records.

use anyhow::Result;

use crate::config::Config;
use crate::efivar::{EfiVarStore, LOADER_DEVICE_PART_UUID_EFIVAR};

/// Environment queries, injected so decisions can be replayed in tests.
pub trait HostEnvironment {
    /// Whether the system was booted through UEFI.
    fn firmware_efi_present(&self) -> bool;

    fn in_initrd(&self) -> bool;

    /// Whether an absolute directory exists on the live root.
    fn dir_exists(&self, path: &str) -> bool;

    /// The `LoaderDevicePartUUID` variable, if the boot loader set one.
    fn loader_device_part_uuid(&self) -> Result<Option<String>>;
}

/// The real (or mock) root described by [`Config`].
pub struct RootHost {
    config: Config,
    efivars: EfiVarStore,
}

impl RootHost {
    pub fn new(config: Config) -> Self {
        let efivars = EfiVarStore::new(config.efivarfs.clone());
        Self { config, efivars }
    }
}

impl HostEnvironment for RootHost {
    fn firmware_efi_present(&self) -> bool {
        self.config.firmware_efi_dir().is_dir()
    }

    fn in_initrd(&self) -> bool {
        self.config.in_initrd
    }

    fn dir_exists(&self, path: &str) -> bool {
        self.config.rooted(path).is_dir()
    }

    fn loader_device_part_uuid(&self) -> Result<Option<String>> {
        Ok(self
            .efivars
            .read_efivar_utf16_string(LOADER_DEVICE_PART_UUID_EFIVAR)?)
    }
}
