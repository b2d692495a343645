//! Shared test utilities for the bootesp integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use uuid::Uuid;

use bootesp::config::Config;
use bootesp::efivar::{
    encode_utf16_value, guid_to_bytes, EfiVarStore, LOADER_DEVICE_PART_UUID_EFIVAR,
};
use bootesp::espgen::RootHost;
use bootesp::evidence::{
    parse_findmnt_json, parse_lsblk_json, CmdlineParams, EvidenceSource, MountEntry, MountOrigin,
    PartitionRecord,
};

/// efivarfs attributes: non-volatile, boot service and runtime access.
pub const NV_BS_RT: u32 = 0x0000_0007;

/// Mock system root with a firmware variable store.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock root directory
    pub root: PathBuf,
    /// `<root>/sys/firmware/efi/efivars`
    pub efivars: PathBuf,
}

impl TestEnv {
    /// A UEFI-booted root with `/efi` and `/boot` present.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let efivars = root.join("sys/firmware/efi/efivars");

        for dir in ["efi", "boot", "proc"] {
            fs::create_dir_all(root.join(dir)).expect("Failed to create mock root dir");
        }
        fs::create_dir_all(&efivars).expect("Failed to create efivars dir");

        Self {
            _temp_dir: temp_dir,
            root,
            efivars,
        }
    }

    pub fn config(&self) -> Config {
        Config::for_root(&self.root)
    }

    pub fn host(&self) -> RootHost {
        RootHost::new(self.config())
    }

    pub fn store(&self) -> EfiVarStore {
        EfiVarStore::new(&self.efivars)
    }

    /// Write a variable file with the attribute mask prepended.
    pub fn set_efivar(&self, name: &str, value: &[u8]) {
        let mut raw = NV_BS_RT.to_ne_bytes().to_vec();
        raw.extend_from_slice(value);
        self.set_efivar_raw(name, &raw);
    }

    /// Write a variable file verbatim.
    pub fn set_efivar_raw(&self, name: &str, raw: &[u8]) {
        fs::write(self.efivars.join(name), raw).expect("Failed to write efivar");
    }

    pub fn efivar_raw(&self, name: &str) -> Vec<u8> {
        fs::read(self.efivars.join(name)).expect("Failed to read efivar")
    }

    /// Contents of every file in the variable store, by file name.
    pub fn efivars_snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        fs::read_dir(&self.efivars)
            .expect("Failed to list efivars")
            .map(|entry| {
                let entry = entry.expect("Failed to read efivars entry");
                let name = entry.file_name().to_string_lossy().into_owned();
                let data = fs::read(entry.path()).expect("Failed to read efivar");
                (name, data)
            })
            .collect()
    }

    /// Store a UTF-16 string the way systemd-boot does, with three trailing
    /// NUL bytes.
    pub fn set_efivar_utf16(&self, name: &str, text: &str) {
        let mut value = encode_utf16_value(text);
        value.extend_from_slice(&[0, 0, 0]);
        self.set_efivar(name, &value);
    }

    pub fn set_loader_device_part_uuid(&self, uuid: &str) {
        self.set_efivar_utf16(LOADER_DEVICE_PART_UUID_EFIVAR, uuid);
    }

    pub fn remove(&self, path: &str) {
        let path = self.root.join(path.trim_start_matches('/'));
        fs::remove_dir_all(&path).expect("Failed to remove mock root dir");
    }
}

/// Evidence recorded from a real system under `tests/data/<system>`.
pub struct FixtureSource {
    dir: PathBuf,
    reload: bool,
}

impl FixtureSource {
    /// Evidence from the first generator run of a boot.
    pub fn init(system: &str) -> Self {
        Self {
            dir: data_dir().join(system),
            reload: false,
        }
    }

    /// Evidence from a daemon-reload after the ESP units were started.
    pub fn reload(system: &str) -> Self {
        Self {
            reload: true,
            ..Self::init(system)
        }
    }

    fn read(&self, file: &str) -> Result<String> {
        let path = self.dir.join(file);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

impl EvidenceSource for FixtureSource {
    fn live_mounts(&self) -> Result<Vec<MountEntry>> {
        let file = if self.reload {
            "findmnt-reload.json"
        } else {
            "findmnt.json"
        };
        parse_findmnt_json(&self.read(file)?, MountOrigin::Live)
    }

    fn fstab(&self) -> Result<Vec<MountEntry>> {
        parse_findmnt_json(&self.read("fstab.json")?, MountOrigin::Fstab)
    }

    fn partitions(&self) -> Result<Vec<PartitionRecord>> {
        parse_lsblk_json(&self.read("lsblk.json")?)
    }

    fn kernel_cmdline(&self) -> Result<CmdlineParams> {
        Ok(CmdlineParams::parse(&self.read("cmdline")?))
    }
}

pub fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

// =============================================================================
// Load option builders
// =============================================================================

/// GPT Hard Drive media node.
pub fn hard_drive_node(partition: u32, start: u64, size: u64, signature: &Uuid) -> Vec<u8> {
    let mut node = vec![0x04, 0x01];
    node.extend_from_slice(&42u16.to_ne_bytes());
    node.extend_from_slice(&partition.to_ne_bytes());
    node.extend_from_slice(&start.to_ne_bytes());
    node.extend_from_slice(&size.to_ne_bytes());
    node.extend_from_slice(&guid_to_bytes(signature));
    node.push(0x02); // GPT
    node.push(0x02); // GUID signature
    node
}

/// File path media node.
pub fn file_path_node(path: &str) -> Vec<u8> {
    let mut text = encode_utf16_value(path);
    text.extend_from_slice(&[0, 0]);
    let mut node = vec![0x04, 0x04];
    node.extend_from_slice(&((4 + text.len()) as u16).to_ne_bytes());
    node.extend(text);
    node
}

pub fn end_node() -> Vec<u8> {
    vec![0x7f, 0xff, 0x04, 0x00]
}

/// A load option value (no attribute mask).
pub fn load_option(attributes: u32, description: &str, path: &[u8], optional: &[u8]) -> Vec<u8> {
    let mut value = attributes.to_ne_bytes().to_vec();
    value.extend_from_slice(&(path.len() as u16).to_ne_bytes());
    value.extend(encode_utf16_value(description));
    value.extend_from_slice(&[0, 0]);
    value.extend_from_slice(path);
    value.extend_from_slice(optional);
    value
}

/// The usual boot entry: HD node, loader file path, end.
pub fn disk_load_option(description: &str, partition: &Uuid, loader: &str) -> Vec<u8> {
    let mut path = hard_drive_node(1, 2048, 1_048_576, partition);
    path.extend(file_path_node(loader));
    path.extend(end_node());
    load_option(1, description, &path, &[])
}

/// Assert that a file has exactly the expected content.
pub fn assert_file_eq(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert_eq!(content, expected, "Unexpected content in {}", path.display());
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}
