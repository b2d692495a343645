//! System evidence consumed by the ESP decision engine.
//!
//! Evidence is gathered fresh on every run and never persisted. The engine
//! only sees the parsed records; producing them (running `findmnt`, `lsblk`,
//! reading `/proc/cmdline`) is the job of an [`EvidenceSource`].

mod cmdline;
mod mounts;
mod partitions;
mod probe;

pub use cmdline::CmdlineParams;
pub use mounts::{parse_findmnt_json, strip_bind_subpath};
pub use partitions::parse_lsblk_json;
pub use probe::CommandProbe;

use anyhow::Result;

/// Where a mount record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOrigin {
    /// Live mount table
    Live,
    /// Static fstab
    Fstab,
}

/// One mount table or fstab line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fstype: String,
    pub options: String,
    pub origin: MountOrigin,
}

impl MountEntry {
    /// The source device with any `[/subpath]` bind suffix removed.
    pub fn device(&self) -> &str {
        strip_bind_subpath(&self.source)
    }
}

/// Partition table type of the owning disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskLabel {
    Gpt,
    /// MBR
    Dos,
    Other(String),
}

impl DiskLabel {
    pub fn from_pttype(pttype: &str) -> Self {
        match pttype.to_ascii_lowercase().as_str() {
            "gpt" => DiskLabel::Gpt,
            "dos" | "mbr" => DiskLabel::Dos,
            other => DiskLabel::Other(other.to_string()),
        }
    }
}

/// Block device kind as reported by lsblk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Disk,
    Part,
    Loop,
    Other(String),
}

impl BlockKind {
    pub fn from_lsblk(kind: &str) -> Self {
        match kind {
            "disk" => BlockKind::Disk,
            "part" => BlockKind::Part,
            "loop" => BlockKind::Loop,
            other => BlockKind::Other(other.to_string()),
        }
    }
}

/// Block device metadata. Despite the name, whole disks are recorded too so
/// that parent chains can be followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRecord {
    pub device: String,
    pub kind: BlockKind,
    /// Parent device path, if any
    pub disk: Option<String>,
    pub disk_label: Option<DiskLabel>,
    /// GPT partition UUID. Only meaningful on GPT disks.
    pub uuid: Option<String>,
    /// GPT type GUID or MBR type byte (`0xef`)
    pub part_type: Option<String>,
    /// Filesystem UUID
    pub fs_uuid: Option<String>,
    pub fstype: Option<String>,
}

/// GPT type GUID of an EFI System Partition.
pub const ESP_GPT_TYPE: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";
/// MBR type byte of an EFI System Partition.
pub const ESP_MBR_TYPE: &str = "0xef";
/// GPT type GUID of an Extended Boot Loader partition.
pub const XBOOTLDR_GPT_TYPE: &str = "bc13c2ff-59e6-4262-a352-b275fd6f7172";
/// MBR type byte of an Extended Boot Loader partition.
pub const XBOOTLDR_MBR_TYPE: &str = "0xea";

impl PartitionRecord {
    pub fn is_gpt(&self) -> bool {
        self.disk_label == Some(DiskLabel::Gpt)
    }

    pub fn is_esp(&self) -> bool {
        self.has_type(ESP_GPT_TYPE, ESP_MBR_TYPE)
    }

    pub fn is_xbootldr(&self) -> bool {
        self.has_type(XBOOTLDR_GPT_TYPE, XBOOTLDR_MBR_TYPE)
    }

    fn has_type(&self, gpt: &str, mbr: &str) -> bool {
        let Some(part_type) = self.part_type.as_deref() else {
            return false;
        };
        match self.disk_label {
            Some(DiskLabel::Gpt) => part_type.eq_ignore_ascii_case(gpt),
            Some(DiskLabel::Dos) => part_type.eq_ignore_ascii_case(mbr),
            _ => false,
        }
    }

    /// The partition UUID, trusted only on GPT disks.
    pub fn gpt_uuid(&self) -> Option<&str> {
        if self.is_gpt() {
            self.uuid.as_deref()
        } else {
            None
        }
    }
}

/// Supplies evidence. Implemented by the command probe and by test fixtures.
pub trait EvidenceSource {
    fn live_mounts(&self) -> Result<Vec<MountEntry>>;
    fn fstab(&self) -> Result<Vec<MountEntry>>;
    fn partitions(&self) -> Result<Vec<PartitionRecord>>;
    fn kernel_cmdline(&self) -> Result<CmdlineParams>;
}

/// A complete evidence snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub live_mounts: Vec<MountEntry>,
    pub fstab: Vec<MountEntry>,
    pub partitions: Vec<PartitionRecord>,
    pub cmdline: CmdlineParams,
}

impl Evidence {
    /// Load all four sources.
    pub fn collect(source: &dyn EvidenceSource) -> Result<Self> {
        let evidence = Self {
            live_mounts: source.live_mounts()?,
            fstab: source.fstab()?,
            partitions: source.partitions()?,
            cmdline: source.kernel_cmdline()?,
        };
        log::debug!("mounts: {:?}", evidence.live_mounts);
        log::debug!("fstab: {:?}", evidence.fstab);
        log::debug!("partitions: {:?}", evidence.partitions);
        log::debug!("kcmdline: {}", evidence.cmdline);
        Ok(evidence)
    }

    pub fn partition(&self, device: &str) -> Option<&PartitionRecord> {
        self.partitions.iter().find(|p| p.device == device)
    }

    /// Follow parent links from `device` up to the whole disk.
    pub fn top_disk(&self, device: &str) -> Option<&PartitionRecord> {
        let mut record = self.partition(device)?;
        // Bounded in case of a cyclic parent chain in bad input.
        for _ in 0..self.partitions.len() {
            match record.kind {
                BlockKind::Disk | BlockKind::Loop => return Some(record),
                _ => {}
            }
            record = self.partition(record.disk.as_deref()?)?;
        }
        None
    }
}

/// A snapshot also serves as its own source.
impl EvidenceSource for Evidence {
    fn live_mounts(&self) -> Result<Vec<MountEntry>> {
        Ok(self.live_mounts.clone())
    }

    fn fstab(&self) -> Result<Vec<MountEntry>> {
        Ok(self.fstab.clone())
    }

    fn partitions(&self) -> Result<Vec<PartitionRecord>> {
        Ok(self.partitions.clone())
    }

    fn kernel_cmdline(&self) -> Result<CmdlineParams> {
        Ok(self.cmdline.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(device: &str, kind: BlockKind, disk: Option<&str>) -> PartitionRecord {
        PartitionRecord {
            device: device.to_string(),
            kind,
            disk: disk.map(str::to_string),
            disk_label: Some(DiskLabel::Gpt),
            uuid: None,
            part_type: None,
            fs_uuid: None,
            fstype: None,
        }
    }

    #[test]
    fn test_top_disk_follows_parents() {
        let evidence = Evidence {
            partitions: vec![
                record("/dev/vda", BlockKind::Disk, None),
                record("/dev/vda3", BlockKind::Part, Some("/dev/vda")),
                record(
                    "/dev/mapper/root",
                    BlockKind::Other("crypt".into()),
                    Some("/dev/vda3"),
                ),
            ],
            ..Default::default()
        };
        assert_eq!(evidence.top_disk("/dev/mapper/root").unwrap().device, "/dev/vda");
        assert_eq!(evidence.top_disk("/dev/vda").unwrap().device, "/dev/vda");
        assert!(evidence.top_disk("/dev/sdz1").is_none());
    }

    #[test]
    fn test_top_disk_survives_cycles() {
        let evidence = Evidence {
            partitions: vec![
                record("/dev/a", BlockKind::Part, Some("/dev/b")),
                record("/dev/b", BlockKind::Part, Some("/dev/a")),
            ],
            ..Default::default()
        };
        assert!(evidence.top_disk("/dev/a").is_none());
    }

    #[test]
    fn test_partition_types() {
        let mut esp = record("/dev/vda1", BlockKind::Part, Some("/dev/vda"));
        esp.part_type = Some(ESP_GPT_TYPE.to_uppercase());
        assert!(esp.is_esp());
        assert!(!esp.is_xbootldr());

        esp.disk_label = Some(DiskLabel::Dos);
        assert!(!esp.is_esp());
        esp.part_type = Some("0xef".into());
        assert!(esp.is_esp());
        esp.uuid = Some("c0ffee00-01".into());
        assert!(esp.gpt_uuid().is_none());
    }
}
