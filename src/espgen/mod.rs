//! EFI System Partition mount decisions.
//!
//! Runs as a systemd generator. Every check below can veto the mount; the
//! first veto wins and the result is "do nothing". Ambiguous evidence is
//! never resolved by guessing.

mod host;
mod units;

pub use host::{HostEnvironment, RootHost};
pub use units::{escape_path, UNIT_HEADER};

use anyhow::Result;
use std::fmt;

use crate::evidence::{Evidence, EvidenceSource, PartitionRecord};

/// Kernel parameter naming the real disk when booting a loop-mounted image.
pub const IMAGE_DEVICE_PARAM: &str = "endless.image.device";

/// ESP mount point when `/boot` is already provided by the root filesystem.
pub const EFI_TARGET: &str = "/efi";
/// ESP mount point when the boot configuration lives only on the ESP.
pub const BOOT_TARGET: &str = "/boot";

const ESP_FSTYPE: &str = "vfat";
const PRIVATE_UMASK: &str = "0077";
const PUBLIC_UMASK: &str = "0022";

/// A fully determined ESP mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EspMount {
    pub source: String,
    pub target: String,
    pub fstype: String,
    pub umask: String,
}

impl EspMount {
    /// Mount options for the unit.
    pub fn options(&self) -> String {
        format!("umask={},noauto,rw", self.umask)
    }
}

/// Why no mount was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoAction {
    NotUefi,
    InInitrd,
    FstabClaimsEfi,
    NoRootDisk,
    UnresolvedImageDevice(String),
    NoEsp { disk: String },
    MultipleEsps { disk: String },
    Xbootldr { device: String },
    MissingTarget { target: String },
    LoaderMismatch { loader: String, esp: String },
}

impl fmt::Display for NoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoAction::NotUefi => write!(f, "system was not booted with UEFI"),
            NoAction::InInitrd => write!(f, "running in the initrd"),
            NoAction::FstabClaimsEfi => write!(f, "{} is configured in fstab", EFI_TARGET),
            NoAction::NoRootDisk => write!(f, "could not determine the root disk"),
            NoAction::UnresolvedImageDevice(spec) => {
                write!(f, "{}={} does not match any device", IMAGE_DEVICE_PARAM, spec)
            }
            NoAction::NoEsp { disk } => write!(f, "no ESP found on {}", disk),
            NoAction::MultipleEsps { disk } => write!(f, "multiple ESPs found on {}", disk),
            NoAction::Xbootldr { device } => {
                write!(f, "XBOOTLDR partition {} is not supported", device)
            }
            NoAction::MissingTarget { target } => write!(f, "{} does not exist", target),
            NoAction::LoaderMismatch { loader, esp } => write!(
                f,
                "LoaderDevicePartUUID {} does not match ESP partition UUID {}",
                loader, esp
            ),
        }
    }
}

/// Result of a generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Mount(EspMount),
    NoAction(NoAction),
}

impl Outcome {
    pub fn into_mount(self) -> Option<EspMount> {
        match self {
            Outcome::Mount(mount) => Some(mount),
            Outcome::NoAction(_) => None,
        }
    }
}

macro_rules! veto {
    ($reason:expr) => {
        return Ok(Outcome::NoAction($reason))
    };
}

/// Gather evidence and decide. Only evidence collection failures are errors.
pub fn evaluate(host: &dyn HostEnvironment, source: &dyn EvidenceSource) -> Result<Outcome> {
    if let Err(reason) = check_environment(host) {
        veto!(reason);
    }
    let evidence = Evidence::collect(source)?;
    decide(host, &evidence)
}

/// [`evaluate`] collapsed to the mount, logging the reason for doing nothing.
pub fn get_esp_mount(
    host: &dyn HostEnvironment,
    source: &dyn EvidenceSource,
) -> Result<Option<EspMount>> {
    let outcome = evaluate(host, source)?;
    match &outcome {
        Outcome::Mount(mount) => log::info!(
            "Mounting ESP {} at {} with umask {}",
            mount.source,
            mount.target,
            mount.umask
        ),
        Outcome::NoAction(reason) => log::info!("Not mounting ESP: {}", reason),
    }
    Ok(outcome.into_mount())
}

/// Decide from an already collected snapshot.
pub fn decide(host: &dyn HostEnvironment, evidence: &Evidence) -> Result<Outcome> {
    if let Err(reason) = check_environment(host) {
        veto!(reason);
    }

    if fstab_claims_efi(evidence) {
        veto!(NoAction::FstabClaimsEfi);
    }

    let disk = match candidate_disk(evidence) {
        Ok(disk) => disk,
        Err(reason) => veto!(reason),
    };
    log::debug!("Candidate ESP disk: {}", disk.device);

    let esp = match find_esp(evidence, &disk.device) {
        Ok(esp) => esp,
        Err(reason) => veto!(reason),
    };

    if let Some(xbootldr) = find_xbootldr(evidence, &disk.device) {
        veto!(NoAction::Xbootldr {
            device: xbootldr.device.clone()
        });
    }

    let (target, umask) = if boot_already_mounted(evidence, esp) {
        (EFI_TARGET, PRIVATE_UMASK)
    } else {
        (BOOT_TARGET, PUBLIC_UMASK)
    };

    // /boot is assumed to always exist; only /efi is checked.
    if target == EFI_TARGET && !host.dir_exists(EFI_TARGET) {
        veto!(NoAction::MissingTarget {
            target: target.to_string()
        });
    }

    if let Err(reason) = check_loader_partition(host, esp)? {
        veto!(reason);
    }

    Ok(Outcome::Mount(EspMount {
        source: esp.device.clone(),
        target: target.to_string(),
        fstype: ESP_FSTYPE.to_string(),
        umask: umask.to_string(),
    }))
}

/// ESP units are only generated once, from the real root.
pub fn check_environment(host: &dyn HostEnvironment) -> Result<(), NoAction> {
    if !host.firmware_efi_present() {
        return Err(NoAction::NotUefi);
    }
    if host.in_initrd() {
        return Err(NoAction::InInitrd);
    }
    Ok(())
}

pub fn fstab_claims_efi(evidence: &Evidence) -> bool {
    evidence
        .fstab
        .iter()
        .any(|m| normalize_target(&m.target) == EFI_TARGET)
}

/// The disk the ESP should be taken from.
///
/// Normally the disk holding the root filesystem. When the kernel command
/// line names the real image device, the root sits on a loop device backed
/// by a file, and the ESP has to come from that real device's disk instead.
pub fn candidate_disk(evidence: &Evidence) -> Result<&PartitionRecord, NoAction> {
    if let Some(spec) = evidence.cmdline.get(IMAGE_DEVICE_PARAM) {
        let spec = spec.unwrap_or("");
        return resolve_device_spec(evidence, spec)
            .and_then(|record| evidence.top_disk(&record.device))
            .ok_or_else(|| NoAction::UnresolvedImageDevice(spec.to_string()));
    }

    ["/", "/sysroot", BOOT_TARGET]
        .iter()
        .filter_map(|target| {
            evidence
                .live_mounts
                .iter()
                .find(|m| normalize_target(&m.target) == *target)
        })
        .find_map(|m| evidence.top_disk(m.device()))
        .ok_or(NoAction::NoRootDisk)
}

/// Look up `/dev/...`, `UUID=...` or `PARTUUID=...`.
fn resolve_device_spec<'a>(evidence: &'a Evidence, spec: &str) -> Option<&'a PartitionRecord> {
    let matches = |value: &Option<String>, wanted: &str| {
        value
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case(wanted))
    };

    if let Some(uuid) = strip_prefix_ignore_case(spec, "UUID=") {
        evidence.partitions.iter().find(|p| matches(&p.fs_uuid, uuid))
    } else if let Some(uuid) = strip_prefix_ignore_case(spec, "PARTUUID=") {
        evidence.partitions.iter().find(|p| matches(&p.uuid, uuid))
    } else if spec.starts_with('/') {
        evidence.partition(spec)
    } else {
        None
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

pub fn find_esp<'a>(evidence: &'a Evidence, disk: &str) -> Result<&'a PartitionRecord, NoAction> {
    let esps: Vec<_> = on_disk(evidence, disk)
        .into_iter()
        .filter(|p| p.is_esp())
        .collect();
    match esps.as_slice() {
        [] => Err(NoAction::NoEsp {
            disk: disk.to_string(),
        }),
        [esp] => Ok(*esp),
        _ => Err(NoAction::MultipleEsps {
            disk: disk.to_string(),
        }),
    }
}

pub fn find_xbootldr<'a>(evidence: &'a Evidence, disk: &str) -> Option<&'a PartitionRecord> {
    on_disk(evidence, disk).into_iter().find(|p| p.is_xbootldr())
}

fn on_disk<'a>(evidence: &'a Evidence, disk: &str) -> Vec<&'a PartitionRecord> {
    evidence
        .partitions
        .iter()
        .filter(|p| p.disk.as_deref() == Some(disk))
        .collect()
}

/// Whether `/boot` was mounted before this generator had any say.
///
/// An automount point or the ESP itself on `/boot` are this generator's own
/// units from an earlier run and don't count.
pub fn boot_already_mounted(evidence: &Evidence, esp: &PartitionRecord) -> bool {
    evidence.live_mounts.iter().any(|m| {
        normalize_target(&m.target) == BOOT_TARGET
            && m.fstype != "autofs"
            && m.device() != esp.device
    })
}

/// Compare `LoaderDevicePartUUID` with the ESP on GPT disks.
///
/// The outer `Result` carries variable store I/O failures.
pub fn check_loader_partition(
    host: &dyn HostEnvironment,
    esp: &PartitionRecord,
) -> Result<Result<(), NoAction>> {
    if !esp.is_gpt() {
        return Ok(Ok(()));
    }
    let Some(loader) = host.loader_device_part_uuid()? else {
        return Ok(Ok(()));
    };
    let loader = loader.trim();
    let esp_uuid = esp.gpt_uuid().unwrap_or("");
    if loader.eq_ignore_ascii_case(esp_uuid) {
        Ok(Ok(()))
    } else {
        Ok(Err(NoAction::LoaderMismatch {
            loader: loader.to_string(),
            esp: esp_uuid.to_string(),
        }))
    }
}

fn normalize_target(target: &str) -> &str {
    match target.trim_end_matches('/') {
        "" => "/",
        t => t,
    }
}
