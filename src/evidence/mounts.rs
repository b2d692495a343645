//! findmnt JSON output.
//!
//! Expected from `findmnt --json --list --output SOURCE,TARGET,FSTYPE,OPTIONS`
//! with or without `--fstab`.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{MountEntry, MountOrigin};

#[derive(Debug, Deserialize)]
struct FindmntOutput {
    #[serde(default)]
    filesystems: Vec<FindmntEntry>,
}

#[derive(Debug, Deserialize)]
struct FindmntEntry {
    source: Option<String>,
    target: Option<String>,
    fstype: Option<String>,
    options: Option<String>,
}

/// Parse findmnt output. Empty output means no entries.
pub fn parse_findmnt_json(json: &str, origin: MountOrigin) -> Result<Vec<MountEntry>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    let output: FindmntOutput =
        serde_json::from_str(json).context("Failed to parse findmnt JSON output")?;

    Ok(output
        .filesystems
        .into_iter()
        .filter_map(|e| {
            Some(MountEntry {
                source: e.source.unwrap_or_default(),
                target: e.target?,
                fstype: e.fstype.unwrap_or_default(),
                options: e.options.unwrap_or_default(),
                origin,
            })
        })
        .collect())
}

/// `/dev/vda3[/ostree/deploy/...]` -> `/dev/vda3`
pub fn strip_bind_subpath(source: &str) -> &str {
    match source.find('[') {
        Some(idx) if source.ends_with(']') => &source[..idx],
        _ => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_live() {
        let json = r#"{
           "filesystems": [
              {"source":"/dev/vda3[/ostree/deploy/eos/deploy/a1b2.0]", "target":"/", "fstype":"ext4", "options":"rw,relatime"},
              {"source":"systemd-1", "target":"/efi", "fstype":"autofs", "options":"rw,relatime,fd=49"}
           ]
        }"#;
        let mounts = parse_findmnt_json(json, MountOrigin::Live).unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].target, "/");
        assert_eq!(mounts[0].device(), "/dev/vda3");
        assert_eq!(mounts[1].fstype, "autofs");
        assert_eq!(mounts[1].origin, MountOrigin::Live);
    }

    #[test]
    fn test_parse_fstab_nulls() {
        let json = r#"{"filesystems": [
            {"source":"LABEL=ostree", "target":"/", "fstype":"ext4", "options":null},
            {"source":null, "target":null, "fstype":"swap", "options":"defaults"}
        ]}"#;
        let mounts = parse_findmnt_json(json, MountOrigin::Fstab).unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].options, "");
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_findmnt_json("", MountOrigin::Fstab).unwrap().is_empty());
        assert!(parse_findmnt_json("not json", MountOrigin::Live).is_err());
    }

    #[test]
    fn test_strip_bind_subpath() {
        assert_eq!(strip_bind_subpath("/dev/vda3[/boot]"), "/dev/vda3");
        assert_eq!(strip_bind_subpath("/dev/vda1"), "/dev/vda1");
        assert_eq!(strip_bind_subpath("systemd-1"), "systemd-1");
    }
}
