//! lsblk JSON output.
//!
//! Expected from
//! `lsblk --json --list --paths --output PATH,PKNAME,PTTYPE,PARTUUID,PARTTYPE,UUID,FSTYPE,TYPE`.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{BlockKind, DiskLabel, PartitionRecord};

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    path: Option<String>,
    pkname: Option<String>,
    pttype: Option<String>,
    partuuid: Option<String>,
    parttype: Option<String>,
    uuid: Option<String>,
    fstype: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub fn parse_lsblk_json(json: &str) -> Result<Vec<PartitionRecord>> {
    let output: LsblkOutput =
        serde_json::from_str(json).context("Failed to parse lsblk JSON output")?;

    Ok(output
        .blockdevices
        .into_iter()
        .filter_map(|d| {
            Some(PartitionRecord {
                device: d.path?,
                kind: BlockKind::from_lsblk(d.kind.as_deref().unwrap_or("")),
                disk: d.pkname.filter(|s| !s.is_empty()),
                disk_label: d.pttype.as_deref().map(DiskLabel::from_pttype),
                uuid: d.partuuid.map(|u| u.to_ascii_lowercase()),
                part_type: d.parttype,
                fs_uuid: d.uuid,
                fstype: d.fstype,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gpt_disk() {
        let json = r#"{
           "blockdevices": [
              {"path":"/dev/vda", "pkname":null, "pttype":"gpt", "partuuid":null, "parttype":null, "uuid":null, "fstype":null, "type":"disk"},
              {"path":"/dev/vda1", "pkname":"/dev/vda", "pttype":"gpt", "partuuid":"A0B1C2D3-0000-4000-8000-000000000001", "parttype":"c12a7328-f81f-11d2-ba4b-00a0c93ec93b", "uuid":"1234-ABCD", "fstype":"vfat", "type":"part"}
           ]
        }"#;
        let records = parse_lsblk_json(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, BlockKind::Disk);
        assert!(records[0].disk.is_none());

        let esp = &records[1];
        assert!(esp.is_esp());
        assert_eq!(esp.disk.as_deref(), Some("/dev/vda"));
        assert_eq!(
            esp.gpt_uuid(),
            Some("a0b1c2d3-0000-4000-8000-000000000001")
        );
    }

    #[test]
    fn test_parse_mbr_disk() {
        let json = r#"{"blockdevices": [
            {"path":"/dev/vda1", "pkname":"/dev/vda", "pttype":"dos", "partuuid":"5e1f0b2a-01", "parttype":"0xef", "uuid":"1234-ABCD", "fstype":"vfat", "type":"part"}
        ]}"#;
        let records = parse_lsblk_json(json).unwrap();
        assert_eq!(records[0].disk_label, Some(DiskLabel::Dos));
        assert!(records[0].is_esp());
        assert!(records[0].gpt_uuid().is_none());
    }

    #[test]
    fn test_parse_error() {
        assert!(parse_lsblk_json("").is_err());
    }
}
