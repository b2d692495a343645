//! Device path walking.
//!
//! Only the Hard Drive media node is understood. Every other node is
//! stepped over using its length field and never interpreted.

use uuid::Uuid;

use super::LoadOptionError;
use crate::efivar::guid_from_bytes;

pub const TYPE_MEDIA: u8 = 0x04;
pub const TYPE_END: u8 = 0x7f;
pub const SUBTYPE_HARD_DRIVE: u8 = 0x01;
pub const SUBTYPE_END_ENTIRE: u8 = 0xff;

/// Partition format: GUID partition table.
pub const PARTITION_FORMAT_GPT: u8 = 0x02;
/// Signature type: GUID signature.
pub const SIGNATURE_TYPE_GUID: u8 = 0x02;

const NODE_HEADER_LEN: usize = 4;
/// type(1) subtype(1) length(2) number(4) start(8) size(8) signature(16) format(1) sigtype(1)
pub const HARD_DRIVE_NODE_LEN: usize = 42;
/// Offset of the signature field inside a Hard Drive node.
pub const HARD_DRIVE_SIGNATURE_OFFSET: usize = 24;

/// A node located inside a device path buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node<'a> {
    /// Offset of the node header within the walked buffer
    pub offset: usize,
    pub node_type: u8,
    pub sub_type: u8,
    /// Whole node, header included
    pub bytes: &'a [u8],
}

impl<'a> Node<'a> {
    pub fn is_end(&self) -> bool {
        self.node_type == TYPE_END && self.sub_type == SUBTYPE_END_ENTIRE
    }

    pub fn hard_drive(&self) -> Option<HardDriveNode> {
        if self.node_type != TYPE_MEDIA
            || self.sub_type != SUBTYPE_HARD_DRIVE
            || self.bytes.len() < HARD_DRIVE_NODE_LEN
        {
            return None;
        }
        let b = self.bytes;
        let mut signature = [0u8; 16];
        signature.copy_from_slice(&b[24..40]);
        Some(HardDriveNode {
            partition_number: u32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
            partition_start: read_u64(&b[8..16]),
            partition_size: read_u64(&b[16..24]),
            signature,
            format: b[40],
            signature_type: b[41],
        })
    }
}

fn read_u64(b: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(b);
    u64::from_ne_bytes(buf)
}

/// Hard Drive media device path node (UEFI section 10.3.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardDriveNode {
    pub partition_number: u32,
    pub partition_start: u64,
    pub partition_size: u64,
    pub signature: [u8; 16],
    pub format: u8,
    pub signature_type: u8,
}

impl HardDriveNode {
    /// The partition UUID, if this node identifies a GPT partition by GUID.
    pub fn partition_uuid(&self) -> Option<Uuid> {
        if self.format == PARTITION_FORMAT_GPT && self.signature_type == SIGNATURE_TYPE_GUID {
            Some(guid_from_bytes(self.signature))
        } else {
            None
        }
    }
}

/// Walk a device path up to and including its End Entire node.
pub fn walk(path: &[u8]) -> Result<Vec<Node<'_>>, LoadOptionError> {
    let mut nodes = Vec::new();
    let mut offset = 0;

    while offset < path.len() {
        if path.len() - offset < NODE_HEADER_LEN {
            return Err(LoadOptionError::TruncatedNode { offset });
        }
        let len = u16::from_ne_bytes([path[offset + 2], path[offset + 3]]) as usize;
        if len < NODE_HEADER_LEN || offset + len > path.len() {
            return Err(LoadOptionError::BadNodeLength { offset, len });
        }

        let node = Node {
            offset,
            node_type: path[offset],
            sub_type: path[offset + 1],
            bytes: &path[offset..offset + len],
        };
        nodes.push(node);
        offset += len;

        if node.is_end() {
            return Ok(nodes);
        }
    }

    Err(LoadOptionError::MissingEndNode)
}

/// Short text rendering for diagnostics.
pub fn describe(nodes: &[Node<'_>]) -> String {
    nodes
        .iter()
        .filter(|n| !n.is_end())
        .map(|n| match n.hard_drive() {
            Some(hd) => match hd.partition_uuid() {
                Some(uuid) => format!(
                    "HD({},GPT,{},{:#x},{:#x})",
                    hd.partition_number,
                    uuid.hyphenated(),
                    hd.partition_start,
                    hd.partition_size
                ),
                None => format!(
                    "HD({},{:#x},{:#x})",
                    hd.partition_number, hd.partition_start, hd.partition_size
                ),
            },
            None => format!("Path({},{})", n.node_type, n.sub_type),
        })
        .collect::<Vec<_>>()
        .join("/")
}
