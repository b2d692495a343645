//! EFI Load Options (`Boot####` variables).
//!
//! Layout of a load option value (after the efivarfs attribute mask):
//!
//! ```text
//! u32      attributes
//! u16      file path list length
//! [u16]    description, NUL terminated
//! [u8]     file path list (device path)
//! [u8]     optional data
//! ```

pub mod device_path;
mod patch;

pub use patch::{patch_load_options, patch_value, PatchOptions, PatchReport, PatchedOption};

use thiserror::Error;

use crate::efivar::{decode_utf16_value, VarName, EFI_GLOBAL_GUID};
use device_path::Node;

/// Load option attribute: entry is active.
pub const LOAD_OPTION_ACTIVE: u32 = 0x0000_0001;

const FIXED_HEADER_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadOptionError {
    #[error("load option is {0} bytes, too short for its header")]
    TooShort(usize),

    #[error("load option description is not NUL terminated")]
    UnterminatedDescription,

    #[error("file path list of {len} bytes overruns the load option")]
    PathListOverrun { len: usize },

    #[error("device path node at offset {offset} is truncated")]
    TruncatedNode { offset: usize },

    #[error("device path node at offset {offset} has invalid length {len}")]
    BadNodeLength { offset: usize, len: usize },

    #[error("device path has no end node")]
    MissingEndNode,
}

/// Parsed view of a load option value.
#[derive(Debug, Clone)]
pub struct LoadOption<'a> {
    pub attributes: u32,
    pub description: String,
    /// Offset of the file path list within the value
    pub path_offset: usize,
    pub nodes: Vec<Node<'a>>,
    pub optional_data: &'a [u8],
}

impl<'a> LoadOption<'a> {
    pub fn parse(value: &'a [u8]) -> Result<Self, LoadOptionError> {
        if value.len() < FIXED_HEADER_LEN {
            return Err(LoadOptionError::TooShort(value.len()));
        }
        let attributes = u32::from_ne_bytes([value[0], value[1], value[2], value[3]]);
        let path_len = u16::from_ne_bytes([value[4], value[5]]) as usize;

        // Description runs up to and including the first aligned NUL unit.
        let desc_end = value[FIXED_HEADER_LEN..]
            .chunks_exact(2)
            .position(|c| c == [0, 0])
            .map(|i| FIXED_HEADER_LEN + (i + 1) * 2)
            .ok_or(LoadOptionError::UnterminatedDescription)?;
        let description = decode_utf16_value(&value[FIXED_HEADER_LEN..desc_end]);

        let path_end = desc_end + path_len;
        if path_end > value.len() {
            return Err(LoadOptionError::PathListOverrun { len: path_len });
        }

        let nodes = device_path::walk(&value[desc_end..path_end])?;

        Ok(Self {
            attributes,
            description,
            path_offset: desc_end,
            nodes,
            optional_data: &value[path_end..],
        })
    }

    pub fn is_active(&self) -> bool {
        self.attributes & LOAD_OPTION_ACTIVE != 0
    }

    /// Offsets (within the value) of GPT Hard Drive signatures equal to `uuid`.
    pub fn signature_offsets(&self, uuid: &uuid::Uuid) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| {
                n.hard_drive()
                    .and_then(|hd| hd.partition_uuid())
                    .is_some_and(|u| u == *uuid)
            })
            .map(|n| self.path_offset + n.offset + device_path::HARD_DRIVE_SIGNATURE_OFFSET)
            .collect()
    }

    /// One line summary in the style of efibootmgr.
    pub fn summary(&self) -> String {
        format!(
            "{}{} {}",
            if self.is_active() { "* " } else { "" },
            self.description,
            device_path::describe(&self.nodes)
        )
    }
}

/// `Boot` followed by exactly four hex digits, under the global vendor GUID.
pub fn is_load_option(var: &VarName) -> bool {
    let global = crate::efivar::parse_guid(EFI_GLOBAL_GUID);
    if global != Some(var.vendor) {
        return false;
    }
    let name = var.name.as_bytes();
    name.len() == 8 && name.starts_with(b"Boot") && name[4..].iter().all(u8::is_ascii_hexdigit)
}

/// Minimal hexdump, 16 bytes per line with a gap after the eighth.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + 1);
    for (offset, byte) in data.iter().enumerate() {
        let prefix = if offset % 16 == 0 {
            if offset == 0 {
                ""
            } else {
                "\n"
            }
        } else if offset % 8 == 0 {
            "  "
        } else {
            " "
        };
        out.push_str(prefix);
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
