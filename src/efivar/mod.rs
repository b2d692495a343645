//! EFI variable access over efivarfs.
//!
//! Every variable file starts with a 4 byte attribute mask followed by the
//! value. Callers of this module only ever see the value; the mask is kept
//! around internally so a patched variable can be written back unchanged.

mod guid;
mod immutable;
mod store;
mod utf16;

pub use guid::{guid_from_bytes, guid_to_bytes, parse_guid};
pub use store::{EfiVarStore, VarName};
pub use utf16::{decode_utf16_value, encode_utf16_value};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Vendor GUID of the UEFI global variables (Boot####, BootOrder, ...).
pub const EFI_GLOBAL_GUID: &str = "8be4df61-93ca-11d2-aa0d-00e098032b8c";

/// Vendor GUID of the Boot Loader Interface variables.
pub const LOADER_VENDOR_GUID: &str = "4a67b082-0a4c-41cf-b6c7-440b29bb8c4f";

/// Partition UUID of the partition the boot loader was started from.
pub const LOADER_DEVICE_PART_UUID_EFIVAR: &str =
    "LoaderDevicePartUUID-4a67b082-0a4c-41cf-b6c7-440b29bb8c4f";

/// Size of the attribute mask that precedes every stored value.
pub const ATTRIBUTE_HEADER_LEN: usize = 4;

/// Outcome of reading a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarRead {
    /// Value bytes with the attribute mask stripped. May be empty.
    Value(Vec<u8>),
    /// No such variable.
    Absent,
    /// The stored data is too short to carry the attribute mask.
    Malformed { len: usize },
}

impl VarRead {
    /// Collapse to "value or nothing".
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            VarRead::Value(value) => Some(value),
            VarRead::Absent | VarRead::Malformed { .. } => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, VarRead::Malformed { .. })
    }
}

#[derive(Debug, Error)]
pub enum EfiVarError {
    #[error("EFI variable store {} is not available: {source}", path.display())]
    StoreUnavailable { path: PathBuf, source: io::Error },

    #[error("failed to read EFI variable {name}: {source}")]
    Read { name: String, source: io::Error },

    #[error("failed to write EFI variable {name}: {source}")]
    Write { name: String, source: io::Error },
}
