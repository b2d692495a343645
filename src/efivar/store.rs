//! Directory-backed variable store (efivarfs or a copy of one).

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::guid::parse_guid;
use super::immutable::clear_immutable;
use super::utf16::decode_utf16_value;
use super::{EfiVarError, VarRead, ATTRIBUTE_HEADER_LEN};

/// A variable file name split into its parts: `<Name>-<GUID>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarName {
    pub name: String,
    pub vendor: Uuid,
}

impl VarName {
    /// Split a file name. The vendor GUID is always the last 36 characters.
    pub fn parse(file_name: &str) -> Option<Self> {
        let split = file_name.len().checked_sub(37)?;
        if !file_name.is_char_boundary(split) || file_name.as_bytes()[split] != b'-' {
            return None;
        }
        let name = &file_name[..split];
        if name.is_empty() {
            return None;
        }
        let vendor = parse_guid(&file_name[split + 1..])?;
        Some(Self {
            name: name.to_string(),
            vendor,
        })
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.vendor.hyphenated())
    }
}

/// Firmware variables exposed as one file per variable.
#[derive(Debug, Clone)]
pub struct EfiVarStore {
    dir: PathBuf,
}

impl EfiVarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backing file for a full `<Name>-<GUID>` variable name.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read the raw file contents, attribute mask included.
    pub fn read_raw(&self, name: &str) -> Result<Option<Vec<u8>>, EfiVarError> {
        match fs::read(self.path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EfiVarError::Read {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Read a variable and classify the result.
    pub fn read(&self, name: &str) -> Result<VarRead, EfiVarError> {
        let Some(mut data) = self.read_raw(name)? else {
            return Ok(VarRead::Absent);
        };
        if data.len() < ATTRIBUTE_HEADER_LEN {
            return Ok(VarRead::Malformed { len: data.len() });
        }
        data.drain(..ATTRIBUTE_HEADER_LEN);
        Ok(VarRead::Value(data))
    }

    /// Read a variable's value, treating malformed data as absent.
    pub fn read_efivar(&self, name: &str) -> Result<Option<Vec<u8>>, EfiVarError> {
        let read = self.read(name)?;
        if read.is_malformed() {
            log::warn!(
                "Invalid EFI variable {} is less than {} bytes",
                name,
                ATTRIBUTE_HEADER_LEN
            );
        }
        Ok(read.into_value())
    }

    /// Read a variable holding a UTF-16 string.
    pub fn read_efivar_utf16_string(&self, name: &str) -> Result<Option<String>, EfiVarError> {
        Ok(self
            .read_efivar(name)?
            .map(|value| decode_utf16_value(&value)))
    }

    /// List the variables in the store.
    ///
    /// Files whose names don't follow `<Name>-<GUID>` are skipped.
    pub fn list(&self) -> Result<Vec<VarName>, EfiVarError> {
        let unavailable = |source| EfiVarError::StoreUnavailable {
            path: self.dir.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(unavailable)? {
            let entry = entry.map_err(unavailable)?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            match VarName::parse(file_name) {
                Some(name) => names.push(name),
                None => log::debug!("Ignoring non-variable file {}", file_name),
            }
        }
        names.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(names)
    }

    /// Replace the raw contents of an existing variable.
    ///
    /// `raw` must carry the attribute mask. efivarfs requires the whole
    /// variable in a single write, so the buffer is never split.
    pub fn write_raw(&self, name: &str, raw: &[u8]) -> Result<(), EfiVarError> {
        if raw.len() < ATTRIBUTE_HEADER_LEN {
            return Err(EfiVarError::Write {
                name: name.to_string(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "value is missing the attribute mask",
                ),
            });
        }

        let path = self.path(name);
        let write_err = |source| EfiVarError::Write {
            name: name.to_string(),
            source,
        };

        let _guard = clear_immutable(&path).map_err(write_err)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(write_err)?;
        let written = file.write(raw).map_err(write_err)?;
        if written != raw.len() {
            return Err(write_err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write ({} of {} bytes)", written, raw.len()),
            )));
        }
        Ok(())
    }
}
