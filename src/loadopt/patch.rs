//! Rewriting the partition UUID embedded in Boot#### load options.

use uuid::Uuid;

use super::{hexdump, is_load_option, LoadOption, LoadOptionError};
use crate::efivar::{guid_to_bytes, EfiVarError, EfiVarStore, ATTRIBUTE_HEADER_LEN};

/// What to replace, and whether to actually write.
#[derive(Debug, Clone, Copy)]
pub struct PatchOptions {
    pub current: Uuid,
    pub new: Uuid,
    pub dry_run: bool,
}

/// A load option that referenced the current UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedOption {
    /// Full variable name, `BootXXXX-<GUID>`
    pub name: String,
    /// Short name, `BootXXXX`
    pub label: String,
    /// Variable file before patching, attribute mask included
    pub before: Vec<u8>,
    /// Variable file after patching
    pub after: Vec<u8>,
}

impl PatchedOption {
    pub fn dump_before(&self) -> String {
        dump(&self.label, &self.before)
    }

    pub fn dump_after(&self) -> String {
        dump(&self.label, &self.after)
    }
}

/// Result of a scan over the variable store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// Number of Boot#### variables examined
    pub scanned: usize,
    /// Variables referencing the current UUID, in store order
    pub matched: Vec<PatchedOption>,
    /// Variables actually written back
    pub written: Vec<String>,
    /// Variables that could not be read, parsed or written, with the reason
    pub failed: Vec<(String, String)>,
}

impl PatchReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn matched_names(&self) -> Vec<&str> {
        self.matched.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Replace every GPT Hard Drive signature equal to `current` with `new`.
///
/// `raw` is a complete variable file, attribute mask included. Only the 16
/// signature bytes of matching nodes are touched. Returns how many
/// signatures were replaced.
pub fn patch_value(raw: &mut [u8], current: &Uuid, new: &Uuid) -> Result<usize, LoadOptionError> {
    if raw.len() < ATTRIBUTE_HEADER_LEN {
        return Err(LoadOptionError::TooShort(raw.len()));
    }

    let offsets = LoadOption::parse(&raw[ATTRIBUTE_HEADER_LEN..])?.signature_offsets(current);

    let replacement = guid_to_bytes(new);
    for offset in &offsets {
        let start = ATTRIBUTE_HEADER_LEN + offset;
        raw[start..start + 16].copy_from_slice(&replacement);
    }

    Ok(offsets.len())
}

/// Scan all load options in `store` and retarget those using `current`.
///
/// Each variable is handled on its own: a failure is recorded in the report
/// and the scan moves on. Only an unreadable store is an error.
pub fn patch_load_options(
    store: &EfiVarStore,
    options: &PatchOptions,
) -> Result<PatchReport, EfiVarError> {
    let mut report = PatchReport::default();

    for var in store.list()? {
        let name = var.to_string();
        if !is_load_option(&var) {
            log::debug!("Variable {} is not a load option", var.name);
            continue;
        }
        report.scanned += 1;

        let mut raw = match store.read_raw(&name) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                log::error!("{}", e);
                report.failed.push((name, e.to_string()));
                continue;
            }
        };

        let before = raw.clone();
        match patch_value(&mut raw, &options.current, &options.new) {
            Ok(0) => {
                log::debug!(
                    "Load option {} does not match partition {}",
                    var.name,
                    options.current
                );
                continue;
            }
            Ok(count) => {
                log::debug!("Load option {}: {} signature(s) replaced", var.name, count)
            }
            Err(e) => {
                log::error!("Invalid load option {}: {}", var.name, e);
                report.failed.push((name, e.to_string()));
                continue;
            }
        }

        report.matched.push(PatchedOption {
            name: name.clone(),
            label: var.name.clone(),
            before,
            after: raw.clone(),
        });

        if options.dry_run {
            continue;
        }
        match store.write_raw(&name, &raw) {
            Ok(()) => report.written.push(name),
            Err(e) => {
                log::error!("{}", e);
                report.failed.push((name, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Describe a variable file: active marker, description and device path,
/// followed by a hexdump of the value.
fn dump(label: &str, raw: &[u8]) -> String {
    let value = &raw[ATTRIBUTE_HEADER_LEN.min(raw.len())..];
    match LoadOption::parse(value) {
        Ok(opt) => format!("{}: {}\n{}", label, opt.summary(), hexdump(value)),
        Err(e) => format!("{}: unparsable ({})\n{}", label, e, hexdump(value)),
    }
}
