//! systemd mount/automount units for an [`EspMount`].

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;

use super::EspMount;

pub const UNIT_HEADER: &str = "# Automatically generated by esp-generator\n";

const DESCRIPTION: &str = "EFI System Partition Automount";
const AUTOMOUNT_IDLE_TIMEOUT: &str = "2min";
const WANTED_BY: &str = "local-fs.target";

/// Escape a path the way `systemd-escape --path` does.
pub fn escape_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return "-".to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    for (i, b) in trimmed.bytes().enumerate() {
        match b {
            b'/' => out.push('-'),
            b'.' if i == 0 => out.push_str("\\x2e"),
            b if b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'.') => {
                out.push(b as char)
            }
            b => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

impl EspMount {
    /// Base unit name shared by the mount and automount units.
    pub fn unit_name(&self) -> String {
        escape_path(&self.target)
    }

    pub fn mount_unit(&self) -> String {
        let device = escape_path(&self.source);
        format!(
            "{header}\n\n\
             [Unit]\n\
             Description={desc}\n\
             Requires=systemd-fsck@{device}.service\n\
             After=systemd-fsck@{device}.service\n\
             After=blockdev@{device}.target\n\
             \n\
             [Mount]\n\
             What={what}\n\
             Where={where_}\n\
             Type={fstype}\n\
             Options={options}\n",
            header = UNIT_HEADER.trim_end(),
            desc = DESCRIPTION,
            device = device,
            what = self.source,
            where_ = self.target,
            fstype = self.fstype,
            options = self.options(),
        )
    }

    pub fn automount_unit(&self) -> String {
        format!(
            "{header}\n\n\
             [Unit]\n\
             Description={desc}\n\
             \n\
             [Automount]\n\
             Where={where_}\n\
             TimeoutIdleSec={timeout}\n",
            header = UNIT_HEADER.trim_end(),
            desc = DESCRIPTION,
            where_ = self.target,
            timeout = AUTOMOUNT_IDLE_TIMEOUT,
        )
    }

    /// Write the units into a generator output directory and hook the
    /// automount into `local-fs.target`.
    pub fn write_units(&self, unit_dir: &Path) -> Result<()> {
        let name = self.unit_name();
        let mount_name = format!("{}.mount", name);
        let automount_name = format!("{}.automount", name);

        let mount_path = unit_dir.join(&mount_name);
        log::info!("Writing {}", mount_path.display());
        fs::write(&mount_path, self.mount_unit())
            .with_context(|| format!("Failed to write {}", mount_path.display()))?;

        let automount_path = unit_dir.join(&automount_name);
        log::info!("Writing {}", automount_path.display());
        fs::write(&automount_path, self.automount_unit())
            .with_context(|| format!("Failed to write {}", automount_path.display()))?;

        let wants_dir = unit_dir.join(format!("{}.wants", WANTED_BY));
        fs::create_dir_all(&wants_dir)
            .with_context(|| format!("Failed to create {}", wants_dir.display()))?;
        let link = wants_dir.join(&automount_name);
        let target = Path::new("..").join(&automount_name);
        log::info!("Linking {} to {}", link.display(), target.display());
        match symlink(&target, &link) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if fs::read_link(&link).ok().as_deref() != Some(target.as_path()) {
                    fs::remove_file(&link)?;
                    symlink(&target, &link)
                        .with_context(|| format!("Failed to link {}", link.display()))?;
                }
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to link {}", link.display()))
            }
        }

        Ok(())
    }
}
