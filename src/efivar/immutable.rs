//! efivarfs marks most variable files immutable so a stray `rm` cannot brick
//! a machine. The flag has to be dropped for the duration of a write.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

const FS_IMMUTABLE_FL: libc::c_int = 0x0000_0010;

/// Restores the immutable flag when dropped.
pub(super) struct MutableGuard {
    file: File,
    flags: libc::c_int,
}

impl Drop for MutableGuard {
    fn drop(&mut self) {
        if let Err(e) = set_flags(&self.file, self.flags) {
            log::warn!("Failed to restore immutable flag: {}", e);
        }
    }
}

/// Clear the immutable flag on `path` if it is set.
///
/// Returns `None` when there was nothing to clear, including filesystems
/// that don't implement inode flags at all.
pub(super) fn clear_immutable(path: &Path) -> io::Result<Option<MutableGuard>> {
    let file = File::open(path)?;

    let flags = match get_flags(&file) {
        Ok(flags) => flags,
        Err(e) if is_unsupported(&e) => return Ok(None),
        Err(e) => return Err(e),
    };

    if flags & FS_IMMUTABLE_FL == 0 {
        return Ok(None);
    }

    set_flags(&file, flags & !FS_IMMUTABLE_FL)?;
    Ok(Some(MutableGuard { file, flags }))
}

fn is_unsupported(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ENOTTY) | Some(libc::EINVAL) | Some(libc::EOPNOTSUPP)
    )
}

fn get_flags(file: &File) -> io::Result<libc::c_int> {
    let mut flags: libc::c_int = 0;
    // SAFETY: FS_IOC_GETFLAGS writes a single int through the pointer.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_GETFLAGS, &mut flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_flags(file: &File, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: FS_IOC_SETFLAGS reads a single int through the pointer.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::FS_IOC_SETFLAGS, &flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
