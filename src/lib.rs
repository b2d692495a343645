//! Boot-time EFI System Partition tooling.
//!
//! - [`espgen`] decides whether and where the ESP gets mounted at boot.
//! - [`loadopt`] moves Boot#### load options to a new partition UUID.
//! - [`efivar`] reads and writes efivarfs values.
//! - [`kmsg`] routes `log` records into the kernel log buffer.

pub mod config;
pub mod efivar;
pub mod espgen;
pub mod evidence;
pub mod kmsg;
pub mod loadopt;
pub mod process;
