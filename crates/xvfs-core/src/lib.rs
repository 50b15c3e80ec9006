//! # xvfs-core
//!
//! Guest virtual filesystem for a console emulator.
//!
//! Games see a single `\`-separated namespace (`\Device\Cdrom0\default.xex`,
//! `game:\media\intro.bik`). Behind it, each mount point is a [`Device`]
//! owning an immutable tree of [`Entry`] nodes. Key components:
//!
//! - [`VirtualFileSystem`] - routes guest paths to devices by longest
//!   mount prefix, after symbolic link rewriting
//! - [`DiscImageDevice`] - a GDFX disc image, memory-mapped once and
//!   parsed at mount time
//! - [`MappedRegion`] / [`MappedView`] - the shared host mapping and
//!   zero-copy windows into it
//! - [`VfsConfig`] - RON description of what to mount
//!
//! Opening an entry registers an [`xvfs_kernel::XFile`] with the guest's
//! [`xvfs_kernel::KernelState`]. Handles and views hold their own reference
//! to the mapping, so they keep working after the device is unregistered.

pub mod config;
mod device;
pub mod devices;
mod entry;
mod error;
pub mod mapped;
mod mount;
pub mod path;
mod types;

pub use config::{ConfigError, MountConfig, VfsConfig};
pub use device::Device;
pub use devices::{DiscImageDevice, DiscImageEntry, DiscImageFile};
pub use entry::{Entry, EntryId, EntryTree};
pub use error::{VfsError, VfsResult};
pub use mapped::{MappedRegion, MappedView, Mode};
pub use mount::{ResolvedEntry, VirtualFileSystem};
pub use types::{EntryInfo, EntryKind, MountInfo, VolumeInfo};
