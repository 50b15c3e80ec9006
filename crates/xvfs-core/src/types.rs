//! Core VFS types.

use xvfs_kernel::FileAttributes;

/// Kind of node in an entry tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Identity and metadata shared by every entry, whatever backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry name (not full path). Empty for a device root.
    pub name: String,
    /// Path relative to the device root, `\` separated.
    pub path: String,
    pub kind: EntryKind,
    pub attributes: FileAttributes,
    /// Size in bytes.
    pub size: u64,
    /// Size rounded up to the device's allocation granularity.
    pub allocation_size: u64,
}

impl EntryInfo {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Volume geometry, as reported by volume information queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub bytes_per_sector: u32,
    pub sectors_per_allocation_unit: u32,
    pub total_allocation_units: u64,
    pub available_allocation_units: u64,
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., `\Device\Cdrom0`).
    pub mount_path: String,
    /// Device type name.
    pub device_name: &'static str,
    /// Whether this mount is read-only.
    pub read_only: bool,
    /// Number of entries in the device's tree, root included.
    pub entry_count: usize,
}
