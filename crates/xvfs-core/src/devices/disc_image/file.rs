//! Open disc image files.

use std::sync::Arc;

use xvfs_kernel::{FileAccess, FileAttributes, XFile, XResult, XStatus};

use super::entry::DiscImageEntry;
use crate::entry::Entry;
use crate::mapped::MappedRegion;

/// An open disc image entry.
///
/// Owns a reference to the image mapping rather than to the device, so
/// reads keep working after the device is unmounted.
#[derive(Debug)]
pub struct DiscImageFile {
    name: String,
    path: String,
    attributes: FileAttributes,
    access: FileAccess,
    mmap: Arc<MappedRegion>,
    data_offset: u64,
    data_size: u64,
}

impl DiscImageFile {
    pub(super) fn new(entry: &DiscImageEntry<'_>, access: FileAccess) -> Self {
        Self {
            name: entry.name().to_string(),
            path: entry.absolute_path(),
            attributes: entry.attributes(),
            access,
            mmap: Arc::clone(entry.mmap()),
            data_offset: entry.data_offset(),
            data_size: entry.data_size(),
        }
    }
}

impl XFile for DiscImageFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn granted_access(&self) -> FileAccess {
        self.access
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    fn length(&self) -> u64 {
        self.data_size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> XResult<usize> {
        if offset >= self.data_size {
            return Ok(0);
        }
        let n = (self.data_size - offset).min(buf.len() as u64);
        let bytes = self
            .mmap
            .bytes(self.data_offset + offset, n)
            .map_err(|e| {
                tracing::error!(path = %self.path, offset, "read outside image: {}", e);
                XStatus::from(e)
            })?;
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}
