//! Disc image entries.

use std::fmt;
use std::sync::Arc;

use xvfs_kernel::{FileAccess, FileHandle, KernelState, XResult, XStatus};

use super::DiscImageDevice;
use super::file::DiscImageFile;
use super::gdfx::Extent;
use crate::device::Device;
use crate::entry::{Entry, EntryId};
use crate::error::{VfsError, VfsResult};
use crate::mapped::{MappedRegion, MappedView, Mode};
use crate::types::EntryInfo;

/// One file or directory of a disc image.
///
/// A file's bytes are the contiguous range
/// `[data_offset, data_offset + data_size)` of the device's mapping.
/// Directories have an empty range.
#[derive(Clone, Copy)]
pub struct DiscImageEntry<'a> {
    device: &'a DiscImageDevice,
    id: EntryId,
    info: &'a EntryInfo,
    extent: Extent,
}

impl fmt::Debug for DiscImageEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscImageEntry")
            .field("path", &self.info.path)
            .field("kind", &self.info.kind)
            .field("data_offset", &self.extent.data_offset)
            .field("data_size", &self.extent.data_size)
            .finish()
    }
}

impl<'a> DiscImageEntry<'a> {
    pub(super) fn new(
        device: &'a DiscImageDevice,
        id: EntryId,
        info: &'a EntryInfo,
        extent: Extent,
    ) -> Self {
        Self {
            device,
            id,
            info,
            extent,
        }
    }

    /// The mapping this entry's bytes live in.
    pub fn mmap(&self) -> &'a Arc<MappedRegion> {
        self.device.mmap()
    }

    /// Byte offset of the entry's data within the image.
    pub fn data_offset(&self) -> u64 {
        self.extent.data_offset
    }

    /// Length of the entry's data in bytes.
    pub fn data_size(&self) -> u64 {
        self.extent.data_size
    }

    /// Borrow the entry's bytes straight out of the mapping.
    pub fn data(&self) -> VfsResult<&'a [u8]> {
        self.mmap().bytes(self.extent.data_offset, self.extent.data_size)
    }
}

impl Entry for DiscImageEntry<'_> {
    fn id(&self) -> EntryId {
        self.id
    }

    fn device(&self) -> &dyn Device {
        self.device
    }

    fn info(&self) -> &EntryInfo {
        self.info
    }

    fn parent(&self) -> Option<Box<dyn Entry + '_>> {
        let parent = self.device.tree.parent(self.id)?;
        self.device
            .disc_entry(parent)
            .map(|e| Box::new(e) as Box<dyn Entry + '_>)
    }

    fn children(&self) -> Vec<Box<dyn Entry + '_>> {
        self.device
            .tree
            .children(self.id)
            .iter()
            .filter_map(|&id| self.device.disc_entry(id))
            .map(|e| Box::new(e) as Box<dyn Entry + '_>)
            .collect()
    }

    fn open(
        &self,
        kernel_state: &KernelState,
        desired_access: FileAccess,
    ) -> XResult<FileHandle> {
        if desired_access.requests_write() {
            tracing::warn!(
                path = %self.absolute_path(),
                access = format_args!("{:#010X}", desired_access.bits()),
                "write access requested on read-only disc"
            );
            return Err(XStatus::AccessDenied);
        }
        let file = DiscImageFile::new(self, desired_access);
        kernel_state.register_file(Arc::new(file))
    }

    fn can_map(&self) -> bool {
        self.info.kind.is_file()
    }

    fn open_mapped(&self, mode: Mode, offset: u64, length: u64) -> VfsResult<MappedView> {
        if !self.can_map() {
            return Err(VfsError::MappingUnsupported(self.absolute_path()));
        }
        if mode != Mode::Read {
            return Err(VfsError::access_denied(format!(
                "{} is on read-only media",
                self.absolute_path()
            )));
        }
        // Bounds are relative to the entry and checked before touching the
        // mapping.
        let end = offset.checked_add(length).ok_or_else(|| {
            VfsError::invalid_parameter(format!("range {offset}+{length} overflows"))
        })?;
        if end > self.extent.data_size {
            return Err(VfsError::invalid_parameter(format!(
                "range {offset}..{end} exceeds {} ({} bytes)",
                self.absolute_path(),
                self.extent.data_size
            )));
        }
        self.mmap()
            .slice(mode, self.extent.data_offset + offset, length)
    }
}
