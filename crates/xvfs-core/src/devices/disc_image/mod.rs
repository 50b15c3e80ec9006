//! Disc image device.
//!
//! Maps a whole GDFX disc image once and parses its directory tables into
//! an entry tree at construction. Every entry, handle and view derived
//! from the device shares the one mapping.

#[cfg(any(test, feature = "test-support"))]
pub mod builder;
mod entry;
mod file;
pub mod gdfx;

use std::path::Path;
use std::sync::Arc;

pub use entry::DiscImageEntry;
pub use file::DiscImageFile;
pub use gdfx::{Extent, VolumeHeader, SECTOR_SIZE};

use crate::device::Device;
use crate::entry::{Entry, EntryId, EntryTree};
use crate::error::{VfsError, VfsResult};
use crate::mapped::MappedRegion;
use crate::path;
use crate::types::VolumeInfo;

/// A mounted, immutable GDFX disc image.
pub struct DiscImageDevice {
    mount_path: String,
    mmap: Arc<MappedRegion>,
    header: VolumeHeader,
    tree: EntryTree<Extent>,
}

impl std::fmt::Debug for DiscImageDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscImageDevice")
            .field("mount_path", &self.mount_path)
            .field("image", &self.mmap.path())
            .field("partition_offset", &self.header.partition_offset)
            .field("entries", &self.tree.len())
            .finish()
    }
}

impl DiscImageDevice {
    /// Map the image at `host_path` and parse it.
    pub fn open(mount_path: impl Into<String>, host_path: impl AsRef<Path>) -> VfsResult<Self> {
        let mmap = MappedRegion::open(host_path)?;
        Self::from_region(mount_path, mmap)
    }

    /// Parse an already-mapped image.
    ///
    /// Fails without producing a device if the image is malformed.
    pub fn from_region(mount_path: impl Into<String>, mmap: Arc<MappedRegion>) -> VfsResult<Self> {
        let mount_path = path::canonicalize(&mount_path.into());
        let (header, tree) = gdfx::parse_image(mmap.as_slice()).inspect_err(|e| {
            tracing::warn!(
                image = %mmap.path().display(),
                %mount_path,
                "rejecting disc image: {}",
                e
            );
        })?;
        tracing::info!(
            image = %mmap.path().display(),
            %mount_path,
            entries = tree.len(),
            "disc image parsed"
        );
        Ok(Self {
            mount_path,
            mmap,
            header,
            tree,
        })
    }

    /// The mapping shared by every entry of this device.
    pub fn mmap(&self) -> &Arc<MappedRegion> {
        &self.mmap
    }

    pub fn header(&self) -> VolumeHeader {
        self.header
    }

    /// Typed view of one entry.
    pub fn disc_entry(&self, id: EntryId) -> Option<DiscImageEntry<'_>> {
        let info = self.tree.info(id)?;
        let extent = *self.tree.payload(id)?;
        Some(DiscImageEntry::new(self, id, info, extent))
    }

    /// Typed path resolution.
    pub fn resolve(&self, path: &str) -> VfsResult<DiscImageEntry<'_>> {
        let id = self.tree.resolve(path)?;
        self.disc_entry(id).ok_or_else(|| VfsError::not_found(path))
    }

    /// Every entry, parents before children.
    pub fn disc_entries(&self) -> impl Iterator<Item = DiscImageEntry<'_>> + '_ {
        self.tree.ids().filter_map(|id| self.disc_entry(id))
    }
}

impl Device for DiscImageDevice {
    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn name(&self) -> &'static str {
        "DiscImageDevice"
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn root(&self) -> Box<dyn Entry + '_> {
        Box::new(
            self.disc_entry(EntryId::ROOT)
                .expect("entry trees always have a root"),
        )
    }

    fn entry(&self, id: EntryId) -> Option<Box<dyn Entry + '_>> {
        self.disc_entry(id)
            .map(|e| Box::new(e) as Box<dyn Entry + '_>)
    }

    fn entry_count(&self) -> usize {
        self.tree.len()
    }

    fn resolve_path(&self, path: &str) -> VfsResult<Box<dyn Entry + '_>> {
        self.resolve(path).map(|e| Box::new(e) as Box<dyn Entry + '_>)
    }

    fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            bytes_per_sector: SECTOR_SIZE as u32,
            sectors_per_allocation_unit: 1,
            total_allocation_units: self.mmap.len().div_ceil(SECTOR_SIZE),
            available_allocation_units: 0,
        }
    }
}
