//! Host memory mappings.
//!
//! A [`MappedRegion`] covers one whole host file. It is immutable once
//! created and shared by `Arc` between the device that opened it, every
//! entry parsed out of it, and every handle or view handed to the guest,
//! so the mapping stays valid for as long as anything derived from it is
//! alive.
//!
//! Views never copy: [`MappedView::as_slice`] is a borrow of the mapped
//! pages themselves.

use std::fmt;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};

/// Access mode for a mapping or a view into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Read,
    ReadWrite,
}

enum Backing {
    #[cfg(unix)]
    Host(host::HostMapping),
    Owned(Box<[u8]>),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            Backing::Host(mapping) => mapping.as_slice(),
            Backing::Owned(bytes) => bytes,
        }
    }
}

/// A read-only mapping of an entire host file.
pub struct MappedRegion {
    path: PathBuf,
    backing: Backing,
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.backing {
            #[cfg(unix)]
            Backing::Host(_) => "mmap",
            Backing::Owned(_) => "owned",
        };
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("backing", &kind)
            .finish()
    }
}

impl MappedRegion {
    /// Map a host file read-only.
    ///
    /// Fails if the file is missing, unreadable, or empty.
    pub fn open(path: impl AsRef<Path>) -> VfsResult<Arc<Self>> {
        let path = path.as_ref();
        let file =
            std::fs::File::open(path).map_err(|e| VfsError::mapping_failed(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| VfsError::mapping_failed(path, e))?
            .len();
        if len == 0 {
            return Err(VfsError::mapping_failed(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "file is empty"),
            ));
        }
        let len = usize::try_from(len).map_err(|_| {
            VfsError::mapping_failed(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "file exceeds address space"),
            )
        })?;

        let backing = Self::map_file(&file, len).map_err(|e| VfsError::mapping_failed(path, e))?;
        tracing::debug!(path = %path.display(), len, "mapped host file");

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            backing,
        }))
    }

    #[cfg(unix)]
    fn map_file(file: &std::fs::File, len: usize) -> io::Result<Backing> {
        host::HostMapping::new(file, len).map(Backing::Host)
    }

    #[cfg(not(unix))]
    fn map_file(file: &std::fs::File, len: usize) -> io::Result<Backing> {
        use std::io::Read;

        let mut bytes = Vec::with_capacity(len);
        let mut file = file;
        file.read_to_end(&mut bytes)?;
        Ok(Backing::Owned(bytes.into_boxed_slice()))
    }

    /// Wrap an in-memory image. `label` stands in for the host path in
    /// diagnostics.
    pub fn from_bytes(label: impl Into<PathBuf>, bytes: impl Into<Box<[u8]>>) -> Arc<Self> {
        Arc::new(Self {
            path: label.into(),
            backing: Backing::Owned(bytes.into()),
        })
    }

    /// Host path (or label) the region was created from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regions are always mapped read-only.
    pub fn mode(&self) -> Mode {
        Mode::Read
    }

    pub fn len(&self) -> u64 {
        self.backing.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.backing.as_slice().is_empty()
    }

    /// The whole mapping.
    pub fn as_slice(&self) -> &[u8] {
        self.backing.as_slice()
    }

    /// Borrow `[offset, offset + length)` after bounds checking.
    pub fn bytes(&self, offset: u64, length: u64) -> VfsResult<&[u8]> {
        let (start, end) = self.checked_range(offset, length)?;
        Ok(&self.as_slice()[start..end])
    }

    /// Create a live view over `[offset, offset + length)`.
    ///
    /// Bounds are validated before any address is formed; nothing is
    /// clamped.
    pub fn slice(self: &Arc<Self>, mode: Mode, offset: u64, length: u64) -> VfsResult<MappedView> {
        if mode != Mode::Read {
            return Err(VfsError::access_denied(format!(
                "{} is mapped read-only",
                self.path.display()
            )));
        }
        let (start, end) = self.checked_range(offset, length)?;
        Ok(MappedView {
            region: Arc::clone(self),
            mode,
            start,
            len: end - start,
        })
    }

    fn checked_range(&self, offset: u64, length: u64) -> VfsResult<(usize, usize)> {
        let end = offset.checked_add(length).ok_or_else(|| {
            VfsError::invalid_parameter(format!("range {offset}+{length} overflows"))
        })?;
        if end > self.len() {
            return Err(VfsError::invalid_parameter(format!(
                "range {offset}..{end} exceeds mapping of {} bytes",
                self.len()
            )));
        }
        // Both fit: end <= len, and len came from a usize.
        Ok((offset as usize, end as usize))
    }
}

/// A bounded, zero-copy view into a [`MappedRegion`].
///
/// Holds its own reference to the region, so it remains valid after the
/// device that produced it is unmounted.
#[derive(Clone)]
pub struct MappedView {
    region: Arc<MappedRegion>,
    mode: Mode,
    start: usize,
    len: usize,
}

impl fmt::Debug for MappedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedView")
            .field("region", &self.region.path)
            .field("mode", &self.mode)
            .field("start", &self.start)
            .field("len", &self.len)
            .finish()
    }
}

impl MappedView {
    pub fn as_slice(&self) -> &[u8] {
        &self.region.as_slice()[self.start..self.start + self.len]
    }

    /// Raw address of the first byte, for handing to guest memory code.
    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Offset of the view's first byte within the whole region.
    pub fn region_offset(&self) -> u64 {
        self.start as u64
    }

    pub fn region(&self) -> &Arc<MappedRegion> {
        &self.region
    }
}

impl Deref for MappedView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for MappedView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(unix)]
mod host {
    use std::ffi::c_void;
    use std::io;
    use std::ptr::{self, NonNull};

    use rustix::mm::{MapFlags, ProtFlags};

    /// Owner of one `mmap` call; unmaps on drop.
    pub(super) struct HostMapping {
        ptr: NonNull<u8>,
        len: usize,
    }

    // SAFETY: the mapping is PROT_READ and MAP_PRIVATE; no code path writes
    // through it, so sharing the pointer across threads only ever produces
    // concurrent reads.
    unsafe impl Send for HostMapping {}
    // SAFETY: see `Send`; `&HostMapping` only exposes `&[u8]`.
    unsafe impl Sync for HostMapping {}

    impl HostMapping {
        pub(super) fn new(file: &std::fs::File, len: usize) -> io::Result<Self> {
            // SAFETY: we request a fresh mapping (null hint) of `len` bytes of a
            // file opened for reading, at offset 0. The result is only accessed
            // through `as_slice` within `len`.
            let addr = unsafe {
                rustix::mm::mmap(
                    ptr::null_mut(),
                    len,
                    ProtFlags::READ,
                    MapFlags::PRIVATE,
                    file,
                    0,
                )
            }?;
            let ptr = NonNull::new(addr.cast::<u8>())
                .ok_or_else(|| io::Error::other("mmap returned a null address"))?;
            Ok(Self { ptr, len })
        }

        pub(super) fn as_slice(&self) -> &[u8] {
            // SAFETY: `ptr` points at `len` readable bytes for as long as `self`
            // is alive; the mapping is never written.
            unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
        }
    }

    impl Drop for HostMapping {
        fn drop(&mut self) {
            // SAFETY: `ptr`/`len` are exactly what `mmap` returned and no borrow
            // of the mapping can outlive `self`.
            let result =
                unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };
            if let Err(e) = result {
                tracing::warn!("munmap failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn region() -> Arc<MappedRegion> {
        MappedRegion::from_bytes("mem.iso", (0u8..=255).collect::<Vec<u8>>())
    }

    #[test]
    fn test_slice_is_zero_copy() {
        let region = region();
        let view = region.slice(Mode::Read, 16, 8).unwrap();
        assert_eq!(view.as_slice(), &[16, 17, 18, 19, 20, 21, 22, 23]);
        assert_eq!(view.as_ptr(), region.as_slice()[16..].as_ptr());
        assert_eq!(view.region_offset(), 16);
        assert_eq!(view.mode(), Mode::Read);
        assert_eq!(region.mode(), Mode::Read);
    }

    #[test]
    fn test_slice_bounds() {
        let region = region();
        assert!(region.slice(Mode::Read, 0, 256).is_ok());
        assert!(region.slice(Mode::Read, 256, 0).is_ok());
        assert!(matches!(
            region.slice(Mode::Read, 250, 7),
            Err(VfsError::InvalidParameter(_))
        ));
        assert!(matches!(
            region.slice(Mode::Read, u64::MAX, 2),
            Err(VfsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_read_write_view_denied() {
        let region = region();
        assert!(matches!(
            region.slice(Mode::ReadWrite, 0, 1),
            Err(VfsError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_view_outlives_region_handle() {
        let region = region();
        let view = region.slice(Mode::Read, 100, 4).unwrap();
        assert!(Arc::ptr_eq(view.region(), &region));
        drop(region);
        assert_eq!(&*view, &[100, 101, 102, 103]);
        assert_eq!(view.region().path(), Path::new("mem.iso"));
    }

    #[test]
    fn test_open_host_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"disc image bytes").unwrap();
        file.flush().unwrap();

        let region = MappedRegion::open(file.path()).unwrap();
        assert_eq!(region.len(), 16);
        assert_eq!(region.bytes(5, 5).unwrap(), b"image");
        assert_eq!(region.path(), file.path());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = MappedRegion::open(dir.path().join("missing.iso"));
        assert!(matches!(result, Err(VfsError::MappingFailed { .. })));
    }

    #[test]
    fn test_open_empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = MappedRegion::open(file.path());
        assert!(matches!(result, Err(VfsError::MappingFailed { .. })));
    }
}
