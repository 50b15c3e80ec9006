//! Device registry with longest-prefix routing.
//!
//! Routes guest paths to the device mounted at their longest matching
//! mount point, after rewriting any symbolic link prefix.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use xvfs_kernel::{FileAccess, FileHandle, KernelState, XResult};

use crate::device::Device;
use crate::entry::{Entry, EntryId};
use crate::error::{VfsError, VfsResult};
use crate::mapped::{MappedView, Mode};
use crate::path;
use crate::types::MountInfo;

/// The result of resolving a guest path: the owning device and the entry's
/// id within it.
///
/// Holds its own reference to the device, so it stays usable after the
/// device is unregistered.
#[derive(Clone)]
pub struct ResolvedEntry {
    device: Arc<dyn Device>,
    id: EntryId,
}

impl ResolvedEntry {
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Borrow the entry itself.
    pub fn entry(&self) -> Box<dyn Entry + '_> {
        self.device
            .entry(self.id)
            .expect("resolved ids belong to their device")
    }
}

impl PartialEq for ResolvedEntry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.device, &other.device) && self.id == other.id
    }
}

impl Eq for ResolvedEntry {}

impl fmt::Debug for ResolvedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEntry")
            .field("mount_path", &self.device.mount_path())
            .field("id", &self.id)
            .finish()
    }
}

struct Mount {
    mount_path: String,
    device: Arc<dyn Device>,
}

struct SymbolicLink {
    path: String,
    target: String,
}

/// Registry of mounted devices and symbolic links.
///
/// Mount points are matched by longest prefix on a component boundary,
/// ignoring ASCII case. If `\Device` and `\Device\Cdrom0` are both
/// mounted, `\Device\Cdrom0\default.xex` is routed to `\Device\Cdrom0`.
pub struct VirtualFileSystem {
    /// Mounted devices, keyed by lowercased canonical mount path.
    devices: RwLock<BTreeMap<String, Mount>>,
    /// Symbolic links, keyed by lowercased canonical link path.
    symlinks: RwLock<BTreeMap<String, SymbolicLink>>,
}

impl fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("devices", &self.devices.read().len())
            .field("symlinks", &self.symlinks.read().len())
            .finish()
    }
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn key(path: &str) -> String {
    path::canonicalize(path).to_ascii_lowercase()
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            symlinks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a device at its own mount path.
    ///
    /// Fails with `AlreadyMounted` if the mount point is taken; the
    /// existing device stays in place.
    pub fn register_device(&self, device: Arc<dyn Device>) -> VfsResult<()> {
        let mount_path = path::canonicalize(device.mount_path());
        let mut devices = self.devices.write();
        let key = mount_path.to_ascii_lowercase();
        if devices.contains_key(&key) {
            tracing::warn!(%mount_path, "mount point already in use");
            return Err(VfsError::AlreadyMounted(mount_path));
        }
        tracing::info!(
            %mount_path,
            device = device.name(),
            entries = device.entry_count(),
            "device registered"
        );
        devices.insert(key, Mount { mount_path, device });
        Ok(())
    }

    /// Remove the device at `mount_path` and hand it back.
    ///
    /// Entries, handles and views obtained earlier keep working.
    pub fn unregister_device(&self, mount_path: &str) -> VfsResult<Arc<dyn Device>> {
        let removed = self.devices.write().remove(&key(mount_path));
        match removed {
            Some(mount) => {
                tracing::info!(mount_path = %mount.mount_path, "device unregistered");
                Ok(mount.device)
            }
            None => Err(VfsError::NotMounted(mount_path.to_string())),
        }
    }

    /// Alias `path` (e.g. `game:`) to `target` (e.g. `\Device\Cdrom0`).
    ///
    /// Re-registering a link replaces its target.
    pub fn register_symbolic_link(&self, path: &str, target: &str) {
        let link = SymbolicLink {
            path: path::canonicalize(path),
            target: path::canonicalize(target),
        };
        tracing::debug!(path = %link.path, target = %link.target, "symbolic link registered");
        self.symlinks.write().insert(key(path), link);
    }

    pub fn unregister_symbolic_link(&self, path: &str) -> VfsResult<()> {
        match self.symlinks.write().remove(&key(path)) {
            Some(_) => Ok(()),
            None => Err(VfsError::not_found(path)),
        }
    }

    /// The device mounted exactly at `mount_path`.
    pub fn find_device(&self, mount_path: &str) -> Option<Arc<dyn Device>> {
        self.devices
            .read()
            .get(&key(mount_path))
            .map(|m| Arc::clone(&m.device))
    }

    /// List all current mounts, ordered by mount path.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.devices
            .read()
            .values()
            .map(|m| MountInfo {
                mount_path: m.mount_path.clone(),
                device_name: m.device.name(),
                read_only: m.device.is_read_only(),
                entry_count: m.device.entry_count(),
            })
            .collect()
    }

    /// Rewrite a leading symbolic link, if any.
    fn expand_symlinks(&self, path: &str) -> String {
        let symlinks = self.symlinks.read();
        let best = symlinks
            .values()
            .filter_map(|link| {
                path::strip_prefix_ignore_case(path, &link.path).map(|rest| (link, rest))
            })
            .max_by_key(|(link, _)| link.path.len());
        match best {
            Some((link, rest)) if rest.is_empty() => link.target.clone(),
            Some((link, rest)) => path::join(&link.target, rest),
            None => path.to_string(),
        }
    }

    /// Find the device for `path` and the path relative to it.
    fn find_mount(&self, path: &str) -> VfsResult<(Arc<dyn Device>, String)> {
        let devices = self.devices.read();

        // Keep the longest match.
        let best = devices
            .values()
            .filter_map(|m| {
                path::strip_prefix_ignore_case(path, &m.mount_path).map(|rest| (m, rest))
            })
            .max_by_key(|(m, _)| m.mount_path.len());

        match best {
            Some((mount, rest)) => Ok((Arc::clone(&mount.device), rest.to_string())),
            None => Err(VfsError::not_found(path)),
        }
    }

    /// Resolve an absolute guest path to an entry.
    ///
    /// Fails with `NotFound` when no mount point matches or the device has
    /// no entry at the remaining path.
    pub fn resolve_path(&self, path: &str) -> VfsResult<ResolvedEntry> {
        let expanded = self.expand_symlinks(&path::canonicalize(path));
        let (device, relative) = self.find_mount(&expanded)?;
        let id = device.resolve_path(&relative)?.id();
        tracing::trace!(path, %expanded, ?id, "resolved");
        Ok(ResolvedEntry { device, id })
    }

    /// Resolve and open `path` in one step.
    pub fn open_path(
        &self,
        path: &str,
        kernel_state: &KernelState,
        desired_access: FileAccess,
    ) -> XResult<FileHandle> {
        let resolved = self.resolve_path(path)?;
        resolved.entry().open(kernel_state, desired_access)
    }

    /// Resolve `path` and map `[offset, offset + length)` of it.
    pub fn open_mapped_path(
        &self,
        path: &str,
        mode: Mode,
        offset: u64,
        length: u64,
    ) -> VfsResult<MappedView> {
        let resolved = self.resolve_path(path)?;
        resolved.entry().open_mapped(mode, offset, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::disc_image::builder::GdfxImageBuilder;
    use crate::devices::DiscImageDevice;
    use crate::mapped::MappedRegion;
    use xvfs_kernel::XStatus;

    fn disc(mount_path: &str, files: &[(&str, &str)]) -> Arc<dyn Device> {
        let mut builder = GdfxImageBuilder::new();
        for (path, data) in files {
            builder = builder.file(path, data.as_bytes());
        }
        let region = MappedRegion::from_bytes("test.iso", builder.build());
        Arc::new(DiscImageDevice::from_region(mount_path, region).unwrap())
    }

    fn read(vfs: &VirtualFileSystem, path: &str) -> Vec<u8> {
        let kernel = KernelState::default();
        vfs.open_path(path, &kernel, FileAccess::read())
            .unwrap()
            .read_to_vec()
            .unwrap()
    }

    #[test]
    fn test_basic_mount() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("test.txt", "hello")]))
            .unwrap();

        assert_eq!(read(&vfs, "\\Device\\Cdrom0\\test.txt"), b"hello");
    }

    #[test]
    fn test_multiple_mounts() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("a.txt", "cdrom")]))
            .unwrap();
        vfs.register_device(disc("\\Device\\Harddisk0", &[("b.txt", "hdd")]))
            .unwrap();

        assert_eq!(read(&vfs, "\\Device\\Cdrom0\\a.txt"), b"cdrom");
        assert_eq!(read(&vfs, "\\Device\\Harddisk0\\b.txt"), b"hdd");
    }

    #[test]
    fn test_nested_mount() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device", &[("outer.txt", "outer")]))
            .unwrap();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("inner.txt", "inner")]))
            .unwrap();

        assert_eq!(read(&vfs, "\\Device\\outer.txt"), b"outer");
        assert_eq!(read(&vfs, "\\Device\\Cdrom0\\inner.txt"), b"inner");
    }

    #[test]
    fn test_prefix_must_end_on_component_boundary() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom", &[("a.txt", "a")]))
            .unwrap();

        assert!(matches!(
            vfs.resolve_path("\\Device\\Cdrom0\\a.txt"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_case_and_separator_insensitive() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("Media\\Intro.bik", "bik")]))
            .unwrap();

        let a = vfs.resolve_path("\\Device\\Cdrom0\\Media\\Intro.bik").unwrap();
        let b = vfs.resolve_path("/device/CDROM0/media/intro.BIK").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.entry().name(), "Intro.bik");
    }

    #[test]
    fn test_resolve_mount_root() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("a.txt", "a")]))
            .unwrap();

        let root = vfs.resolve_path("\\Device\\Cdrom0").unwrap();
        assert_eq!(root.id(), EntryId::ROOT);
        assert!(root.entry().kind().is_dir());
        assert_eq!(root.entry().absolute_path(), "\\Device\\Cdrom0");
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let vfs = VirtualFileSystem::new();
        let first = disc("\\Device\\Cdrom0", &[("first.txt", "1")]);
        vfs.register_device(Arc::clone(&first)).unwrap();

        let result = vfs.register_device(disc("\\DEVICE\\CDROM0", &[("second.txt", "2")]));
        assert!(matches!(result, Err(VfsError::AlreadyMounted(_))));

        let found = vfs.find_device("\\Device\\Cdrom0").unwrap();
        assert!(Arc::ptr_eq(&found, &first));
        assert!(vfs.resolve_path("\\Device\\Cdrom0\\first.txt").is_ok());
    }

    #[test]
    fn test_unmount() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("test.txt", "data")]))
            .unwrap();
        let resolved = vfs.resolve_path("\\Device\\Cdrom0\\test.txt").unwrap();

        let device = vfs.unregister_device("\\device\\cdrom0").unwrap();
        assert_eq!(device.mount_path(), "\\Device\\Cdrom0");

        assert!(vfs.resolve_path("\\Device\\Cdrom0\\test.txt").is_err());
        assert_eq!(resolved.entry().name(), "test.txt");
        assert!(matches!(
            vfs.unregister_device("\\Device\\Cdrom0"),
            Err(VfsError::NotMounted(_))
        ));
    }

    #[test]
    fn test_list_mounts() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Harddisk0", &[])).unwrap();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("a", "a")]))
            .unwrap();

        let mounts = vfs.list_mounts();
        let paths: Vec<_> = mounts.iter().map(|m| m.mount_path.as_str()).collect();
        assert_eq!(paths, vec!["\\Device\\Cdrom0", "\\Device\\Harddisk0"]);
        assert!(mounts.iter().all(|m| m.read_only));
        assert_eq!(mounts[0].device_name, "DiscImageDevice");
        assert_eq!(mounts[0].entry_count, 2);
    }

    #[test]
    fn test_no_mount_error() {
        let vfs = VirtualFileSystem::new();
        assert!(matches!(
            vfs.resolve_path("\\nothing\\here.txt"),
            Err(VfsError::NotFound(_))
        ));
        let kernel = KernelState::default();
        assert_eq!(
            vfs.open_path("\\nothing\\here.txt", &kernel, FileAccess::read())
                .unwrap_err(),
            XStatus::NotFound
        );
    }

    #[test]
    fn test_symbolic_links() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("default.xex", "xex")]))
            .unwrap();
        vfs.register_symbolic_link("game:", "\\Device\\Cdrom0");
        vfs.register_symbolic_link("d:", "\\Device\\Cdrom0");

        let direct = vfs.resolve_path("\\Device\\Cdrom0\\default.xex").unwrap();
        assert_eq!(vfs.resolve_path("game:\\default.xex").unwrap(), direct);
        assert_eq!(vfs.resolve_path("GAME:/DEFAULT.XEX").unwrap(), direct);
        assert_eq!(vfs.resolve_path("d:\\default.xex").unwrap(), direct);
        assert_eq!(vfs.resolve_path("game:").unwrap().id(), EntryId::ROOT);

        vfs.unregister_symbolic_link("game:").unwrap();
        assert!(vfs.resolve_path("game:\\default.xex").is_err());
        assert!(vfs.unregister_symbolic_link("game:").is_err());
    }

    #[test]
    fn test_write_through_registry_denied() {
        let vfs = VirtualFileSystem::new();
        vfs.register_device(disc("\\Device\\Cdrom0", &[("save.dat", "save")]))
            .unwrap();
        let kernel = KernelState::default();

        assert_eq!(
            vfs.open_path("\\Device\\Cdrom0\\save.dat", &kernel, FileAccess::GENERIC_WRITE)
                .unwrap_err(),
            XStatus::AccessDenied
        );
        assert!(matches!(
            vfs.open_mapped_path("\\Device\\Cdrom0\\save.dat", Mode::ReadWrite, 0, 4),
            Err(VfsError::AccessDenied(_))
        ));
        assert_eq!(kernel.handle_count(), 0);
    }
}
