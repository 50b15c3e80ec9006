//! Kernel state: the guest handle table.
//!
//! Every file the VFS opens is registered here so subsequent guest
//! syscalls can find it by handle. The table holds one strong reference
//! per handle; closing the handle drops it, and the object itself lives
//! on for as long as any other `ObjectRef` does.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::file::{FileHandle, ObjectRef, XFile, XHandle};
use crate::status::{XResult, XStatus};

/// First handle value handed out. Guest code treats handles as opaque,
/// but titles are known to assert on the high bits.
pub const HANDLE_BASE: u32 = 0xF800_0000;

/// Distance between consecutive handle values.
const HANDLE_STRIDE: u32 = 4;

#[derive(Debug)]
struct ObjectTable {
    objects: BTreeMap<XHandle, ObjectRef<dyn XFile>>,
    /// Next slot index to try.
    next_slot: u32,
}

impl ObjectTable {
    fn slot_count() -> u32 {
        (u32::MAX - HANDLE_BASE) / HANDLE_STRIDE
    }

    fn handle_for(slot: u32) -> XHandle {
        XHandle(HANDLE_BASE + (slot + 1) * HANDLE_STRIDE)
    }

    fn allocate(&mut self) -> XResult<XHandle> {
        let slots = Self::slot_count();
        for probe in 0..slots {
            let slot = (self.next_slot + probe) % slots;
            let handle = Self::handle_for(slot);
            if !self.objects.contains_key(&handle) {
                self.next_slot = (slot + 1) % slots;
                return Ok(handle);
            }
        }
        Err(XStatus::InvalidParameter)
    }
}

/// Kernel state container.
///
/// Only the handle table lives here; the rest of the guest kernel is out
/// of scope for the filesystem.
#[derive(Debug)]
pub struct KernelState {
    /// Human-readable name, used in log output.
    pub name: String,
    objects: Mutex<ObjectTable>,
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new("kernel")
    }
}

impl KernelState {
    /// Create a new kernel state with an empty handle table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Mutex::new(ObjectTable {
                objects: BTreeMap::new(),
                next_slot: 0,
            }),
        }
    }

    // ========================================================================
    // Handle table
    // ========================================================================

    /// Register an open file and return the guest handle for it.
    pub fn register_file(&self, file: ObjectRef<dyn XFile>) -> XResult<FileHandle> {
        let mut table = self.objects.lock();
        let handle = table.allocate()?;
        table.objects.insert(handle, ObjectRef::clone(&file));
        tracing::trace!(kernel = %self.name, %handle, path = file.path(), "handle registered");
        Ok(FileHandle { handle, file })
    }

    /// Look up the file behind a handle.
    pub fn lookup_file(&self, handle: XHandle) -> Option<ObjectRef<dyn XFile>> {
        self.objects.lock().objects.get(&handle).cloned()
    }

    /// Close a handle, dropping the table's reference.
    pub fn release_handle(&self, handle: XHandle) -> XResult<()> {
        let removed = self.objects.lock().objects.remove(&handle);
        match removed {
            Some(file) => {
                tracing::trace!(
                    kernel = %self.name,
                    %handle,
                    path = file.path(),
                    "handle released"
                );
                Ok(())
            }
            None => Err(XStatus::InvalidParameter),
        }
    }

    /// Number of handles currently open.
    pub fn handle_count(&self) -> usize {
        self.objects.lock().objects.len()
    }
}
