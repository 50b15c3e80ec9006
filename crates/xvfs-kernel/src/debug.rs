//! Debugger-side mirror of loaded module metadata.
//!
//! The debugger receives fixed-layout module records from the running
//! emulator and keeps a local copy per module. The copy is always a full
//! replacement of the record; fields are never merged.

use thiserror::Error;

/// Size of one module list record in bytes.
pub const MODULE_LIST_ENTRY_SIZE: usize = 304;

const HANDLE_OFFSET: usize = 0;
const PTR_OFFSET: usize = 4;
const IS_KERNEL_OFFSET: usize = 8;
const NAME_OFFSET: usize = 12;
const NAME_LEN: usize = 32;
const PATH_OFFSET: usize = NAME_OFFSET + NAME_LEN;
const PATH_LEN: usize = 260;

const _: () = assert!(PATH_OFFSET + PATH_LEN == MODULE_LIST_ENTRY_SIZE);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("module record must be {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// One module list record, stored in its wire layout.
///
/// ```text
/// +0    u32        module_handle
/// +4    u32        module_ptr
/// +8    u8         is_kernel_module   (+3 padding)
/// +12   [u8; 32]   name   (NUL padded)
/// +44   [u8; 260]  path   (NUL padded)
/// ```
///
/// All integers are little endian.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ModuleListEntry {
    bytes: [u8; MODULE_LIST_ENTRY_SIZE],
}

impl Default for ModuleListEntry {
    fn default() -> Self {
        Self {
            bytes: [0; MODULE_LIST_ENTRY_SIZE],
        }
    }
}

impl std::fmt::Debug for ModuleListEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleListEntry")
            .field("module_handle", &self.module_handle())
            .field("module_ptr", &self.module_ptr())
            .field("is_kernel_module", &self.is_kernel_module())
            .field("name", &self.name())
            .field("path", &self.path())
            .finish()
    }
}

impl ModuleListEntry {
    /// Build a record from its fields. Strings longer than their slot are
    /// truncated.
    pub fn new(
        module_handle: u32,
        module_ptr: u32,
        is_kernel_module: bool,
        name: &str,
        path: &str,
    ) -> Self {
        let mut bytes = [0u8; MODULE_LIST_ENTRY_SIZE];
        bytes[HANDLE_OFFSET..HANDLE_OFFSET + 4].copy_from_slice(&module_handle.to_le_bytes());
        bytes[PTR_OFFSET..PTR_OFFSET + 4].copy_from_slice(&module_ptr.to_le_bytes());
        bytes[IS_KERNEL_OFFSET] = is_kernel_module as u8;
        write_fixed(&mut bytes[NAME_OFFSET..NAME_OFFSET + NAME_LEN], name);
        write_fixed(&mut bytes[PATH_OFFSET..PATH_OFFSET + PATH_LEN], path);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; MODULE_LIST_ENTRY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MODULE_LIST_ENTRY_SIZE] {
        &self.bytes
    }

    pub fn module_handle(&self) -> u32 {
        read_u32(&self.bytes, HANDLE_OFFSET)
    }

    pub fn module_ptr(&self) -> u32 {
        read_u32(&self.bytes, PTR_OFFSET)
    }

    pub fn is_kernel_module(&self) -> bool {
        self.bytes[IS_KERNEL_OFFSET] != 0
    }

    pub fn name(&self) -> String {
        read_fixed(&self.bytes[NAME_OFFSET..NAME_OFFSET + NAME_LEN])
    }

    pub fn path(&self) -> String {
        read_fixed(&self.bytes[PATH_OFFSET..PATH_OFFSET + PATH_LEN])
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn write_fixed(slot: &mut [u8], value: &str) {
    let n = value.len().min(slot.len());
    slot[..n].copy_from_slice(&value.as_bytes()[..n]);
}

fn read_fixed(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

/// Debugger model of one loaded module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    entry: ModuleListEntry,
}

impl Module {
    pub fn new(entry: ModuleListEntry) -> Self {
        Self { entry }
    }

    pub fn entry(&self) -> &ModuleListEntry {
        &self.entry
    }

    /// Replace the local record with `entry`, whole.
    pub fn update(&mut self, entry: &ModuleListEntry) {
        self.entry = *entry;
    }

    /// Replace the local record from raw bytes.
    ///
    /// The slice must be exactly one record long; on mismatch the local
    /// record is left as it was.
    pub fn update_from_bytes(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let bytes: [u8; MODULE_LIST_ENTRY_SIZE] =
            bytes.try_into().map_err(|_| SnapshotError::SizeMismatch {
                expected: MODULE_LIST_ENTRY_SIZE,
                actual: bytes.len(),
            })?;
        self.entry = ModuleListEntry::from_bytes(bytes);
        Ok(())
    }
}
