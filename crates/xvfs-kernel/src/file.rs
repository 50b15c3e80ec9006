//! Kernel file objects.
//!
//! An `XFile` is what a guest handle points at after a successful open.
//! The I/O surface is deliberately positional: every read names its own
//! offset, so concurrent guest threads never share a cursor.

use std::fmt;
use std::sync::Arc;

use crate::access::{FileAccess, FileAttributes};
use crate::status::XResult;

/// Reference-counted kernel object.
pub type ObjectRef<T> = Arc<T>;

/// Guest-visible handle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XHandle(pub u32);

impl XHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for XHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// An open file as seen by guest I/O syscalls.
pub trait XFile: Send + Sync + fmt::Debug {
    /// Final path component.
    fn name(&self) -> &str;

    /// Absolute guest path the file was opened through.
    fn path(&self) -> &str;

    /// Access mask granted at open time.
    fn granted_access(&self) -> FileAccess;

    fn attributes(&self) -> FileAttributes;

    /// Length in bytes.
    fn length(&self) -> u64;

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes copied; zero once `offset` reaches
    /// the end of the file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> XResult<usize>;

    fn is_directory(&self) -> bool {
        self.attributes().is_directory()
    }
}

/// Result of a successful open: the registered handle and its object.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub handle: XHandle,
    pub file: ObjectRef<dyn XFile>,
}

impl FileHandle {
    /// Read the whole file into a fresh buffer.
    pub fn read_to_vec(&self) -> XResult<Vec<u8>> {
        let mut buf = vec![0u8; self.file.length() as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read_at(filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}
