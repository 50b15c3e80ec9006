//! # xvfs-kernel
//!
//! The slice of the guest kernel the virtual filesystem talks to:
//! - [`XStatus`] - the closed set of status codes returned to the guest
//! - [`FileAccess`] / [`FileAttributes`] - NT access masks and attributes
//! - [`XFile`] - the object behind a guest file handle
//! - [`KernelState`] - the handle table open files are registered in
//! - [`debug::Module`] - the debugger's mirror of module records

pub mod access;
pub mod debug;
pub mod file;
pub mod state;
pub mod status;

pub use access::{FileAccess, FileAttributes};
pub use debug::{MODULE_LIST_ENTRY_SIZE, Module, ModuleListEntry, SnapshotError};
pub use file::{FileHandle, ObjectRef, XFile, XHandle};
pub use state::KernelState;
pub use status::{XResult, XStatus};
