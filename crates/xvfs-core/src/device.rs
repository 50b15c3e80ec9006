//! Device contract.
//!
//! A device is one mounted backing store. It owns the entry tree for its
//! mount point and resolves device-relative paths within it.

use std::fmt;
use std::fmt::Write as _;

use crate::entry::{Entry, EntryId};
use crate::error::VfsResult;
use crate::types::VolumeInfo;

pub trait Device: Send + Sync + fmt::Debug {
    /// Guest mount point, e.g. `\Device\Cdrom0`.
    fn mount_path(&self) -> &str;

    /// Device type name, for diagnostics.
    fn name(&self) -> &'static str;

    fn is_read_only(&self) -> bool;

    fn root(&self) -> Box<dyn Entry + '_>;

    /// Look up an entry by id. `None` for ids from another device.
    fn entry(&self, id: EntryId) -> Option<Box<dyn Entry + '_>>;

    /// Number of entries, root included.
    fn entry_count(&self) -> usize;

    /// Resolve a path relative to the mount point.
    ///
    /// Components are matched ignoring ASCII case; the first component
    /// without a matching child fails with `NotFound`.
    fn resolve_path(&self, path: &str) -> VfsResult<Box<dyn Entry + '_>>;

    fn volume_info(&self) -> VolumeInfo;

    /// Indented listing of the whole tree.
    fn dump(&self) -> String {
        fn walk(entry: &dyn Entry, depth: usize, out: &mut String) {
            for child in entry.children() {
                let suffix = if child.kind().is_dir() { "\\" } else { "" };
                let _ = writeln!(
                    out,
                    "{:indent$}{}{} ({} bytes)",
                    "",
                    child.name(),
                    suffix,
                    child.info().size,
                    indent = depth * 2
                );
                walk(child.as_ref(), depth + 1, out);
            }
        }

        let mut out = String::new();
        let _ = writeln!(out, "{} [{}]", self.mount_path(), self.name());
        walk(self.root().as_ref(), 1, &mut out);
        out
    }
}
