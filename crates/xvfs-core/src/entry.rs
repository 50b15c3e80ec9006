//! Entries and the trees that own them.
//!
//! A device owns exactly one [`EntryTree`]: an arena of nodes addressed by
//! [`EntryId`]. Parents own their children through the arena; the
//! backlinks (parent, device) are plain ids and borrows, never a second
//! owner. Trees are assembled once by a [`TreeBuilder`] while a device
//! mounts and are immutable afterwards, so traversal needs no locking.
//!
//! Backends expose their nodes to callers as [`Entry`] trait objects: a
//! borrowed view of one node plus whatever capabilities the backend
//! supports.

use std::fmt;

use xvfs_kernel::{FileAccess, FileAttributes, FileHandle, KernelState, XResult};

use crate::device::Device;
use crate::error::{VfsError, VfsResult};
use crate::mapped::{MappedView, Mode};
use crate::path;
use crate::types::{EntryInfo, EntryKind};

/// Index of a node within its device's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    /// Every tree's root.
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node of a device's filesystem tree.
///
/// Implementations are cheap borrowed views; two views with the same
/// [`Entry::id`] on the same device are the same entry.
pub trait Entry: Send + Sync + fmt::Debug {
    fn id(&self) -> EntryId;

    /// The device owning this entry.
    fn device(&self) -> &dyn Device;

    fn info(&self) -> &EntryInfo;

    /// The parent entry, `None` for the device root.
    fn parent(&self) -> Option<Box<dyn Entry + '_>>;

    /// Children in tree order.
    fn children(&self) -> Vec<Box<dyn Entry + '_>>;

    /// Open the entry for guest I/O and register the handle with
    /// `kernel_state`.
    fn open(&self, kernel_state: &KernelState, desired_access: FileAccess)
    -> XResult<FileHandle>;

    /// Whether [`Entry::open_mapped`] is supported.
    fn can_map(&self) -> bool {
        false
    }

    /// Map `[offset, offset + length)` of the entry's data directly.
    ///
    /// Only valid when [`Entry::can_map`] returns true.
    fn open_mapped(&self, mode: Mode, offset: u64, length: u64) -> VfsResult<MappedView> {
        let _ = (mode, offset, length);
        Err(VfsError::MappingUnsupported(self.absolute_path()))
    }

    /// Entry name (not full path). Empty for the root.
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Path relative to the device root.
    fn path(&self) -> &str {
        &self.info().path
    }

    /// Guest path including the device's mount point.
    fn absolute_path(&self) -> String {
        if self.path().is_empty() {
            self.device().mount_path().to_string()
        } else {
            path::join(self.device().mount_path(), self.path())
        }
    }

    fn kind(&self) -> EntryKind {
        self.info().kind
    }

    fn attributes(&self) -> FileAttributes {
        self.info().attributes
    }

    /// Direct child by name, ignoring ASCII case.
    fn child(&self, name: &str) -> Option<Box<dyn Entry + '_>> {
        self.children()
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Children whose names match a guest wildcard pattern, in tree order.
    fn matching_children(&self, pattern: &str) -> Vec<Box<dyn Entry + '_>> {
        self.children()
            .into_iter()
            .filter(|c| path::wildcard_match(pattern, c.name()))
            .collect()
    }
}

/// Metadata for a node being added by a [`TreeBuilder`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub kind: EntryKind,
    pub attributes: FileAttributes,
    pub size: u64,
    pub allocation_size: u64,
}

#[derive(Debug)]
struct Node<T> {
    info: EntryInfo,
    parent: Option<EntryId>,
    children: Vec<EntryId>,
    payload: T,
}

/// Arena-owned entry tree with backend payload `T` per node.
#[derive(Debug)]
pub struct EntryTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> EntryTree<T> {
    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true; a tree always has its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn info(&self, id: EntryId) -> Option<&EntryInfo> {
        self.nodes.get(id.index()).map(|n| &n.info)
    }

    pub fn payload(&self, id: EntryId) -> Option<&T> {
        self.nodes.get(id.index()).map(|n| &n.payload)
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    pub fn children(&self, id: EntryId) -> &[EntryId] {
        self.nodes
            .get(id.index())
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Direct child of `id` named `name`, ignoring ASCII case.
    pub fn child(&self, id: EntryId, name: &str) -> Option<EntryId> {
        self.children(id).iter().copied().find(|&child| {
            self.nodes[child.index()]
                .info
                .name
                .eq_ignore_ascii_case(name)
        })
    }

    /// Walk `path` from the root, one component at a time.
    ///
    /// Fails with `NotFound` at the first component with no matching
    /// child. The empty path is the root.
    pub fn resolve(&self, path: &str) -> VfsResult<EntryId> {
        let mut current = self.root();
        for component in path::components(path) {
            current = self
                .child(current, component)
                .ok_or_else(|| VfsError::not_found(path))?;
        }
        Ok(current)
    }

    /// All ids in creation order (parents before children).
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        (0..self.nodes.len()).map(|i| EntryId(i as u32))
    }
}

/// Mount-time constructor for an [`EntryTree`].
///
/// The only way nodes come into existence. Validates the structural
/// invariants (acyclic, unique sibling names) as nodes are added.
#[derive(Debug)]
pub(crate) struct TreeBuilder<T> {
    nodes: Vec<Node<T>>,
}

impl<T> TreeBuilder<T> {
    /// Start a tree whose root is a directory with the given metadata.
    pub(crate) fn new(attributes: FileAttributes, size: u64, payload: T) -> Self {
        let root = Node {
            info: EntryInfo {
                name: String::new(),
                path: String::new(),
                kind: EntryKind::Directory,
                attributes: attributes | FileAttributes::DIRECTORY,
                size,
                allocation_size: size,
            },
            parent: None,
            children: Vec::new(),
            payload,
        };
        Self { nodes: vec![root] }
    }

    /// Append a child under `parent`.
    pub(crate) fn add_child(
        &mut self,
        parent: EntryId,
        spec: NodeSpec,
        payload: T,
    ) -> VfsResult<EntryId> {
        let parent_node = self.nodes.get(parent.index()).ok_or_else(|| {
            VfsError::invalid_parameter(format!("parent entry {} does not exist", parent.0))
        })?;
        if !parent_node.info.kind.is_dir() {
            return Err(VfsError::not_a_directory(parent_node.info.path.clone()));
        }
        if spec.name.is_empty()
            || spec.name.contains(['\\', '/'])
            || spec.name == "."
            || spec.name == ".."
        {
            return Err(VfsError::invalid_parameter(format!(
                "invalid entry name {:?} under {:?}",
                spec.name, parent_node.info.path
            )));
        }
        let duplicate = parent_node.children.iter().any(|c| {
            self.nodes[c.index()]
                .info
                .name
                .eq_ignore_ascii_case(&spec.name)
        });
        if duplicate {
            return Err(VfsError::invalid_parameter(format!(
                "duplicate entry name {:?} under {:?}",
                spec.name, parent_node.info.path
            )));
        }
        let id = u32::try_from(self.nodes.len())
            .map(EntryId)
            .map_err(|_| VfsError::invalid_parameter("too many entries"))?;

        let path = path::join(&parent_node.info.path, &spec.name);
        let attributes = match spec.kind {
            EntryKind::Directory => spec.attributes | FileAttributes::DIRECTORY,
            EntryKind::File => spec.attributes - FileAttributes::DIRECTORY,
        };
        self.nodes.push(Node {
            info: EntryInfo {
                name: spec.name,
                path,
                kind: spec.kind,
                attributes,
                size: spec.size,
                allocation_size: spec.allocation_size,
            },
            parent: Some(parent),
            children: Vec::new(),
            payload,
        });
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn finish(self) -> EntryTree<T> {
        EntryTree { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            kind: EntryKind::Directory,
            attributes: FileAttributes::READ_ONLY,
            size: 0,
            allocation_size: 0,
        }
    }

    fn file(name: &str, size: u64) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            kind: EntryKind::File,
            attributes: FileAttributes::READ_ONLY,
            size,
            allocation_size: size,
        }
    }

    fn sample() -> EntryTree<u32> {
        let mut builder = TreeBuilder::new(FileAttributes::READ_ONLY, 0, 0);
        let media = builder.add_child(EntryId::ROOT, dir("media"), 1).unwrap();
        builder.add_child(media, file("Intro.bik", 10), 2).unwrap();
        builder.add_child(EntryId::ROOT, file("default.xex", 20), 3).unwrap();
        builder.finish()
    }

    #[test]
    fn test_paths_and_backlinks() {
        let tree = sample();
        let intro = tree.resolve("media\\Intro.bik").unwrap();
        assert_eq!(tree.info(intro).unwrap().path, "media\\Intro.bik");
        assert_eq!(tree.payload(intro), Some(&2));

        let media = tree.parent(intro).unwrap();
        assert_eq!(tree.info(media).unwrap().name, "media");
        assert_eq!(tree.parent(media), Some(EntryId::ROOT));
        assert_eq!(tree.parent(EntryId::ROOT), None);

        assert_eq!(tree.len(), 4);
        assert!(tree.contains(intro));
        assert!(!tree.contains(EntryId(4)));
        assert_eq!(tree.info(EntryId(4)), None);
    }

    #[test]
    fn test_resolve_ignores_case_and_separators() {
        let tree = sample();
        let a = tree.resolve("MEDIA/intro.BIK").unwrap();
        let b = tree.resolve("\\media\\Intro.bik").unwrap();
        assert_eq!(a, b);
        assert_eq!(tree.resolve("").unwrap(), EntryId::ROOT);
    }

    #[test]
    fn test_resolve_not_found() {
        let tree = sample();
        assert!(matches!(
            tree.resolve("media\\missing.bik"),
            Err(VfsError::NotFound(_))
        ));
        // Files have no children.
        assert!(matches!(
            tree.resolve("default.xex\\x"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let mut builder = TreeBuilder::new(FileAttributes::READ_ONLY, 0, ());
        builder.add_child(EntryId::ROOT, file("a.bin", 1), ()).unwrap();
        let err = builder
            .add_child(EntryId::ROOT, file("A.BIN", 1), ())
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter(_)));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_child_of_file_rejected() {
        let mut builder = TreeBuilder::new(FileAttributes::READ_ONLY, 0, ());
        let f = builder.add_child(EntryId::ROOT, file("a.bin", 1), ()).unwrap();
        assert!(matches!(
            builder.add_child(f, file("b.bin", 1), ()),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_bad_names_rejected() {
        let mut builder = TreeBuilder::new(FileAttributes::READ_ONLY, 0, ());
        for name in ["", "a\\b", "..", "."] {
            assert!(builder.add_child(EntryId::ROOT, file(name, 0), ()).is_err());
        }
    }

    #[test]
    fn test_directory_attribute_follows_kind() {
        let tree = sample();
        let media = tree.resolve("media").unwrap();
        assert!(tree.info(media).unwrap().attributes.is_directory());
        let xex = tree.resolve("default.xex").unwrap();
        assert!(!tree.info(xex).unwrap().attributes.is_directory());
        assert_eq!(tree.ids().count(), 4);
    }
}
