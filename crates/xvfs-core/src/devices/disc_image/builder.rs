//! Synthetic GDFX image builder for tests.
//!
//! Lays out a volume descriptor, balanced directory tables and file data
//! the way mastering tools do: tables padded to whole sectors with `0xFF`,
//! children sorted ignoring case.

use std::collections::BTreeMap;

use super::gdfx::{ATTRIBUTE_DIRECTORY, HEADER_SECTOR, MAGIC, RECORD_HEADER_LEN, SECTOR_SIZE};
use crate::path;

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, sector: Option<u32> },
    Dir(BTreeMap<String, Node>),
}

/// Builds in-memory disc images.
#[derive(Debug, Clone)]
pub struct GdfxImageBuilder {
    partition_offset: u64,
    root: BTreeMap<String, Node>,
}

impl Default for GdfxImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Layout {
    next_sector: u64,
    writes: Vec<(u64, Vec<u8>)>,
}

impl Layout {
    fn take(&mut self, len: u64) -> u32 {
        if len == 0 {
            return 0;
        }
        let sector = self.next_sector;
        self.next_sector += len.div_ceil(SECTOR_SIZE);
        sector as u32
    }
}

struct RecordSpec<'a> {
    name: &'a str,
    sector: u32,
    length: u32,
    attributes: u8,
}

impl GdfxImageBuilder {
    pub fn new() -> Self {
        Self {
            partition_offset: 0,
            root: BTreeMap::new(),
        }
    }

    /// Place the game partition at `offset` (one of the probed offsets).
    pub fn partition_offset(mut self, offset: u64) -> Self {
        self.partition_offset = offset;
        self
    }

    /// Add a file, creating parent directories as needed.
    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, Node::File {
            data: data.into(),
            sector: None,
        });
        self
    }

    /// Add a file whose data starts at a fixed partition-relative sector.
    ///
    /// The caller keeps pinned sectors clear of the descriptor (sector 32)
    /// and of each other.
    pub fn file_at_sector(mut self, path: &str, sector: u32, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, Node::File {
            data: data.into(),
            sector: Some(sector),
        });
        self
    }

    /// Add an empty directory.
    pub fn dir(mut self, path: &str) -> Self {
        self.insert(path, Node::Dir(BTreeMap::new()));
        self
    }

    fn insert(&mut self, path: &str, node: Node) {
        let parts: Vec<&str> = path::components(path).collect();
        let Some((leaf, parents)) = parts.split_last() else {
            return;
        };
        let mut dir = &mut self.root;
        for part in parents {
            let next = dir
                .entry(part.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            dir = match next {
                Node::Dir(children) => children,
                Node::File { .. } => panic!("{part} is a file, not a directory"),
            };
        }
        dir.insert(leaf.to_string(), node);
    }

    /// Produce the image bytes.
    pub fn build(&self) -> Vec<u8> {
        let pinned_end = pinned_end(&self.root);
        let mut layout = Layout {
            next_sector: (HEADER_SECTOR + 1).max(pinned_end),
            writes: Vec::new(),
        };
        let (root_sector, root_size) = layout_dir(&self.root, &mut layout);

        let used_sectors = layout
            .writes
            .iter()
            .map(|(at, bytes)| (at + bytes.len() as u64).div_ceil(SECTOR_SIZE))
            .max()
            .unwrap_or(0)
            .max(HEADER_SECTOR + 1);
        let mut image = vec![0u8; (self.partition_offset + used_sectors * SECTOR_SIZE) as usize];

        let header = (self.partition_offset + HEADER_SECTOR * SECTOR_SIZE) as usize;
        image[header..header + MAGIC.len()].copy_from_slice(MAGIC);
        image[header + 0x14..header + 0x18].copy_from_slice(&root_sector.to_le_bytes());
        image[header + 0x18..header + 0x1C].copy_from_slice(&root_size.to_le_bytes());
        image[header + 0x7EC..header + 0x7EC + MAGIC.len()].copy_from_slice(MAGIC);

        for (at, bytes) in &layout.writes {
            let start = (self.partition_offset + at) as usize;
            image[start..start + bytes.len()].copy_from_slice(bytes);
        }
        image
    }
}

fn pinned_end(dir: &BTreeMap<String, Node>) -> u64 {
    dir.values()
        .map(|node| match node {
            Node::File {
                data,
                sector: Some(sector),
            } => u64::from(*sector) + (data.len() as u64).div_ceil(SECTOR_SIZE),
            Node::File { sector: None, .. } => 0,
            Node::Dir(children) => pinned_end(children),
        })
        .max()
        .unwrap_or(0)
}

fn record_len(name: &str) -> usize {
    (RECORD_HEADER_LEN + name.len()).next_multiple_of(4)
}

/// Allocate and emit one directory; returns its table sector and size.
fn layout_dir(dir: &BTreeMap<String, Node>, layout: &mut Layout) -> (u32, u32) {
    if dir.is_empty() {
        return (0, 0);
    }
    let mut names: Vec<&String> = dir.keys().collect();
    names.sort_by_key(|name| name.to_ascii_lowercase());

    let table_len: usize = names.iter().map(|n| record_len(n)).sum();
    let table_size = (table_len as u64).next_multiple_of(SECTOR_SIZE);
    let table_sector = layout.take(table_size);

    let mut records = Vec::with_capacity(names.len());
    for name in names {
        let record = match &dir[name] {
            Node::File { data, sector } => {
                let sector = sector.unwrap_or_else(|| layout.take(data.len() as u64));
                layout
                    .writes
                    .push((u64::from(sector) * SECTOR_SIZE, data.clone()));
                RecordSpec {
                    name,
                    sector,
                    length: data.len() as u32,
                    attributes: 0x00,
                }
            }
            Node::Dir(children) => {
                let (sector, length) = layout_dir(children, layout);
                RecordSpec {
                    name,
                    sector,
                    length,
                    attributes: ATTRIBUTE_DIRECTORY,
                }
            }
        };
        records.push(record);
    }

    let mut table = Vec::with_capacity(table_size as usize);
    emit_subtree(&records, &mut table);
    table.resize(table_size as usize, 0xFF);
    layout
        .writes
        .push((u64::from(table_sector) * SECTOR_SIZE, table));
    (table_sector, table_size as u32)
}

/// Emit `records` as a balanced binary tree, subtree root first.
/// Returns the ordinal of the subtree root.
fn emit_subtree(records: &[RecordSpec<'_>], table: &mut Vec<u8>) -> Option<u16> {
    if records.is_empty() {
        return None;
    }
    let mid = records.len() / 2;
    let record = &records[mid];
    let start = table.len();
    let ordinal = (start / 4) as u16;

    table.extend_from_slice(&[0u8; 4]);
    table.extend_from_slice(&record.sector.to_le_bytes());
    table.extend_from_slice(&record.length.to_le_bytes());
    table.push(record.attributes);
    table.push(record.name.len() as u8);
    table.extend_from_slice(record.name.as_bytes());
    table.resize(start + record_len(record.name), 0xFF);

    let left = emit_subtree(&records[..mid], table).unwrap_or(0);
    let right = emit_subtree(&records[mid + 1..], table).unwrap_or(0);
    table[start..start + 2].copy_from_slice(&left.to_le_bytes());
    table[start + 2..start + 4].copy_from_slice(&right.to_le_bytes());
    Some(ordinal)
}
