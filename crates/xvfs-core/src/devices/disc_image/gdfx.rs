//! GDFX (XDVDFS) directory parsing.
//!
//! On-disc layout, all integers little endian:
//!
//! ```text
//! partition + 32 * 2048:
//!   +0x00  [u8; 20]  "MICROSOFT*XBOX*MEDIA"
//!   +0x14  u32       root directory table sector
//!   +0x18  u32       root directory table size in bytes
//!
//! directory table: binary tree of 4-byte aligned records,
//! record n lives at byte n * 4 of its table, record 0 is the tree root:
//!   +0   u16   left subtree ordinal (0 = none)
//!   +2   u16   right subtree ordinal (0 = none)
//!   +4   u32   start sector (relative to the partition)
//!   +8   u32   length in bytes
//!   +12  u8    attributes (0x10 = directory)
//!   +13  u8    name length
//!   +14  [u8]  name
//! ```
//!
//! An in-order walk yields each directory's children in sorted order.

use std::collections::HashSet;

use xvfs_kernel::FileAttributes;

use crate::entry::{EntryId, EntryTree, NodeSpec, TreeBuilder};
use crate::error::{VfsError, VfsResult};
use crate::types::EntryKind;

/// Bytes per disc sector.
pub const SECTOR_SIZE: u64 = 0x800;

/// Volume descriptor magic.
pub const MAGIC: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Sector of the volume descriptor, relative to the game partition.
pub const HEADER_SECTOR: u64 = 32;

/// Offsets of the game partition in the image formats seen in the wild:
/// bare XDVDFS dumps, XGD1, XGD3, XGD2 and full XGD2 images.
pub const PARTITION_OFFSETS: [u64; 5] = [
    0x0000_0000,
    0x0000_FB20,
    0x0002_0600,
    0x0208_0000,
    0x0FD9_0000,
];

/// Directory bit in a record's attribute byte.
pub const ATTRIBUTE_DIRECTORY: u8 = 0x10;

/// Deepest directory nesting accepted before the image is declared
/// malformed.
pub const MAX_DIRECTORY_DEPTH: usize = 64;

/// Fixed part of a directory record.
pub const RECORD_HEADER_LEN: usize = 14;

/// First link word of an unused (empty) directory table.
const EMPTY_TABLE_MARKER: u16 = 0xFFFF;

/// Parsed volume descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeHeader {
    /// Byte offset of the game partition within the image.
    pub partition_offset: u64,
    pub root_sector: u32,
    pub root_size: u32,
}

/// Location of an entry's bytes within the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extent {
    pub data_offset: u64,
    pub data_size: u64,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryRecord<'a> {
    left: u16,
    right: u16,
    sector: u32,
    length: u32,
    attributes: u8,
    name: &'a [u8],
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Round `len` up to a whole number of sectors.
pub fn allocation_size(len: u64) -> u64 {
    len.div_ceil(SECTOR_SIZE) * SECTOR_SIZE
}

/// Find the volume descriptor by probing each known partition offset.
pub fn locate_header(image: &[u8]) -> VfsResult<VolumeHeader> {
    for &partition_offset in &PARTITION_OFFSETS {
        let at = partition_offset + HEADER_SECTOR * SECTOR_SIZE;
        let Ok(at) = usize::try_from(at) else {
            continue;
        };
        let Some(descriptor) = image.get(at..at + 0x1C) else {
            continue;
        };
        if &descriptor[..MAGIC.len()] != MAGIC {
            continue;
        }
        let header = VolumeHeader {
            partition_offset,
            root_sector: read_u32(descriptor, 0x14),
            root_size: read_u32(descriptor, 0x18),
        };
        tracing::debug!(
            partition_offset = %format!("{partition_offset:#x}"),
            root_sector = header.root_sector,
            root_size = header.root_size,
            "found GDFX volume descriptor"
        );
        return Ok(header);
    }
    Err(VfsError::malformed("no GDFX volume descriptor found"))
}

fn read_record(table: &[u8], ordinal: u16) -> VfsResult<DirectoryRecord<'_>> {
    let at = ordinal as usize * 4;
    let header = table
        .get(at..at + RECORD_HEADER_LEN)
        .ok_or_else(|| VfsError::malformed(format!("directory record {ordinal} out of bounds")))?;
    let name_len = header[13] as usize;
    let name = table
        .get(at + RECORD_HEADER_LEN..at + RECORD_HEADER_LEN + name_len)
        .ok_or_else(|| {
            VfsError::malformed(format!("directory record {ordinal} name out of bounds"))
        })?;
    Ok(DirectoryRecord {
        left: read_u16(header, 0),
        right: read_u16(header, 2),
        sector: read_u32(header, 4),
        length: read_u32(header, 8),
        attributes: header[12],
        name,
    })
}

/// Walks the directory tables of one image into an entry tree.
struct Parser<'a> {
    image: &'a [u8],
    partition_offset: u64,
    builder: TreeBuilder<Extent>,
    /// Start sectors of the directory tables walked so far.
    walked: HashSet<u32>,
}

impl<'a> Parser<'a> {
    /// Byte range of `length` bytes at `sector`, bounds checked.
    fn sector_range(&self, sector: u32, length: u32) -> VfsResult<(u64, u64)> {
        let start = u64::from(sector)
            .checked_mul(SECTOR_SIZE)
            .and_then(|o| o.checked_add(self.partition_offset))
            .ok_or_else(|| VfsError::malformed(format!("sector {sector} overflows")))?;
        let end = start + u64::from(length);
        if end > self.image.len() as u64 {
            return Err(VfsError::malformed(format!(
                "sector {sector} (+{length} bytes) lies beyond the {}-byte image",
                self.image.len()
            )));
        }
        Ok((start, end))
    }

    fn read_directory(
        &mut self,
        parent: EntryId,
        sector: u32,
        length: u32,
        depth: usize,
    ) -> VfsResult<()> {
        if length == 0 {
            return Ok(());
        }
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(VfsError::malformed(format!(
                "directories nested deeper than {MAX_DIRECTORY_DEPTH}"
            )));
        }
        let (start, end) = self.sector_range(sector, length)?;
        let image = self.image;
        let table = &image[start as usize..end as usize];
        if table.len() >= 2 && read_u16(table, 0) == EMPTY_TABLE_MARKER {
            return Ok(());
        }
        // A table reached from two directory records is malformed.
        if !self.walked.insert(sector) {
            return Err(VfsError::malformed(format!(
                "directory table at sector {sector} referenced twice"
            )));
        }

        // In-order walk with an explicit stack; link chains can be long.
        let mut visited = vec![false; table.len() / 4 + 1];
        let mut pending: Vec<DirectoryRecord<'a>> = Vec::new();
        let mut next = Some(0u16);
        loop {
            while let Some(ordinal) = next {
                let seen = visited.get_mut(ordinal as usize).ok_or_else(|| {
                    VfsError::malformed(format!("directory record {ordinal} out of bounds"))
                })?;
                if *seen {
                    return Err(VfsError::malformed(format!(
                        "directory record {ordinal} is linked twice"
                    )));
                }
                *seen = true;
                let record = read_record(table, ordinal)?;
                next = (record.left != 0).then_some(record.left);
                pending.push(record);
            }
            let Some(record) = pending.pop() else {
                break;
            };
            self.add_record(parent, &record, depth)?;
            next = (record.right != 0).then_some(record.right);
        }
        Ok(())
    }

    fn add_record(
        &mut self,
        parent: EntryId,
        record: &DirectoryRecord<'_>,
        depth: usize,
    ) -> VfsResult<()> {
        let name = String::from_utf8_lossy(record.name).into_owned();
        let attributes = FileAttributes::from_bits_truncate(u32::from(record.attributes))
            | FileAttributes::READ_ONLY;
        let size = u64::from(record.length);
        let is_dir = record.attributes & ATTRIBUTE_DIRECTORY != 0;

        let (kind, extent) = if is_dir {
            (EntryKind::Directory, Extent::default())
        } else {
            let (data_offset, _) = self.sector_range(record.sector, record.length)?;
            (
                EntryKind::File,
                Extent {
                    data_offset,
                    data_size: size,
                },
            )
        };

        let spec = NodeSpec {
            name,
            kind,
            attributes,
            size,
            allocation_size: allocation_size(size),
        };
        let id = self
            .builder
            .add_child(parent, spec, extent)
            .map_err(|e| match e {
                VfsError::InvalidParameter(msg) => VfsError::malformed(msg),
                other => other,
            })?;

        if is_dir {
            self.read_directory(id, record.sector, record.length, depth + 1)?;
        }
        Ok(())
    }
}

/// Parse a whole image into its volume header and entry tree.
///
/// Any structural problem aborts the parse; no partial tree is returned.
pub fn parse_image(image: &[u8]) -> VfsResult<(VolumeHeader, EntryTree<Extent>)> {
    let header = locate_header(image)?;
    let root_size = u64::from(header.root_size);
    let mut parser = Parser {
        image,
        partition_offset: header.partition_offset,
        builder: TreeBuilder::new(FileAttributes::READ_ONLY, root_size, Extent::default()),
        walked: HashSet::new(),
    };
    parser.read_directory(EntryId::ROOT, header.root_sector, header.root_size, 0)?;
    tracing::debug!(entries = parser.builder.len(), "parsed GDFX directory tree");
    Ok((header, parser.builder.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::disc_image::builder::GdfxImageBuilder;

    fn put_u16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Image with a header at partition 0 whose root table is at sector 33
    /// and holds the given raw bytes.
    fn raw_image(table: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 40 * SECTOR_SIZE as usize];
        let header = (HEADER_SECTOR * SECTOR_SIZE) as usize;
        image[header..header + 20].copy_from_slice(MAGIC);
        put_u32(&mut image, header + 0x14, 33);
        put_u32(&mut image, header + 0x18, table.len() as u32);
        let root = 33 * SECTOR_SIZE as usize;
        image[root..root + table.len()].copy_from_slice(table);
        image
    }

    fn record(left: u16, right: u16, sector: u32, length: u32, attrs: u8, name: &str) -> Vec<u8> {
        let mut rec = vec![0u8; RECORD_HEADER_LEN];
        put_u16(&mut rec, 0, left);
        put_u16(&mut rec, 2, right);
        put_u32(&mut rec, 4, sector);
        put_u32(&mut rec, 8, length);
        rec[12] = attrs;
        rec[13] = name.len() as u8;
        rec.extend_from_slice(name.as_bytes());
        while rec.len() % 4 != 0 {
            rec.push(0xFF);
        }
        rec
    }

    #[test]
    fn test_missing_header() {
        let image = vec![0u8; 64 * SECTOR_SIZE as usize];
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
        assert!(matches!(parse_image(&[]), Err(VfsError::MalformedImage(_))));
    }

    #[test]
    fn test_header_at_secondary_partition() {
        let image = GdfxImageBuilder::new()
            .partition_offset(0xFB20)
            .file("a.bin", b"abc".to_vec())
            .build();
        let (header, tree) = parse_image(&image).unwrap();
        assert_eq!(header.partition_offset, 0xFB20);

        let a = tree.resolve("a.bin").unwrap();
        let extent = tree.payload(a).unwrap();
        let start = extent.data_offset as usize;
        assert_eq!(&image[start..start + 3], b"abc");
        assert_eq!((extent.data_offset - 0xFB20) % SECTOR_SIZE, 0);
    }

    #[test]
    fn test_sector_to_offset() {
        // default.xex at sector 10, 500 bytes.
        let table = record(0, 0, 10, 500, 0x00, "default.xex");
        let image = raw_image(&table);
        let (_, tree) = parse_image(&image).unwrap();

        let id = tree.resolve("default.xex").unwrap();
        assert_eq!(
            tree.payload(id),
            Some(&Extent {
                data_offset: 20480,
                data_size: 500
            })
        );
        let info = tree.info(id).unwrap();
        assert_eq!(info.size, 500);
        assert_eq!(info.allocation_size, 2048);
        assert!(info.attributes.contains(FileAttributes::READ_ONLY));
    }

    #[test]
    fn test_in_order_traversal() {
        // Record 0 = "b", left -> "a", right -> "c".
        let mut table = record(0, 0, 34, 1, 0, "b");
        let a_ordinal = (table.len() / 4) as u16;
        table.extend(record(0, 0, 34, 1, 0, "a"));
        let c_ordinal = (table.len() / 4) as u16;
        table.extend(record(0, 0, 34, 1, 0, "c"));
        put_u16(&mut table, 0, a_ordinal);
        put_u16(&mut table, 2, c_ordinal);

        let image = raw_image(&table);
        let (_, tree) = parse_image(&image).unwrap();
        let names: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&id| tree.info(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut table = record(0, 0, 34, 1, 0, "loop");
        let second = (table.len() / 4) as u16;
        table.extend(record(0, second, 34, 1, 0, "again"));
        put_u16(&mut table, 2, second);

        let image = raw_image(&table);
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_file_out_of_bounds_rejected() {
        let table = record(0, 0, 39, 4096, 0, "big.bin");
        let image = raw_image(&table);
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_directory_table_out_of_bounds_rejected() {
        let table = record(0, 0, 1000, 2048, ATTRIBUTE_DIRECTORY, "media");
        let image = raw_image(&table);
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_record_out_of_bounds_rejected() {
        let mut table = record(0, 0, 34, 1, 0, "a");
        put_u16(&mut table, 2, 500);
        let image = raw_image(&table);
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut table = record(0, 0, 34, 1, 0, "same");
        let second = (table.len() / 4) as u16;
        table.extend(record(0, 0, 34, 1, 0, "SAME"));
        put_u16(&mut table, 2, second);

        let image = raw_image(&table);
        assert!(matches!(
            parse_image(&image),
            Err(VfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_empty_table_marker() {
        let table = vec![0xFFu8; SECTOR_SIZE as usize];
        let image = raw_image(&table);
        let (_, tree) = parse_image(&image).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_self_referencing_directory_rejected() {
        // A directory whose table is the root table again.
        let table = record(0, 0, 33, 64, ATTRIBUTE_DIRECTORY, "again");
        let image = raw_image(&table);
        let err = parse_image(&image).unwrap_err();
        assert!(matches!(err, VfsError::MalformedImage(_)));
    }

    #[test]
    fn test_shared_directory_table_rejected() {
        // Root at sector 33 holds directories "a" and "b", both pointing at
        // the table in sector 34.
        let mut root = record(0, 0, 34, 64, ATTRIBUTE_DIRECTORY, "a");
        let b_ordinal = (root.len() / 4) as u16;
        root.extend(record(0, 0, 34, 64, ATTRIBUTE_DIRECTORY, "b"));
        put_u16(&mut root, 2, b_ordinal);
        let mut image = raw_image(&root);
        let shared = record(0, 0, 36, 4, 0, "f");
        let at = 34 * SECTOR_SIZE as usize;
        image[at..at + shared.len()].copy_from_slice(&shared);

        let err = parse_image(&image).unwrap_err();
        assert!(matches!(err, VfsError::MalformedImage(ref msg) if msg.contains("sector 34")));
    }

    #[test]
    fn test_shared_table_chain_fails_fast() {
        // Tables 33..=72; each holds "a" and "b" pointing at the next one.
        // Walking every reference would build about 2^40 entries.
        const TABLES: u32 = 40;
        let mut image = vec![0u8; (33 + TABLES as usize + 1) * SECTOR_SIZE as usize];
        let header = (HEADER_SECTOR * SECTOR_SIZE) as usize;
        image[header..header + 20].copy_from_slice(MAGIC);
        put_u32(&mut image, header + 0x14, 33);
        put_u32(&mut image, header + 0x18, 40);
        for n in 0..TABLES {
            let sector = 33 + n;
            let mut table = if n + 1 == TABLES {
                record(0, 0, 0, 0, 0, "f")
            } else {
                let mut t = record(0, 0, sector + 1, 40, ATTRIBUTE_DIRECTORY, "a");
                let b_ordinal = (t.len() / 4) as u16;
                t.extend(record(0, 0, sector + 1, 40, ATTRIBUTE_DIRECTORY, "b"));
                put_u16(&mut t, 2, b_ordinal);
                t
            };
            table.resize(40, 0xFF);
            let at = sector as usize * SECTOR_SIZE as usize;
            image[at..at + table.len()].copy_from_slice(&table);
        }

        let err = parse_image(&image).unwrap_err();
        assert!(matches!(
            err,
            VfsError::MalformedImage(ref msg) if msg.contains("referenced twice")
        ));
    }

    #[test]
    fn test_allocation_size() {
        assert_eq!(allocation_size(0), 0);
        assert_eq!(allocation_size(1), 2048);
        assert_eq!(allocation_size(2048), 2048);
        assert_eq!(allocation_size(2049), 4096);
    }
}
