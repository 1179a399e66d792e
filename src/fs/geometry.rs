//! Fixed on-disk geometry for the reference device size.
//!
//! The layout is computed once at format time from these constants and then
//! stored in the super block; a device smaller than [`DEVICE_SIZE`] cannot be
//! formatted (see [`crate::mount::Mount::mount`]).

use crate::ondisk::ENTRY_DISK_SIZE;

/// The driver's unit of transfer, in bytes.
pub const SECTOR_SIZE: u64 = 512;
/// The filesystem's unit of I/O composition: two sectors.
pub const BLOCK_SIZE: u64 = 2 * SECTOR_SIZE;
/// The reference device size this geometry is laid out for.
pub const DEVICE_SIZE: u64 = 4 * 1024 * 1024;
/// Total number of logical blocks on the reference device.
pub const TOTAL_BLOCKS: u64 = DEVICE_SIZE / BLOCK_SIZE;

/// Number of data blocks a single file may use.
pub const DATA_PER_FILE: usize = 7;

/// Blocks reserved for the super block.
pub const SUPER_BLKS: u64 = 1;
/// Blocks reserved for the inode bitmap.
pub const INODE_MAP_BLKS: u64 = 1;
/// Blocks reserved for the data bitmap.
pub const DATA_MAP_BLKS: u64 = 1;
/// Blocks reserved for the inode table.
///
/// One inode occupies a whole block (see the inode-offset REDESIGN FLAG in
/// DESIGN.md), so this also bounds the number of inodes the filesystem can
/// hold.
pub const INODE_BLKS: u64 = 64;
/// Blocks left over for the data region.
pub const DATA_BLKS: u64 = TOTAL_BLOCKS - SUPER_BLKS - INODE_MAP_BLKS - DATA_MAP_BLKS - INODE_BLKS;

/// Magic super block number identifying a formatted device.
pub const MAGIC: u32 = 0x5241_5453;

/// The inode id of the always-present root directory.
pub const ROOT_INO: u32 = 0;

/// The maximum number of inodes, one per inode block.
pub const MAX_INO: u32 = INODE_BLKS as u32;
/// The maximum number of allocatable data blocks.
pub const MAX_DNO: u32 = DATA_BLKS as u32;

/// Number of directory entries that fit in one block.
///
/// Uses the same strict "less than end of block" bound as the recursive sync
/// walk, so allocation overflow detection and the on-disk entry layout agree.
pub fn entries_per_block() -> u64 {
    let entry_size = ENTRY_DISK_SIZE as u64;
    let mut n = 0u64;
    while (n + 1) * entry_size < BLOCK_SIZE {
        n += 1;
    }
    n
}

/// Computed, fixed offsets for every region of the filesystem.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub inode_bitmap_offset: u64,
    pub data_bitmap_offset: u64,
    pub inode_table_offset: u64,
    pub data_offset: u64,
}

impl Layout {
    /// Computes the fixed layout from the geometry constants above.
    pub fn compute() -> Self {
        let inode_bitmap_offset = SUPER_BLKS * BLOCK_SIZE;
        let data_bitmap_offset = inode_bitmap_offset + INODE_MAP_BLKS * BLOCK_SIZE;
        let inode_table_offset = data_bitmap_offset + DATA_MAP_BLKS * BLOCK_SIZE;
        let data_offset = inode_table_offset + INODE_BLKS * BLOCK_SIZE;
        Self {
            inode_bitmap_offset,
            data_bitmap_offset,
            inode_table_offset,
            data_offset,
        }
    }

    /// Returns the disk offset of the inode with the given id.
    ///
    /// One inode occupies one whole block: `inode_table + id * BLOCK_SIZE`.
    pub fn inode_offset(&self, ino: u32) -> u64 {
        self.inode_table_offset + ino as u64 * BLOCK_SIZE
    }

    /// Returns the disk offset of the data block with the given index.
    pub fn data_block_offset(&self, dno: u32) -> u64 {
        self.data_offset + dno as u64 * BLOCK_SIZE
    }
}

