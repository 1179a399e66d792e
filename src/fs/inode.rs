//! In-memory inode representation.

use crate::dentry::EntryKey;
use crate::geometry::{BLOCK_SIZE, DATA_PER_FILE};
use crate::ondisk::InodeDisk;

/// A file's type, matching the original enum order (`Regular` = 0,
/// `Directory` = 1) so the on-disk `ftype` field is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
}

impl FileType {
    pub fn from_disk(v: i32) -> Self {
        match v {
            0 => FileType::Regular,
            _ => FileType::Directory,
        }
    }
}

/// One logical block's worth of file content.
pub type DataBlock = Box<[u8; BLOCK_SIZE as usize]>;

/// The in-memory form of an inode.
pub struct Inode {
    pub ino: u32,
    pub size: u32,
    pub link: i32,
    pub block_pointer: [i32; DATA_PER_FILE],
    pub dir_cnt: u32,
    pub ftype: FileType,
    pub block_allocated: u32,
    /// The entry that owns this inode (invariant: `owner.inode == Some(self.ino)`).
    pub owner: EntryKey,
    /// Head of the sibling list of child entries (directories only).
    pub children_head: Option<EntryKey>,
    /// Eagerly-allocated per-block buffers (regular files only).
    pub data: Option<Vec<DataBlock>>,
}

impl Inode {
    /// Builds a freshly allocated, empty inode of the given type.
    pub fn new(ino: u32, ftype: FileType, owner: EntryKey) -> Self {
        let data = match ftype {
            FileType::Regular => Some(
                (0..DATA_PER_FILE)
                    .map(|_| Box::new([0u8; BLOCK_SIZE as usize]))
                    .collect(),
            ),
            FileType::Directory => None,
        };
        Self {
            ino,
            size: 0,
            link: 1,
            block_pointer: [0; DATA_PER_FILE],
            dir_cnt: 0,
            ftype,
            block_allocated: 0,
            owner,
            children_head: None,
            data,
        }
    }

    /// Rehydrates an inode read from disk; data buffers/children are filled
    /// in by the caller (the inode cache) afterwards.
    pub fn from_disk(d: &InodeDisk, owner: EntryKey) -> Self {
        let ftype = FileType::from_disk(d.ftype);
        let data = match ftype {
            FileType::Regular => Some(
                (0..DATA_PER_FILE)
                    .map(|_| Box::new([0u8; BLOCK_SIZE as usize]))
                    .collect(),
            ),
            FileType::Directory => None,
        };
        Self {
            ino: d.ino,
            size: d.size.max(0) as u32,
            link: d.link,
            block_pointer: d.block_pointer,
            dir_cnt: d.dir_cnt.max(0) as u32,
            ftype,
            block_allocated: d.block_allocated.max(0) as u32,
            owner,
            children_head: None,
            data,
        }
    }

    /// Packs this inode into its on-disk form.
    pub fn to_disk(&self) -> InodeDisk {
        InodeDisk {
            ino: self.ino,
            size: self.size as i32,
            link: self.link,
            block_pointer: self.block_pointer,
            dir_cnt: self.dir_cnt as i32,
            ftype: self.ftype as i32,
            block_allocated: self.block_allocated as i32,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.ftype, FileType::Directory)
    }
}
