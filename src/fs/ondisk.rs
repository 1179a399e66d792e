//! On-disk struct layouts and their byte-exact codecs.
//!
//! Every struct is packed field-by-field into a fixed-size little-endian
//! byte buffer rather than relied on through `repr(C)` transmutes, so the
//! wire format is independent of the host's struct layout and round-trips on
//! any target, matching the struct order fixed in the design.

use crate::inode::FileType;

/// Maximum length of an entry's name, including the null padding.
pub const MAX_NAME: usize = 128;

/// The on-disk super block: `u32 magic; i32 usage; i32 max_ino;
/// i32 map_inode_blks; i32 map_inode_offset; i32 max_dno; i32 map_data_blks;
/// i32 map_data_offset; i32 inode_offset; i32 data_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlockDisk {
    pub magic: u32,
    pub usage: i32,
    pub max_ino: i32,
    pub map_inode_blks: i32,
    pub map_inode_offset: i32,
    pub max_dno: i32,
    pub map_data_blks: i32,
    pub map_data_offset: i32,
    pub inode_offset: i32,
    pub data_offset: i32,
}

/// Byte size of [`SuperBlockDisk`] on the wire.
pub const SUPER_DISK_SIZE: usize = 4 + 9 * 4;

impl SuperBlockDisk {
    pub fn to_bytes(&self) -> [u8; SUPER_DISK_SIZE] {
        let mut buf = [0u8; SUPER_DISK_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.usage.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_ino.to_le_bytes());
        buf[12..16].copy_from_slice(&self.map_inode_blks.to_le_bytes());
        buf[16..20].copy_from_slice(&self.map_inode_offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.max_dno.to_le_bytes());
        buf[24..28].copy_from_slice(&self.map_data_blks.to_le_bytes());
        buf[28..32].copy_from_slice(&self.map_data_offset.to_le_bytes());
        buf[32..36].copy_from_slice(&self.inode_offset.to_le_bytes());
        buf[36..40].copy_from_slice(&self.data_offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            usage: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            max_ino: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            map_inode_blks: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            map_inode_offset: i32::from_le_bytes(buf[16..20].try_into().unwrap()),
            max_dno: i32::from_le_bytes(buf[20..24].try_into().unwrap()),
            map_data_blks: i32::from_le_bytes(buf[24..28].try_into().unwrap()),
            map_data_offset: i32::from_le_bytes(buf[28..32].try_into().unwrap()),
            inode_offset: i32::from_le_bytes(buf[32..36].try_into().unwrap()),
            data_offset: i32::from_le_bytes(buf[36..40].try_into().unwrap()),
        }
    }
}

/// The on-disk inode: `u32 ino; i32 size; i32 link; i32 block_pointer[7];
/// i32 dir_cnt; i32 ftype; i32 block_allocated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeDisk {
    pub ino: u32,
    pub size: i32,
    pub link: i32,
    pub block_pointer: [i32; crate::geometry::DATA_PER_FILE],
    pub dir_cnt: i32,
    pub ftype: i32,
    pub block_allocated: i32,
}

/// Byte size of [`InodeDisk`] on the wire.
pub const INODE_DISK_SIZE: usize = 4 + 4 + 4 + crate::geometry::DATA_PER_FILE * 4 + 4 + 4 + 4;

impl InodeDisk {
    pub fn to_bytes(&self) -> [u8; INODE_DISK_SIZE] {
        let mut buf = [0u8; INODE_DISK_SIZE];
        let mut off = 0;
        buf[off..off + 4].copy_from_slice(&self.ino.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.size.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.link.to_le_bytes());
        off += 4;
        for ptr in &self.block_pointer {
            buf[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&self.dir_cnt.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.ftype.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.block_allocated.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut off = 0;
        let ino = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let size = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let link = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let mut block_pointer = [0i32; crate::geometry::DATA_PER_FILE];
        for ptr in &mut block_pointer {
            *ptr = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let dir_cnt = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let ftype = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let block_allocated = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Self {
            ino,
            size,
            link,
            block_pointer,
            dir_cnt,
            ftype,
            block_allocated,
        }
    }
}

/// The on-disk directory entry: `char name[128]; i32 ino; i32 ftype`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDisk {
    pub name: [u8; MAX_NAME],
    pub ino: i32,
    pub ftype: i32,
}

/// Byte size of [`EntryDisk`] on the wire.
pub const ENTRY_DISK_SIZE: usize = MAX_NAME + 4 + 4;

impl EntryDisk {
    /// Builds an entry record, null-padding `name` to [`MAX_NAME`] bytes.
    ///
    /// Panics if `name` does not fit; callers must validate name length
    /// first (see `ErrorKind::Invalid`).
    pub fn new(name: &str, ino: u32, ftype: FileType) -> Self {
        assert!(name.len() < MAX_NAME);
        let mut buf = [0u8; MAX_NAME];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: buf,
            ino: ino as i32,
            ftype: ftype as i32,
        }
    }

    /// The entry's name, with trailing null padding stripped.
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_DISK_SIZE] {
        let mut buf = [0u8; ENTRY_DISK_SIZE];
        buf[0..MAX_NAME].copy_from_slice(&self.name);
        buf[MAX_NAME..MAX_NAME + 4].copy_from_slice(&self.ino.to_le_bytes());
        buf[MAX_NAME + 4..MAX_NAME + 8].copy_from_slice(&self.ftype.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut name = [0u8; MAX_NAME];
        name.copy_from_slice(&buf[0..MAX_NAME]);
        let ino = i32::from_le_bytes(buf[MAX_NAME..MAX_NAME + 4].try_into().unwrap());
        let ftype = i32::from_le_bytes(buf[MAX_NAME + 4..MAX_NAME + 8].try_into().unwrap());
        Self { name, ino, ftype }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_block_round_trips() {
        let sb = SuperBlockDisk {
            magic: crate::geometry::MAGIC,
            usage: 1,
            max_ino: 64,
            map_inode_blks: 1,
            map_inode_offset: 1024,
            max_dno: 4029,
            map_data_blks: 1,
            map_data_offset: 2048,
            inode_offset: 3072,
            data_offset: 68608,
        };
        assert_eq!(SuperBlockDisk::from_bytes(&sb.to_bytes()), sb);
    }

    #[test]
    fn inode_round_trips() {
        let ino = InodeDisk {
            ino: 3,
            size: 5000,
            link: 1,
            block_pointer: [1, 2, 3, 4, 5, 6, 7],
            dir_cnt: 0,
            ftype: FileType::Regular as i32,
            block_allocated: 5,
        };
        assert_eq!(InodeDisk::from_bytes(&ino.to_bytes()), ino);
    }

    #[test]
    fn entry_round_trips_and_strips_padding() {
        let e = EntryDisk::new("hello.txt", 7, FileType::Regular);
        let back = EntryDisk::from_bytes(&e.to_bytes());
        assert_eq!(back, e);
        assert_eq!(back.name_str(), "hello.txt");
    }
}
