//! The mount singleton: device + both bitmaps + the in-memory inode/entry
//! tree, and the mount/format/unmount/sync/read lifecycle that binds them.
//!
//! Reified as an explicit struct threaded through every operation, rather
//! than the process-wide global the original keeps, per the design notes.

use crate::bitmap::Bitmap;
use crate::dentry::{Entry, EntryKey, Slab};
use crate::device::Device;
use crate::error::{Error, ErrorKind, Result};
use crate::geometry::{
    entries_per_block, Layout, DATA_MAP_BLKS, DATA_PER_FILE, DEVICE_SIZE, INODE_MAP_BLKS, MAGIC,
    MAX_DNO, MAX_INO, ROOT_INO,
};
use crate::inode::{FileType, Inode};
use crate::ondisk::{EntryDisk, InodeDisk, SuperBlockDisk, ENTRY_DISK_SIZE, INODE_DISK_SIZE, SUPER_DISK_SIZE};
use std::path::Path;

/// The bound device, both bitmaps, and the in-memory object graph for one
/// mounted filesystem.
pub struct Mount {
    device: Device,
    layout: Layout,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    entries: Slab<Entry>,
    inodes: Vec<Option<Inode>>,
    root: EntryKey,
    usage: i32,
    mounted: bool,
}

impl Mount {
    /// Opens `path`, probes for an existing filesystem, formats it on first
    /// use, and loads the root inode.
    pub fn mount(path: &Path) -> Result<Self> {
        let mut device = Device::open(path)?;
        if device.size() < DEVICE_SIZE {
            return Err(Error::new(ErrorKind::Invalid));
        }
        let layout = Layout::compute();

        let mut sb_buf = [0u8; SUPER_DISK_SIZE];
        device.read(0, &mut sb_buf)?;
        let sb = SuperBlockDisk::from_bytes(&sb_buf);

        let mut entries = Slab::new();
        let root = entries.insert(Entry::new("/".to_string(), FileType::Directory, ROOT_INO, None));
        let inodes: Vec<Option<Inode>> = (0..MAX_INO).map(|_| None).collect();

        let needs_format = sb.magic != MAGIC;
        let (inode_bitmap, data_bitmap, usage) = if needs_format {
            (
                Bitmap::zeroed((INODE_MAP_BLKS * crate::geometry::BLOCK_SIZE) as usize, MAX_INO),
                Bitmap::zeroed((DATA_MAP_BLKS * crate::geometry::BLOCK_SIZE) as usize, MAX_DNO),
                0,
            )
        } else {
            let mut ib = vec![0u8; sb.map_inode_blks as usize * crate::geometry::BLOCK_SIZE as usize];
            device.read(sb.map_inode_offset as u64, &mut ib)?;
            let mut db = vec![0u8; sb.map_data_blks as usize * crate::geometry::BLOCK_SIZE as usize];
            device.read(sb.map_data_offset as u64, &mut db)?;
            (
                Bitmap::from_bytes(ib, MAX_INO),
                Bitmap::from_bytes(db, MAX_DNO),
                sb.usage,
            )
        };

        let mut mount = Self {
            device,
            layout,
            inode_bitmap,
            data_bitmap,
            entries,
            inodes,
            root,
            usage,
            mounted: false,
        };

        if needs_format {
            mount.format()?;
        } else {
            mount.read_inode_from_disk(ROOT_INO, root)?;
        }
        mount.mounted = true;
        Ok(mount)
    }

    /// First-time format: writes the super block, allocates the root inode,
    /// and flushes it. Both bitmaps stay in memory until unmount.
    fn format(&mut self) -> Result<()> {
        self.usage = 0;
        self.write_super()?;
        let ino = self.inode_bitmap.alloc()?;
        debug_assert_eq!(ino, ROOT_INO, "root must be the first inode allocated");
        self.inodes[ino as usize] = Some(Inode::new(ino, FileType::Directory, self.root));
        self.sync_inode(self.root)
    }

    fn write_super(&mut self) -> Result<()> {
        let sb = SuperBlockDisk {
            magic: MAGIC,
            usage: self.usage,
            max_ino: MAX_INO as i32,
            map_inode_blks: INODE_MAP_BLKS as i32,
            map_inode_offset: self.layout.inode_bitmap_offset as i32,
            max_dno: MAX_DNO as i32,
            map_data_blks: DATA_MAP_BLKS as i32,
            map_data_offset: self.layout.data_bitmap_offset as i32,
            inode_offset: self.layout.inode_table_offset as i32,
            data_offset: self.layout.data_offset as i32,
        };
        self.device.write(0, &sb.to_bytes())
    }

    /// Recursively syncs the whole tree, then persists the super block and
    /// both bitmaps. A no-op if the filesystem isn't mounted.
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.sync_inode(self.root)?;
        self.write_super()?;
        self.device
            .write(self.layout.inode_bitmap_offset, self.inode_bitmap.as_bytes())?;
        self.device
            .write(self.layout.data_bitmap_offset, self.data_bitmap.as_bytes())?;
        self.mounted = false;
        Ok(())
    }

    /// Recursively writes `key`'s inode (if materialized) and, for a
    /// directory, every child entry and its materialized inode.
    fn sync_inode(&mut self, key: EntryKey) -> Result<()> {
        let ino = self.entries.get(key).expect("valid entry key").ino;
        if self.inodes[ino as usize].is_none() {
            // Never touched since it was loaded; the on-disk copy is current.
            return Ok(());
        }

        let disk_form = self.inodes[ino as usize].as_ref().unwrap().to_disk();
        self.device
            .write(self.layout.inode_offset(ino), &disk_form.to_bytes())?;

        let is_dir = self.inodes[ino as usize].as_ref().unwrap().is_dir();
        if is_dir {
            let block_allocated = self.inodes[ino as usize].as_ref().unwrap().block_allocated;
            let block_pointer = self.inodes[ino as usize].as_ref().unwrap().block_pointer;
            let mut cursor = self.inodes[ino as usize].as_ref().unwrap().children_head;
            let per_block = entries_per_block() as u32;

            'blocks: for b in 0..block_allocated {
                let block_start = self.layout.data_block_offset(block_pointer[b as usize] as u32);
                for slot in 0..per_block {
                    let Some(ck) = cursor else { break 'blocks };
                    let (name, child_ino, ftype, next) = {
                        let e = self.entries.get(ck).expect("sibling list entry vanished");
                        (e.name.clone(), e.ino, e.ftype, e.next_sibling)
                    };
                    let ed = EntryDisk::new(&name, child_ino, ftype);
                    let offset = block_start + slot as u64 * ENTRY_DISK_SIZE as u64;
                    self.device.write(offset, &ed.to_bytes())?;
                    cursor = next;
                    self.sync_inode(ck)?;
                }
            }
        } else {
            let block_allocated = self.inodes[ino as usize].as_ref().unwrap().block_allocated;
            let block_pointer = self.inodes[ino as usize].as_ref().unwrap().block_pointer;
            for i in 0..block_allocated as usize {
                let buf = self.inodes[ino as usize].as_ref().unwrap().data.as_ref().unwrap()[i].clone();
                let offset = self.layout.data_block_offset(block_pointer[i] as u32);
                self.device.write(offset, &buf[..])?;
            }
        }
        Ok(())
    }

    /// Reads inode `ino` from disk, materializing its children (directories)
    /// or data buffers (regular files), and stores it at `self.inodes[ino]`.
    fn read_inode_from_disk(&mut self, ino: u32, owner: EntryKey) -> Result<()> {
        let mut buf = [0u8; INODE_DISK_SIZE];
        self.device.read(self.layout.inode_offset(ino), &mut buf)?;
        let disk = InodeDisk::from_bytes(&buf);
        let mut inode = Inode::from_disk(&disk, owner);

        if inode.is_dir() {
            let mut remaining = inode.dir_cnt;
            let per_block = entries_per_block() as u32;
            'blocks: for b in 0..inode.block_allocated {
                let block_start = self.layout.data_block_offset(inode.block_pointer[b as usize] as u32);
                for slot in 0..per_block {
                    if remaining == 0 {
                        break 'blocks;
                    }
                    let mut ebuf = [0u8; ENTRY_DISK_SIZE];
                    let offset = block_start + slot as u64 * ENTRY_DISK_SIZE as u64;
                    self.device.read(offset, &mut ebuf)?;
                    let ed = EntryDisk::from_bytes(&ebuf);
                    let child_key = self.entries.insert(Entry::new(
                        ed.name_str(),
                        FileType::from_disk(ed.ftype),
                        ed.ino as u32,
                        Some(owner),
                    ));
                    // Head-insertion, matching the allocation protocol: the
                    // list ends up in the reverse of on-disk order.
                    let prev_head = inode.children_head;
                    self.entries.get_mut(child_key).unwrap().next_sibling = prev_head;
                    inode.children_head = Some(child_key);
                    remaining -= 1;
                }
            }
        } else {
            for i in 0..inode.block_allocated as usize {
                let offset = self.layout.data_block_offset(inode.block_pointer[i] as u32);
                let data = inode.data.as_mut().expect("regular file must have buffers");
                self.device.read(offset, &mut data[i][..])?;
            }
        }

        self.inodes[ino as usize] = Some(inode);
        Ok(())
    }

    /// Ensures `key`'s inode is materialized, reading it from disk if this
    /// is the first touch.
    pub fn ensure_materialized(&mut self, key: EntryKey) -> Result<()> {
        let ino = self.entries.get(key).expect("valid entry key").ino;
        if self.inodes[ino as usize].is_none() {
            self.read_inode_from_disk(ino, key)?;
        }
        Ok(())
    }

    pub fn root(&self) -> EntryKey {
        self.root
    }

    pub fn entry(&self, key: EntryKey) -> &Entry {
        self.entries.get(key).expect("valid entry key")
    }

    pub fn entry_mut(&mut self, key: EntryKey) -> &mut Entry {
        self.entries.get_mut(key).expect("valid entry key")
    }

    pub fn inode(&self, ino: u32) -> Option<&Inode> {
        self.inodes.get(ino as usize).and_then(|o| o.as_ref())
    }

    pub fn inode_mut(&mut self, ino: u32) -> Option<&mut Inode> {
        self.inodes.get_mut(ino as usize).and_then(|o| o.as_mut())
    }

    /// Inserts a detached entry into the arena, returning its key.
    pub fn new_entry(&mut self, entry: Entry) -> EntryKey {
        self.entries.insert(entry)
    }

    /// Removes an entry from the arena (does not unlink it from any parent).
    pub fn remove_entry(&mut self, key: EntryKey) -> Entry {
        self.entries.remove(key)
    }

    /// Allocates a fresh inode id from the bitmap, without installing an
    /// inode yet.
    ///
    /// Split from inode construction because building an [`Inode`] needs the
    /// owning entry's key, and building an [`Entry`] needs the inode id:
    /// callers allocate the id, insert the entry, then [`Mount::install_inode`].
    pub fn alloc_inode_id(&mut self) -> Result<u32> {
        self.inode_bitmap.alloc()
    }

    /// Installs a freshly built inode at `ino`, completing the two-step
    /// allocation started by [`Mount::alloc_inode_id`].
    pub fn install_inode(&mut self, ino: u32, inode: Inode) {
        self.inodes[ino as usize] = Some(inode);
    }

    /// Frees an inode's data blocks and its own bitmap bit, and drops it
    /// from the in-memory table.
    pub fn free_inode(&mut self, ino: u32) {
        if let Some(inode) = &self.inodes[ino as usize] {
            for i in 0..inode.block_allocated as usize {
                self.data_bitmap.free(inode.block_pointer[i] as u32);
            }
        }
        self.inode_bitmap.free(ino);
        self.inodes[ino as usize] = None;
    }

    pub fn alloc_data_block(&mut self) -> Result<u32> {
        self.data_bitmap.alloc()
    }

    /// Links `child_key` into `parent_key`'s sibling list, head-first, and
    /// grows the parent's data-block allocation if this entry overflows the
    /// current last block.
    ///
    /// Reserves any data block the insertion would need before touching the
    /// sibling list or counters, so a capacity or bitmap failure leaves the
    /// parent exactly as it was — the caller never has to unwind a partial
    /// link.
    pub fn link_entry_into_parent(&mut self, parent_key: EntryKey, child_key: EntryKey) -> Result<()> {
        let parent_ino = self.entries.get(parent_key).expect("valid entry key").ino;

        let (dir_cnt, block_allocated) = {
            let parent_inode = self.inodes[parent_ino as usize].as_ref().unwrap();
            (parent_inode.dir_cnt + 1, parent_inode.block_allocated)
        };
        let needs_block = dir_cnt % entries_per_block() as u32 == 1;
        if needs_block && block_allocated as usize >= DATA_PER_FILE {
            return Err(Error::new(ErrorKind::NoSpace));
        }
        let reserved_dno = if needs_block {
            Some(self.alloc_data_block()?)
        } else {
            None
        };

        let prev_head = self.inodes[parent_ino as usize].as_ref().unwrap().children_head;
        self.entries.get_mut(child_key).expect("valid entry key").next_sibling = prev_head;

        let parent_inode = self.inodes[parent_ino as usize].as_mut().unwrap();
        parent_inode.children_head = Some(child_key);
        parent_inode.dir_cnt = dir_cnt;
        parent_inode.size += ENTRY_DISK_SIZE as u32;
        if let Some(dno) = reserved_dno {
            let idx = parent_inode.block_allocated as usize;
            parent_inode.block_pointer[idx] = dno as i32;
            parent_inode.block_allocated += 1;
        }
        Ok(())
    }

    /// Detaches `child_key` from `parent_key`'s sibling list.
    pub fn unlink_entry_from_parent(&mut self, parent_key: EntryKey, child_key: EntryKey) {
        let parent_ino = self.entries.get(parent_key).expect("valid entry key").ino;
        let head = self.inodes[parent_ino as usize].as_ref().unwrap().children_head;

        let mut prev: Option<EntryKey> = None;
        let mut cursor = head;
        while let Some(ck) = cursor {
            let next = self.entries.get(ck).expect("valid entry key").next_sibling;
            if ck == child_key {
                match prev {
                    None => self.inodes[parent_ino as usize].as_mut().unwrap().children_head = next,
                    Some(pk) => self.entries.get_mut(pk).unwrap().next_sibling = next,
                }
                break;
            }
            prev = Some(ck);
            cursor = next;
        }

        let parent_inode = self.inodes[parent_ino as usize].as_mut().unwrap();
        parent_inode.dir_cnt = parent_inode.dir_cnt.saturating_sub(1);
        parent_inode.size = parent_inode.size.saturating_sub(ENTRY_DISK_SIZE as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn new_image() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; DEVICE_SIZE as usize]).unwrap();
        tmp
    }

    #[test]
    fn format_then_remount_is_idempotent() {
        let img = new_image();
        {
            let mut m = Mount::mount(img.path()).unwrap();
            assert_eq!(m.inode_bitmap.count_set(), 1);
            assert_eq!(m.data_bitmap.count_set(), 0);
            m.unmount().unwrap();
        }
        let mut m = Mount::mount(img.path()).unwrap();
        assert_eq!(m.inode_bitmap.count_set(), 1);
        assert_eq!(m.data_bitmap.count_set(), 0);
        m.ensure_materialized(m.root()).unwrap();
        assert_eq!(m.inode(ROOT_INO).unwrap().dir_cnt, 0);
        m.unmount().unwrap();
    }

    #[test]
    fn rejects_undersized_device() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; 1024]).unwrap();
        let err = Mount::mount(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
