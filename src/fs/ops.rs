//! The operation façade: the filesystem verbs (`getattr`, `readdir`,
//! `mkdir`, `create`, `read`, `write`, `unlink`, `rmdir`, `rename`,
//! `truncate`, `access`, `utimens`), each taking a path and operating on a
//! [`Mount`]. This is what `fuse_adapter` calls into; nothing here knows
//! about FUSE.

use crate::dentry::{Entry, EntryKey};
use crate::error::{Error, ErrorKind, Result};
use crate::geometry::{BLOCK_SIZE, DATA_PER_FILE};
use crate::inode::FileType;
use crate::mount::Mount;
use crate::ondisk::MAX_NAME;
use crate::resolve::{self, Resolved};

/// Maximum size, in bytes, a regular file may grow to.
pub const MAX_FILE_SIZE: u64 = DATA_PER_FILE as u64 * BLOCK_SIZE;

/// Snapshot of an inode's metadata, independent of any host binding.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub ino: u32,
    pub ftype: FileType,
    pub size: u64,
    pub link: i32,
    pub block_allocated: u32,
    pub dir_cnt: u32,
}

/// One entry returned by [`readdir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub ino: u32,
    pub ftype: FileType,
}

fn attr_of(mount: &Mount, ino: u32) -> Attr {
    let inode = mount.inode(ino).expect("caller materialized this inode");
    Attr {
        ino: inode.ino,
        ftype: inode.ftype,
        size: inode.size as u64,
        link: inode.link,
        block_allocated: inode.block_allocated,
        dir_cnt: inode.dir_cnt,
    }
}

fn resolve_existing(mount: &mut Mount, path: &str) -> Result<EntryKey> {
    let r = resolve::resolve(mount, path)?;
    if !r.found {
        return Err(Error::new(ErrorKind::NotFound));
    }
    mount.ensure_materialized(r.entry)?;
    Ok(r.entry)
}

pub fn getattr(mount: &mut Mount, path: &str) -> Result<Attr> {
    let key = resolve_existing(mount, path)?;
    let ino = mount.entry(key).ino;
    Ok(attr_of(mount, ino))
}

pub fn readdir(mount: &mut Mount, path: &str) -> Result<Vec<DirEntry>> {
    let key = resolve_existing(mount, path)?;
    let ino = mount.entry(key).ino;
    if !mount.inode(ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::NotDir));
    }
    let mut out = Vec::new();
    let mut cursor = mount.inode(ino).unwrap().children_head;
    while let Some(ck) = cursor {
        let e = mount.entry(ck);
        out.push(DirEntry {
            name: e.name.clone(),
            ino: e.ino,
            ftype: e.ftype,
        });
        cursor = e.next_sibling;
    }
    Ok(out)
}

/// Validates a new entry's name against the on-disk name budget.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= MAX_NAME {
        return Err(Error::new(ErrorKind::Invalid));
    }
    Ok(())
}

/// Resolves `path`'s parent directory, rejecting the case where `path`
/// already exists or an ancestor directory is missing.
fn resolve_new(mount: &mut Mount, path: &str) -> Result<(EntryKey, String)> {
    let (parent_path, name) = resolve::split_parent(path)?;
    check_name(&name)?;

    let parent_r: Resolved = resolve::resolve(mount, &parent_path)?;
    if !parent_r.found {
        return Err(Error::new(ErrorKind::NotFound));
    }
    mount.ensure_materialized(parent_r.entry)?;
    let parent_ino = mount.entry(parent_r.entry).ino;
    if !mount.inode(parent_ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::NotDir));
    }

    let full = resolve::resolve(mount, path)?;
    if full.found {
        return Err(Error::new(ErrorKind::Exists));
    }
    Ok((parent_r.entry, name))
}

fn create_inode(mount: &mut Mount, parent: EntryKey, name: String, ftype: FileType) -> Result<Attr> {
    let ino = mount.alloc_inode_id()?;
    let child_key = mount.new_entry(Entry::new(name, ftype, ino, Some(parent)));
    mount.install_inode(ino, crate::inode::Inode::new(ino, ftype, child_key));
    if let Err(e) = mount.link_entry_into_parent(parent, child_key) {
        // Roll back the inode/entry allocation so a failed link doesn't
        // leak bitmap bits or a dangling arena slot.
        mount.free_inode(ino);
        mount.remove_entry(child_key);
        return Err(e);
    }
    Ok(attr_of(mount, ino))
}

pub fn mkdir(mount: &mut Mount, path: &str) -> Result<Attr> {
    let (parent, name) = resolve_new(mount, path)?;
    create_inode(mount, parent, name, FileType::Directory)
}

pub fn create(mount: &mut Mount, path: &str) -> Result<Attr> {
    let (parent, name) = resolve_new(mount, path)?;
    create_inode(mount, parent, name, FileType::Regular)
}

pub fn read(mount: &mut Mount, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let key = resolve_existing(mount, path)?;
    let ino = mount.entry(key).ino;
    let inode = mount.inode(ino).unwrap();
    if inode.is_dir() {
        return Err(Error::new(ErrorKind::IsDir));
    }
    if offset >= MAX_FILE_SIZE {
        return Err(Error::new(ErrorKind::Seek));
    }
    let size = inode.size as u64;
    if offset >= size {
        return Ok(0);
    }
    let want = buf.len() as u64;
    let avail = size - offset;
    let n = want.min(avail) as usize;

    let data = inode.data.as_ref().expect("regular file has data buffers");
    let mut read = 0usize;
    while read < n {
        let pos = offset as usize + read;
        let block = pos / BLOCK_SIZE as usize;
        let within = pos % BLOCK_SIZE as usize;
        let chunk = (BLOCK_SIZE as usize - within).min(n - read);
        buf[read..read + chunk].copy_from_slice(&data[block][within..within + chunk]);
        read += chunk;
    }
    Ok(read)
}

/// Grows a regular file's `block_allocated`/`block_pointer` table so that
/// `upto_block` (exclusive) is covered, allocating new data blocks lazily as
/// the write crosses each block boundary.
fn grow_to_block(mount: &mut Mount, ino: u32, upto_block: usize) -> Result<()> {
    loop {
        let current = mount.inode(ino).unwrap().block_allocated as usize;
        if current >= upto_block {
            return Ok(());
        }
        let dno = mount.alloc_data_block()?;
        let inode = mount.inode_mut(ino).unwrap();
        inode.block_pointer[current] = dno as i32;
        inode.block_allocated += 1;
    }
}

pub fn write(mount: &mut Mount, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
    let key = resolve_existing(mount, path)?;
    let ino = mount.entry(key).ino;
    if mount.inode(ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::IsDir));
    }
    if offset >= MAX_FILE_SIZE {
        return Err(Error::new(ErrorKind::Seek));
    }
    let end = offset + data.len() as u64;
    if end > MAX_FILE_SIZE {
        return Err(Error::new(ErrorKind::NoSpace));
    }
    let n = (end - offset) as usize;
    if n == 0 {
        return Ok(0);
    }

    let last_block = (end as usize - 1) / BLOCK_SIZE as usize;
    grow_to_block(mount, ino, last_block + 1)?;

    let inode = mount.inode_mut(ino).unwrap();
    let buffers = inode.data.as_mut().expect("regular file has data buffers");
    let mut written = 0usize;
    while written < n {
        let pos = offset as usize + written;
        let block = pos / BLOCK_SIZE as usize;
        let within = pos % BLOCK_SIZE as usize;
        let chunk = (BLOCK_SIZE as usize - within).min(n - written);
        buffers[block][within..within + chunk].copy_from_slice(&data[written..written + chunk]);
        written += chunk;
    }
    if end > inode.size as u64 {
        inode.size = end as u32;
    }
    Ok(written)
}

pub fn truncate(mount: &mut Mount, path: &str, size: u64) -> Result<()> {
    let key = resolve_existing(mount, path)?;
    let ino = mount.entry(key).ino;
    if mount.inode(ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::IsDir));
    }
    let size = size.min(MAX_FILE_SIZE);

    if size > 0 {
        let last_block = (size as usize - 1) / BLOCK_SIZE as usize;
        grow_to_block(mount, ino, last_block + 1)?;
    }

    let inode = mount.inode_mut(ino).unwrap();
    let old_size = inode.size as u64;
    inode.size = size as u32;
    // Zero any bytes exposed by growing past the old size.
    if size > old_size {
        if let Some(buffers) = inode.data.as_mut() {
            for pos in old_size as usize..size as usize {
                let block = pos / BLOCK_SIZE as usize;
                let within = pos % BLOCK_SIZE as usize;
                buffers[block][within] = 0;
            }
        }
    }
    Ok(())
}

/// No-op once a path has resolved: the fixed permission model has nothing
/// to check.
pub fn access(mount: &mut Mount, path: &str) -> Result<()> {
    resolve_existing(mount, path)?;
    Ok(())
}

/// No-op: timestamps aren't tracked on-disk.
pub fn utimens(mount: &mut Mount, path: &str) -> Result<()> {
    resolve_existing(mount, path)?;
    Ok(())
}

pub fn unlink(mount: &mut Mount, path: &str) -> Result<()> {
    let key = resolve_existing(mount, path)?;
    let entry = mount.entry(key);
    let ino = entry.ino;
    let parent = entry.parent.ok_or_else(|| Error::new(ErrorKind::Invalid))?;
    if mount.inode(ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::IsDir));
    }
    mount.unlink_entry_from_parent(parent, key);
    mount.free_inode(ino);
    mount.remove_entry(key);
    Ok(())
}

pub fn rmdir(mount: &mut Mount, path: &str) -> Result<()> {
    let key = resolve_existing(mount, path)?;
    let entry = mount.entry(key);
    let ino = entry.ino;
    let parent = entry.parent.ok_or_else(|| Error::new(ErrorKind::Invalid))?;
    let inode = mount.inode(ino).unwrap();
    if !inode.is_dir() {
        return Err(Error::new(ErrorKind::NotDir));
    }
    if inode.dir_cnt != 0 {
        return Err(Error::new(ErrorKind::NotEmpty));
    }
    mount.unlink_entry_from_parent(parent, key);
    mount.free_inode(ino);
    mount.remove_entry(key);
    Ok(())
}

pub fn rename(mount: &mut Mount, from: &str, to: &str) -> Result<()> {
    let from_key = resolve_existing(mount, from)?;
    let from_entry = mount.entry(from_key);
    let from_parent = from_entry.parent.ok_or_else(|| Error::new(ErrorKind::Invalid))?;
    let ino = from_entry.ino;
    let ftype = from_entry.ftype;

    let (to_parent_path, new_name) = resolve::split_parent(to)?;
    check_name(&new_name)?;
    let to_parent_r = resolve::resolve(mount, &to_parent_path)?;
    if !to_parent_r.found {
        return Err(Error::new(ErrorKind::NotFound));
    }
    mount.ensure_materialized(to_parent_r.entry)?;
    let to_parent_ino = mount.entry(to_parent_r.entry).ino;
    if !mount.inode(to_parent_ino).unwrap().is_dir() {
        return Err(Error::new(ErrorKind::NotDir));
    }
    let to_r = resolve::resolve(mount, to)?;
    if to_r.found {
        return Err(Error::new(ErrorKind::Exists));
    }
    let to_parent = to_parent_r.entry;

    mount.unlink_entry_from_parent(from_parent, from_key);
    let mut removed = mount.remove_entry(from_key);
    removed.name = new_name;
    removed.parent = Some(to_parent);
    removed.next_sibling = None;
    let new_key = mount.new_entry(removed);
    if let Err(e) = mount.link_entry_into_parent(to_parent, new_key) {
        // Best-effort: put it back where it came from.
        let mut back = mount.remove_entry(new_key);
        back.parent = Some(from_parent);
        let restored = mount.new_entry(back);
        let _ = mount.link_entry_into_parent(from_parent, restored);
        return Err(e);
    }
    if ftype == FileType::Directory {
        if let Some(inode) = mount.inode_mut(ino) {
            inode.owner = new_key;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::Mount;
    use std::io::Write as _;

    fn new_image() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; crate::geometry::DEVICE_SIZE as usize])
            .unwrap();
        tmp
    }

    #[test]
    fn create_read_write_roundtrip() {
        let img = new_image();
        let mut m = Mount::mount(img.path()).unwrap();
        create(&mut m, "/hello.txt").unwrap();
        let n = write(&mut m, "/hello.txt", 0, b"hello world").unwrap();
        assert_eq!(n, 11);
        let mut buf = [0u8; 11];
        let n = read(&mut m, "/hello.txt", 0, &mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
        let attr = getattr(&mut m, "/hello.txt").unwrap();
        assert_eq!(attr.size, 11);
        m.unmount().unwrap();
    }

    #[test]
    fn mkdir_readdir_and_rmdir() {
        let img = new_image();
        let mut m = Mount::mount(img.path()).unwrap();
        mkdir(&mut m, "/sub").unwrap();
        let entries = readdir(&mut m, "/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "sub");

        create(&mut m, "/sub/a.txt").unwrap();
        let err = rmdir(&mut m, "/sub").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        unlink(&mut m, "/sub/a.txt").unwrap();
        rmdir(&mut m, "/sub").unwrap();
        assert!(readdir(&mut m, "/").unwrap().is_empty());
    }

    #[test]
    fn write_past_budget_is_rejected() {
        let img = new_image();
        let mut m = Mount::mount(img.path()).unwrap();
        create(&mut m, "/big.bin").unwrap();
        let data = vec![7u8; MAX_FILE_SIZE as usize + 100];
        let err = write(&mut m, "/big.bin", 0, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);

        // A write that fits exactly still succeeds.
        let data = vec![7u8; MAX_FILE_SIZE as usize];
        let n = write(&mut m, "/big.bin", 0, &data).unwrap();
        assert_eq!(n as u64, MAX_FILE_SIZE);

        let err = write(&mut m, "/big.bin", MAX_FILE_SIZE, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Seek);
    }

    #[test]
    fn rename_moves_between_directories() {
        let img = new_image();
        let mut m = Mount::mount(img.path()).unwrap();
        mkdir(&mut m, "/a").unwrap();
        mkdir(&mut m, "/b").unwrap();
        create(&mut m, "/a/file.txt").unwrap();
        rename(&mut m, "/a/file.txt", "/b/file.txt").unwrap();
        assert!(getattr(&mut m, "/a/file.txt").is_err());
        assert!(getattr(&mut m, "/b/file.txt").is_ok());
    }
}
