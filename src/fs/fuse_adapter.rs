//! Binds the operation façade to [`fuser::Filesystem`].
//!
//! FUSE reserves inode `1` for its own root, so every core inode id is
//! exposed to the kernel as `ino + 1`; `ino_to_path` walks an inode's owning
//! entry back to the root to recover the path the façade expects, since the
//! core indexes everything by path rather than by a kernel-style inode
//! table.

use crate::error::{Error, ErrorKind};
use crate::geometry::ROOT_INO;
use crate::inode::FileType as CoreFileType;
use crate::mount::Mount;
use crate::ops::{self, Attr};
use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

const TTL: Duration = Duration::from_secs(1);
const DIR_PERM: u16 = 0o755;
const FILE_PERM: u16 = 0o644;

fn fuse_ino(core_ino: u32) -> u64 {
    core_ino as u64 + 1
}

fn core_ino(fuse_ino: u64) -> u32 {
    (fuse_ino - 1) as u32
}

fn to_file_attr(attr: &Attr) -> FileAttr {
    let kind = match attr.ftype {
        CoreFileType::Directory => FuseFileType::Directory,
        CoreFileType::Regular => FuseFileType::RegularFile,
    };
    let now = SystemTime::now();
    FileAttr {
        ino: fuse_ino(attr.ino),
        size: attr.size,
        blocks: attr.block_allocated as u64,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind,
        perm: if kind == FuseFileType::Directory { DIR_PERM } else { FILE_PERM },
        nlink: attr.link.max(1) as u32,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: crate::geometry::BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// Reconstructs the absolute path of `ino` by walking its owning entry's
/// parent chain back to the root.
fn ino_to_path(mount: &Mount, ino: u32) -> crate::error::Result<String> {
    if ino == ROOT_INO {
        return Ok("/".to_string());
    }
    let inode = mount.inode(ino).ok_or_else(|| Error::new(ErrorKind::NotFound))?;
    let mut parts = Vec::new();
    let mut key = inode.owner;
    loop {
        let entry = mount.entry(key);
        match entry.parent {
            None => break,
            Some(parent) => {
                parts.push(entry.name.clone());
                key = parent;
            }
        }
    }
    parts.reverse();
    Ok(format!("/{}", parts.join("/")))
}

fn child_path(mount: &Mount, parent_fuse_ino: u64, name: &OsStr) -> crate::error::Result<String> {
    let name = name.to_str().ok_or_else(|| Error::new(ErrorKind::Invalid))?;
    let parent = ino_to_path(mount, core_ino(parent_fuse_ino))?;
    if parent == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

/// Adapts [`Mount`] and the [`ops`] façade to the kernel's FUSE protocol.
pub struct BlockFs {
    mount: Mount,
}

impl BlockFs {
    pub fn new(mount: Mount) -> Self {
        Self { mount }
    }
}

impl Filesystem for BlockFs {
    fn destroy(&mut self) {
        if let Err(e) = self.mount.unmount() {
            log::error!("unmount failed: {e}");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::getattr(&mut self.mount, &path) {
            Ok(attr) => reply.entry(&TTL, &to_file_attr(&attr), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::getattr(&mut self.mount, &path) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        if let Some(size) = size {
            if let Err(e) = ops::truncate(&mut self.mount, &path, size) {
                return reply.error(e.errno());
            }
        }
        let _ = ops::utimens(&mut self.mount, &path);
        match ops::getattr(&mut self.mount, &path) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        let mut buf = vec![0u8; size as usize];
        match ops::read(&mut self.mount, &path, offset.max(0) as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::write(&mut self.mount, &path, offset.max(0) as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        let entries = match ops::readdir(&mut self.mount, &path) {
            Ok(e) => e,
            Err(e) => return reply.error(e.errno()),
        };

        let mut fixed = vec![
            (fuse_ino(core_ino(ino)), FuseFileType::Directory, ".".to_string()),
            (fuse_ino(core_ino(ino)), FuseFileType::Directory, "..".to_string()),
        ];
        for e in entries {
            let kind = match e.ftype {
                CoreFileType::Directory => FuseFileType::Directory,
                CoreFileType::Regular => FuseFileType::RegularFile,
            };
            fixed.push((fuse_ino(e.ino), kind, e.name));
        }

        for (i, (entry_ino, kind, name)) in fixed.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let path = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::mkdir(&mut self.mount, &path) {
            Ok(attr) => reply.entry(&TTL, &to_file_attr(&attr), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::create(&mut self.mount, &path) {
            Ok(attr) => reply.created(&TTL, &to_file_attr(&attr), 0, 0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::unlink(&mut self.mount, &path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::rmdir(&mut self.mount, &path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = match child_path(&self.mount, parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        let to = match child_path(&self.mount, newparent, newname) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::rename(&mut self.mount, &from, &to) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let path = match ino_to_path(&self.mount, core_ino(ino)) {
            Ok(p) => p,
            Err(e) => return reply.error(e.errno()),
        };
        match ops::access(&mut self.mount, &path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }
}
