//! Binds the abstract block driver to a `std::fs::File`, and implements the
//! offset/length block I/O shim on top of it.
//!
//! Device geometry is queried with the same `ioctl`-based approach the host's
//! own disk utilities use (see `get_disk_size` in the host `utils` crate);
//! when the opened path is a plain file rather than a block/character
//! device (used for disk images and tests), geometry falls back to the
//! file's length and a fixed 512-byte sector, same as that helper does.

use crate::error::{Error, ErrorKind, Result};
use crate::geometry::BLOCK_SIZE;
use libc::ioctl;
use std::ffi::c_long;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: get the size of a block device, in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);
/// ioctl command: get the logical sector size of a block device.
const BLKSSZGET: c_long = ior!(0x12, 104, libc::c_int);

/// A block-addressable backing store, opened from a path.
///
/// All reads and writes go through [`Device::read`]/[`Device::write`], which
/// handle sector alignment; nothing else touches the file directly.
pub struct Device {
    file: File,
    sector_size: u64,
    size: u64,
}

impl Device {
    /// Opens `path` for reading and writing and queries its geometry.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::from)?;
        let (sector_size, size) = Self::query_geometry(&file)?;
        Ok(Self {
            file,
            sector_size,
            size,
        })
    }

    fn query_geometry(file: &File) -> Result<(u64, u64)> {
        let metadata = file.metadata().map_err(Error::from)?;
        let file_type = metadata.file_type();
        if file_type.is_block_device() || file_type.is_char_device() {
            let mut size: u64 = 0;
            let mut sector_size: libc::c_int = 0;
            let ret = unsafe { ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
            if ret < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            let ret = unsafe { ioctl(file.as_raw_fd(), BLKSSZGET as _, &mut sector_size) };
            if ret < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok((sector_size as u64, size))
        } else if file_type.is_file() {
            Ok((512, metadata.len()))
        } else {
            Err(Error::new(ErrorKind::Invalid))
        }
    }

    /// Sector size reported by the driver (`S`).
    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    /// Total device size in bytes, as reported by the driver.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads `buf.len()` bytes starting at `offset`, hiding sector alignment.
    ///
    /// Aligns `offset` down to the nearest block boundary, reads whole
    /// sectors into a scratch buffer, then copies out the requested range.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let (base, bias, span) = Self::align(offset, buf.len() as u64);
        let mut scratch = vec![0u8; span as usize];
        self.read_aligned(base, &mut scratch)?;
        buf.copy_from_slice(&scratch[bias as usize..bias as usize + buf.len()]);
        Ok(())
    }

    /// Writes `buf` starting at `offset`, read-modify-writing the sectors it
    /// overlaps.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let (base, bias, span) = Self::align(offset, buf.len() as u64);
        let mut scratch = vec![0u8; span as usize];
        self.read_aligned(base, &mut scratch)?;
        scratch[bias as usize..bias as usize + buf.len()].copy_from_slice(buf);
        self.write_aligned(base, &scratch)
    }

    /// Returns `(base, bias, span)`: `base` is `offset` rounded down to a
    /// block boundary, `bias` is the distance from `base` to `offset`, and
    /// `span` is `bias + size` rounded up to a block multiple.
    fn align(offset: u64, size: u64) -> (u64, u64, u64) {
        let base = (offset / BLOCK_SIZE) * BLOCK_SIZE;
        let bias = offset - base;
        let total = bias + size;
        let span = if total % BLOCK_SIZE == 0 {
            total
        } else {
            (total / BLOCK_SIZE + 1) * BLOCK_SIZE
        };
        (base, bias, span)
    }

    /// Reads `buf.len()` bytes, block-aligned, as a sequence of single-sector
    /// transfers.
    fn read_aligned(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map_err(Error::from)?;
        let sector = self.sector_size as usize;
        for chunk in buf.chunks_mut(sector) {
            self.file.read_exact(chunk).map_err(Error::from)?;
        }
        Ok(())
    }

    /// Writes `buf`, block-aligned, as a sequence of single-sector transfers.
    fn write_aligned(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map_err(Error::from)?;
        let sector = self.sector_size as usize;
        for chunk in buf.chunks(sector) {
            self.file.write_all(chunk).map_err(Error::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn round_trips_unaligned_writes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; crate::geometry::DEVICE_SIZE as usize])
            .unwrap();
        let mut dev = Device::open(tmp.path()).unwrap();
        assert_eq!(dev.sector_size(), 512);
        dev.write(100, b"hello").unwrap();
        let mut buf = [0u8; 5];
        dev.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        // Overlapping write at a different bias within the same block.
        dev.write(103, b"world!!").unwrap();
        let mut buf = [0u8; 7];
        dev.read(103, &mut buf).unwrap();
        assert_eq!(&buf, b"world!!");
        let mut buf = [0u8; 3];
        dev.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hel");
    }
}
