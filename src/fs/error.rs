//! Error kinds and their mapping to POSIX errno values.
//!
//! Internal helpers return `Result<T, Error>`; only the FUSE binding
//! (`fuse_adapter`) converts an `Error` to a negative errno, at the single
//! point where a reply is sent back to the kernel.

use std::fmt;
use std::io;

/// The kind of failure a core operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A path component is missing.
    NotFound,
    /// A create/mkdir target already exists.
    Exists,
    /// An inode or data bitmap is exhausted, or a write would exceed the
    /// per-file block budget.
    NoSpace,
    /// The driver failed a read or write, or returned a short transfer.
    Io,
    /// A malformed path or entry name.
    Invalid,
    /// A read/write offset is at or beyond `DATA_PER_FILE * BLOCK_SIZE`.
    Seek,
    /// The operation requires a regular file but found a directory.
    IsDir,
    /// The operation requires a directory but found a regular file.
    NotDir,
    /// The operation is not implemented (links).
    Unsupported,
    /// Reserved for the fixed-permission model.
    Access,
    /// `rmdir` on a directory that still has entries.
    NotEmpty,
}

impl ErrorKind {
    /// Maps this kind to the negative errno the host expects.
    pub fn errno(self) -> i32 {
        let code = match self {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::Exists => libc::EEXIST,
            ErrorKind::NoSpace => libc::ENOSPC,
            ErrorKind::Io => libc::EIO,
            ErrorKind::Invalid => libc::EINVAL,
            ErrorKind::Seek => libc::ESPIPE,
            ErrorKind::IsDir => libc::EISDIR,
            ErrorKind::NotDir => libc::ENOTDIR,
            ErrorKind::Unsupported => libc::ENXIO,
            ErrorKind::Access => libc::EACCES,
            ErrorKind::NotEmpty => libc::ENOTEMPTY,
        };
        code
    }
}

/// An error produced by the filesystem core.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<io::Error>,
}

impl Error {
    /// Builds an error of the given kind with no underlying I/O cause.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The negative errno the host expects for this error.
    pub fn errno(&self) -> i32 {
        self.kind.errno()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {src}", self.kind),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as _)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: Some(e),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Shorthand result type used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
