//! Block-device-backed filesystem core: geometry, on-disk codecs, the two
//! bitmap allocators, the in-memory inode/entry tree, the mount lifecycle,
//! the operation façade, and the FUSE binding.

pub mod bitmap;
pub mod dentry;
pub mod device;
pub mod error;
pub mod fuse_adapter;
pub mod geometry;
pub mod inode;
pub mod mount;
pub mod ondisk;
pub mod ops;
pub mod resolve;
