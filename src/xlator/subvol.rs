//! The uniform filesystem-operation interface every subvolume exposes.

use crate::xlator::{
    Checksum, DirEntry, EntryLockCmd, EntryLockType, Errno, FileHandle,
    Flock, FopResult, InodeNo, LockCmd, Loc, LookupReply, ReadReply, SetAttr,
    Stat, StatVfs, XattrOpKind, Xattrs, XlatorStats,
};

use async_trait::async_trait;

use bytes::Bytes;

/// A subvolume: one stage of the translator graph. Issuing an operation is
/// calling the method; the completion is the awaited result. Every fop
/// defaults to `ENOSYS` so that leaf implementations only need to provide
/// what they support.
#[async_trait]
pub trait Subvolume: Send + Sync {
    /// Name of this subvolume, used in logs.
    fn name(&self) -> &str;

    async fn lookup(&self, _loc: &Loc, _need_xattr: bool) -> FopResult<LookupReply> {
        Err(Errno::ENOSYS)
    }

    async fn stat(&self, _loc: &Loc) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn readlink(&self, _loc: &Loc, _size: usize) -> FopResult<String> {
        Err(Errno::ENOSYS)
    }

    async fn mknod(&self, _loc: &Loc, _mode: u32, _rdev: u64) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn mkdir(&self, _loc: &Loc, _mode: u32) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn unlink(&self, _loc: &Loc) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn rmdir(&self, _loc: &Loc) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn symlink(&self, _linkpath: &str, _loc: &Loc) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn rename(&self, _oldloc: &Loc, _newloc: &Loc) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn link(&self, _oldloc: &Loc, _newloc: &Loc) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn truncate(&self, _loc: &Loc, _offset: u64) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn access(&self, _loc: &Loc, _mask: u32) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn setattr(&self, _loc: &Loc, _attr: &SetAttr) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn open(&self, _loc: &Loc, _flags: i32, _fd: &FileHandle) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn create(
        &self,
        _loc: &Loc,
        _flags: i32,
        _mode: u32,
        _fd: &FileHandle,
    ) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn readv(&self, _fd: &FileHandle, _size: usize, _offset: u64) -> FopResult<ReadReply> {
        Err(Errno::ENOSYS)
    }

    async fn writev(&self, _fd: &FileHandle, _data: Bytes, _offset: u64) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn flush(&self, _fd: &FileHandle) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn fsync(&self, _fd: &FileHandle, _datasync: bool) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn fstat(&self, _fd: &FileHandle) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn ftruncate(&self, _fd: &FileHandle, _offset: u64) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn fsetattr(&self, _fd: &FileHandle, _attr: &SetAttr) -> FopResult<Stat> {
        Err(Errno::ENOSYS)
    }

    async fn opendir(&self, _loc: &Loc, _fd: &FileHandle) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn readdir(
        &self,
        _fd: &FileHandle,
        _size: usize,
        _offset: u64,
    ) -> FopResult<Vec<DirEntry>> {
        Err(Errno::ENOSYS)
    }

    async fn fsyncdir(&self, _fd: &FileHandle, _datasync: bool) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    /// Bulk directory listing with `flag`-selected entry kinds.
    async fn getdents(
        &self,
        _fd: &FileHandle,
        _size: usize,
        _offset: u64,
        _flag: i32,
    ) -> FopResult<Vec<DirEntry>> {
        Err(Errno::ENOSYS)
    }

    /// Bulk creation of directory entries under an open directory.
    async fn setdents(
        &self,
        _fd: &FileHandle,
        _flags: i32,
        _entries: &[DirEntry],
    ) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn statfs(&self, _loc: &Loc) -> FopResult<StatVfs> {
        Err(Errno::ENOSYS)
    }

    async fn setxattr(&self, _loc: &Loc, _xattrs: &Xattrs, _flags: i32) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn getxattr(&self, _loc: &Loc, _name: Option<&str>) -> FopResult<Xattrs> {
        Err(Errno::ENOSYS)
    }

    async fn removexattr(&self, _loc: &Loc, _name: &str) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn xattrop(
        &self,
        _loc: &Loc,
        _op: XattrOpKind,
        _xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        Err(Errno::ENOSYS)
    }

    async fn fxattrop(
        &self,
        _fd: &FileHandle,
        _op: XattrOpKind,
        _xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        Err(Errno::ENOSYS)
    }

    async fn lk(&self, _fd: &FileHandle, _cmd: LockCmd, _lock: &Flock) -> FopResult<Flock> {
        Err(Errno::ENOSYS)
    }

    async fn inodelk(&self, _loc: &Loc, _cmd: LockCmd, _lock: &Flock) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn entrylk(
        &self,
        _loc: &Loc,
        _basename: Option<&str>,
        _cmd: EntryLockCmd,
        _kind: EntryLockType,
    ) -> FopResult<()> {
        Err(Errno::ENOSYS)
    }

    async fn checksum(&self, _loc: &Loc, _flags: i32) -> FopResult<Checksum> {
        Err(Errno::ENOSYS)
    }

    async fn stats(&self, _flags: i32) -> FopResult<XlatorStats> {
        Err(Errno::ENOSYS)
    }

    async fn getspec(&self, _key: &str, _flags: i32) -> FopResult<String> {
        Err(Errno::ENOSYS)
    }

    /// The handle is being closed; no reply.
    async fn release(&self, _fd: &FileHandle) {}

    /// The upper layer dropped its last reference to the inode; no reply.
    async fn forget(&self, _inode: InodeNo) {}
}
