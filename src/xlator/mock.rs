//! Scriptable in-memory subvolume for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::xlator::{
    ChildId, Checksum, DirEntry, EntryLockCmd, EntryLockType, Errno,
    FileHandle, Flock, FopResult, InodeNo, LockCmd, LockType, Loc,
    LookupReply, ReadReply, SetAttr, Stat, StatVfs, Subvolume, XattrOpKind,
    Xattrs, XlatorStats,
};

use async_trait::async_trait;

use bytes::Bytes;

#[derive(Default)]
struct MockInner {
    /// Unreachable: every fop answers with a disconnect status.
    down: bool,

    /// Sticky failure per fop name.
    fail: HashMap<&'static str, Errno>,

    /// One-shot outcomes per fop name, consumed before anything else.
    script: HashMap<&'static str, VecDeque<Result<(), Errno>>>,

    /// Every fop issued, in order.
    calls: Vec<&'static str>,

    /// Number of record locks currently granted.
    locks_held: usize,

    /// Flags seen by the last `create`.
    last_create_flags: Option<i32>,

    /// Flags seen by the last `open`.
    last_open_flags: Option<i32>,
}

/// Mock child. Attributes it returns carry its own index in `Stat::dev`, so
/// tests can tell which child answered.
pub(crate) struct MockSubvol {
    id: ChildId,
    name: String,
    inner: Mutex<MockInner>,
}

impl MockSubvol {
    pub(crate) fn new(id: ChildId) -> Arc<Self> {
        Arc::new(MockSubvol {
            id,
            name: format!("mock-{}", id),
            inner: Mutex::new(MockInner::default()),
        })
    }

    /// Creates `n` mocks plus the same list coerced for a translator.
    pub(crate) fn group(
        n: u8,
    ) -> (Vec<Arc<MockSubvol>>, Vec<Arc<dyn Subvolume>>) {
        let mocks: Vec<Arc<MockSubvol>> = (0..n).map(MockSubvol::new).collect();
        let children = mocks
            .iter()
            .map(|m| m.clone() as Arc<dyn Subvolume>)
            .collect();
        (mocks, children)
    }

    pub(crate) fn set_down(&self, down: bool) {
        self.inner.lock().unwrap().down = down;
    }

    pub(crate) fn fail(&self, fop: &'static str, errno: Errno) {
        self.inner.lock().unwrap().fail.insert(fop, errno);
    }

    pub(crate) fn script(
        &self,
        fop: &'static str,
        outcomes: Vec<Result<(), Errno>>,
    ) {
        self.inner
            .lock()
            .unwrap()
            .script
            .entry(fop)
            .or_default()
            .extend(outcomes);
    }

    pub(crate) fn calls(&self, fop: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|&&c| c == fop)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub(crate) fn locks_held(&self) -> usize {
        self.inner.lock().unwrap().locks_held
    }

    pub(crate) fn last_create_flags(&self) -> Option<i32> {
        self.inner.lock().unwrap().last_create_flags
    }

    pub(crate) fn last_open_flags(&self) -> Option<i32> {
        self.inner.lock().unwrap().last_open_flags
    }

    fn outcome(&self, fop: &'static str, fd_scoped: bool) -> FopResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(fop);
        if let Some(out) = inner.script.get_mut(fop).and_then(|q| q.pop_front())
        {
            return out;
        }
        if inner.down {
            return Err(if fd_scoped {
                Errno::EBADFD
            } else {
                Errno::ENOTCONN
            });
        }
        match inner.fail.get(fop) {
            Some(&errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn stat_of(&self, ino: InodeNo) -> Stat {
        Stat {
            ino,
            dev: self.id as u64,
            nlink: 1,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Subvolume for MockSubvol {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, loc: &Loc, _need_xattr: bool) -> FopResult<LookupReply> {
        self.outcome("lookup", false)?;
        Ok(LookupReply {
            stat: self.stat_of(loc.inode),
            xattrs: Xattrs::new(),
        })
    }

    async fn stat(&self, loc: &Loc) -> FopResult<Stat> {
        self.outcome("stat", false)?;
        Ok(self.stat_of(loc.inode))
    }

    async fn readlink(&self, _loc: &Loc, _size: usize) -> FopResult<String> {
        self.outcome("readlink", false)?;
        Ok(format!("target-on-{}", self.id))
    }

    async fn mknod(&self, loc: &Loc, _mode: u32, _rdev: u64) -> FopResult<Stat> {
        self.outcome("mknod", false)?;
        Ok(self.stat_of(loc.inode))
    }

    async fn mkdir(&self, loc: &Loc, _mode: u32) -> FopResult<Stat> {
        self.outcome("mkdir", false)?;
        Ok(self.stat_of(loc.inode))
    }

    async fn unlink(&self, _loc: &Loc) -> FopResult<()> {
        self.outcome("unlink", false)
    }

    async fn rmdir(&self, _loc: &Loc) -> FopResult<()> {
        self.outcome("rmdir", false)
    }

    async fn symlink(&self, _linkpath: &str, loc: &Loc) -> FopResult<Stat> {
        self.outcome("symlink", false)?;
        Ok(self.stat_of(loc.inode))
    }

    async fn rename(&self, oldloc: &Loc, _newloc: &Loc) -> FopResult<Stat> {
        self.outcome("rename", false)?;
        Ok(self.stat_of(oldloc.inode))
    }

    async fn link(&self, oldloc: &Loc, _newloc: &Loc) -> FopResult<Stat> {
        self.outcome("link", false)?;
        Ok(self.stat_of(oldloc.inode))
    }

    async fn truncate(&self, loc: &Loc, offset: u64) -> FopResult<Stat> {
        self.outcome("truncate", false)?;
        Ok(Stat {
            size: offset,
            ..self.stat_of(loc.inode)
        })
    }

    async fn access(&self, _loc: &Loc, _mask: u32) -> FopResult<()> {
        self.outcome("access", false)
    }

    async fn setattr(&self, loc: &Loc, attr: &SetAttr) -> FopResult<Stat> {
        self.outcome("setattr", false)?;
        Ok(Stat {
            mode: attr.mode.unwrap_or(0),
            ..self.stat_of(loc.inode)
        })
    }

    async fn open(&self, _loc: &Loc, flags: i32, _fd: &FileHandle) -> FopResult<()> {
        self.inner.lock().unwrap().last_open_flags = Some(flags);
        self.outcome("open", false)
    }

    async fn create(
        &self,
        loc: &Loc,
        flags: i32,
        _mode: u32,
        _fd: &FileHandle,
    ) -> FopResult<Stat> {
        self.inner.lock().unwrap().last_create_flags = Some(flags);
        self.outcome("create", false)?;
        Ok(self.stat_of(loc.inode))
    }

    async fn readv(&self, fd: &FileHandle, size: usize, _offset: u64) -> FopResult<ReadReply> {
        self.outcome("readv", true)?;
        Ok(ReadReply {
            data: Bytes::from(vec![self.id; size]),
            stat: self.stat_of(fd.inode),
        })
    }

    async fn writev(&self, fd: &FileHandle, data: Bytes, offset: u64) -> FopResult<Stat> {
        self.outcome("writev", true)?;
        Ok(Stat {
            size: offset + data.len() as u64,
            ..self.stat_of(fd.inode)
        })
    }

    async fn flush(&self, _fd: &FileHandle) -> FopResult<()> {
        self.outcome("flush", true)
    }

    async fn fsync(&self, _fd: &FileHandle, _datasync: bool) -> FopResult<()> {
        self.outcome("fsync", true)
    }

    async fn fstat(&self, fd: &FileHandle) -> FopResult<Stat> {
        self.outcome("fstat", true)?;
        Ok(self.stat_of(fd.inode))
    }

    async fn ftruncate(&self, fd: &FileHandle, offset: u64) -> FopResult<Stat> {
        self.outcome("ftruncate", true)?;
        Ok(Stat {
            size: offset,
            ..self.stat_of(fd.inode)
        })
    }

    async fn fsetattr(&self, fd: &FileHandle, _attr: &SetAttr) -> FopResult<Stat> {
        self.outcome("fsetattr", true)?;
        Ok(self.stat_of(fd.inode))
    }

    async fn opendir(&self, _loc: &Loc, _fd: &FileHandle) -> FopResult<()> {
        self.outcome("opendir", false)
    }

    async fn readdir(
        &self,
        _fd: &FileHandle,
        _size: usize,
        offset: u64,
    ) -> FopResult<Vec<DirEntry>> {
        self.outcome("readdir", true)?;
        Ok(vec![DirEntry {
            name: format!("entry-{}", self.id),
            ino: 100 + self.id as u64,
            offset: offset + 1,
        }])
    }

    async fn fsyncdir(&self, _fd: &FileHandle, _datasync: bool) -> FopResult<()> {
        self.outcome("fsyncdir", true)
    }

    async fn getdents(
        &self,
        _fd: &FileHandle,
        size: usize,
        offset: u64,
        _flag: i32,
    ) -> FopResult<Vec<DirEntry>> {
        self.outcome("getdents", true)?;
        Ok((0..size.min(2) as u64)
            .map(|i| DirEntry {
                name: format!("dent-{}-{}", self.id, i),
                ino: 200 + i,
                offset: offset + i + 1,
            })
            .collect())
    }

    async fn setdents(
        &self,
        _fd: &FileHandle,
        _flags: i32,
        _entries: &[DirEntry],
    ) -> FopResult<()> {
        self.outcome("setdents", true)
    }

    async fn statfs(&self, _loc: &Loc) -> FopResult<StatVfs> {
        self.outcome("statfs", false)?;
        Ok(StatVfs {
            bsize: 4096,
            files: self.id as u64,
            ..Default::default()
        })
    }

    async fn setxattr(&self, _loc: &Loc, _xattrs: &Xattrs, _flags: i32) -> FopResult<()> {
        self.outcome("setxattr", false)
    }

    async fn getxattr(&self, _loc: &Loc, name: Option<&str>) -> FopResult<Xattrs> {
        self.outcome("getxattr", false)?;
        let mut xattrs = Xattrs::new();
        xattrs.insert(
            name.unwrap_or("trusted.child").to_string(),
            Bytes::from(vec![self.id]),
        );
        Ok(xattrs)
    }

    async fn removexattr(&self, _loc: &Loc, _name: &str) -> FopResult<()> {
        self.outcome("removexattr", false)
    }

    async fn xattrop(
        &self,
        _loc: &Loc,
        _op: XattrOpKind,
        xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        self.outcome("xattrop", false)?;
        Ok(xattrs.clone())
    }

    async fn fxattrop(
        &self,
        _fd: &FileHandle,
        _op: XattrOpKind,
        xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        self.outcome("fxattrop", true)?;
        Ok(xattrs.clone())
    }

    async fn lk(&self, _fd: &FileHandle, cmd: LockCmd, lock: &Flock) -> FopResult<Flock> {
        self.outcome("lk", true)?;
        if cmd != LockCmd::GetLk {
            let mut inner = self.inner.lock().unwrap();
            if lock.kind == LockType::Unlock {
                inner.locks_held = inner.locks_held.saturating_sub(1);
            } else {
                inner.locks_held += 1;
            }
        }
        Ok(Flock {
            pid: self.id as u32,
            ..lock.clone()
        })
    }

    async fn inodelk(&self, _loc: &Loc, _cmd: LockCmd, _lock: &Flock) -> FopResult<()> {
        self.outcome("inodelk", false)
    }

    async fn entrylk(
        &self,
        _loc: &Loc,
        _basename: Option<&str>,
        _cmd: EntryLockCmd,
        _kind: EntryLockType,
    ) -> FopResult<()> {
        self.outcome("entrylk", false)
    }

    async fn checksum(&self, _loc: &Loc, _flags: i32) -> FopResult<Checksum> {
        self.outcome("checksum", false)?;
        Ok(Checksum {
            file: Bytes::from(vec![self.id]),
            dir: Bytes::new(),
        })
    }

    async fn stats(&self, _flags: i32) -> FopResult<XlatorStats> {
        self.outcome("stats", false)?;
        Ok(XlatorStats {
            nr_files: self.id as u64,
            ..Default::default()
        })
    }

    async fn getspec(&self, key: &str, _flags: i32) -> FopResult<String> {
        self.outcome("getspec", false)?;
        Ok(format!("{}@{}", key, self.id))
    }

    async fn release(&self, _fd: &FileHandle) {
        self.inner.lock().unwrap().calls.push("release");
    }

    async fn forget(&self, _inode: InodeNo) {
        self.inner.lock().unwrap().calls.push("forget");
    }
}
