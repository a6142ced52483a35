//! The HA volume's own filesystem-operation surface, so that it can sit
//! anywhere a single child could.

use super::local::AnyLocal;
use super::state::FileHandleState;
use super::HaVolume;

use crate::utils::Bitmap;
use crate::xlator::{
    ChildId, Checksum, DirEntry, EntryLockCmd, EntryLockType, FileHandle, Flock,
    FopResult, InodeNo, LockCmd, Loc, LookupReply, ReadReply, SetAttr, Stat,
    StatVfs, Subvolume, XattrOpKind, Xattrs, XlatorStats,
};

use async_trait::async_trait;

use bytes::Bytes;

use futures::stream::{FuturesUnordered, StreamExt};

// HaVolume handle replication
impl HaVolume {
    /// Opens `fd` concurrently on `targets`, none of which took part in the
    /// authoritative call on `active`. Returns the handle's presence: the
    /// active child plus every target where the open succeeded.
    async fn open_on_replicas(
        &self,
        loc: &Loc,
        flags: i32,
        fd: &FileHandle,
        active: ChildId,
        targets: Vec<ChildId>,
    ) -> Bitmap {
        let mut present = Bitmap::new(self.replicas.population(), false);
        let _ = present.set(active, true);

        let mut opens: FuturesUnordered<_> = targets
            .into_iter()
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.open(loc, flags, fd).await) }
            })
            .collect();
        while let Some((c, reply)) = opens.next().await {
            match reply {
                Ok(()) => {
                    let _ = present.set(c, true);
                }
                Err(errno) => pf_debug!(
                    "open {} fd {} failed on {}: {}",
                    loc.path,
                    fd.id,
                    self.replicas.child_name(c),
                    errno
                ),
            }
        }

        present
    }
}

#[async_trait]
impl Subvolume for HaVolume {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, loc: &Loc, need_xattr: bool) -> FopResult<LookupReply> {
        self.lookup_all(loc, need_xattr).await
    }

    async fn stat(&self, loc: &Loc) -> FopResult<Stat> {
        self.on_inode("stat", loc.inode, |sv| async move { sv.stat(loc).await })
            .await
    }

    async fn readlink(&self, loc: &Loc, size: usize) -> FopResult<String> {
        self.on_inode("readlink", loc.inode, |sv| async move {
            sv.readlink(loc, size).await
        })
        .await
    }

    async fn mknod(&self, loc: &Loc, mode: u32, rdev: u64) -> FopResult<Stat> {
        self.fan_out_entry("mknod", loc, 0, |sv, _| async move {
            sv.mknod(loc, mode, rdev).await
        })
        .await
        .map(|(_, stat)| stat)
    }

    async fn mkdir(&self, loc: &Loc, mode: u32) -> FopResult<Stat> {
        self.fan_out_entry("mkdir", loc, 0, |sv, _| async move {
            sv.mkdir(loc, mode).await
        })
        .await
        .map(|(_, stat)| stat)
    }

    async fn unlink(&self, loc: &Loc) -> FopResult<()> {
        self.on_inode("unlink", loc.inode, |sv| async move { sv.unlink(loc).await })
            .await
    }

    async fn rmdir(&self, loc: &Loc) -> FopResult<()> {
        self.on_inode("rmdir", loc.inode, |sv| async move { sv.rmdir(loc).await })
            .await
    }

    async fn symlink(&self, linkpath: &str, loc: &Loc) -> FopResult<Stat> {
        self.fan_out_entry("symlink", loc, 0, |sv, _| async move {
            sv.symlink(linkpath, loc).await
        })
        .await
        .map(|(_, stat)| stat)
    }

    async fn rename(&self, oldloc: &Loc, newloc: &Loc) -> FopResult<Stat> {
        self.on_inode("rename", oldloc.inode, |sv| async move {
            sv.rename(oldloc, newloc).await
        })
        .await
    }

    async fn link(&self, oldloc: &Loc, newloc: &Loc) -> FopResult<Stat> {
        // the new entry names the old inode; heal lookups go to the new path
        let target = Loc {
            inode: oldloc.inode,
            ..newloc.clone()
        };
        self.fan_out_entry("link", &target, 0, |sv, _| async move {
            sv.link(oldloc, newloc).await
        })
        .await
        .map(|(_, stat)| stat)
    }

    async fn truncate(&self, loc: &Loc, offset: u64) -> FopResult<Stat> {
        self.on_inode("truncate", loc.inode, |sv| async move {
            sv.truncate(loc, offset).await
        })
        .await
    }

    async fn access(&self, loc: &Loc, mask: u32) -> FopResult<()> {
        self.on_inode("access", loc.inode, |sv| async move {
            sv.access(loc, mask).await
        })
        .await
    }

    async fn setattr(&self, loc: &Loc, attr: &SetAttr) -> FopResult<Stat> {
        self.on_inode("setattr", loc.inode, |sv| async move {
            sv.setattr(loc, attr).await
        })
        .await
    }

    async fn open(&self, loc: &Loc, flags: i32, fd: &FileHandle) -> FopResult<()> {
        let mut local = match self.retry_local_for_inode(loc.inode) {
            Ok(local) => local,
            Err(errno) => {
                pf_error!("open: no active subvolume for {}", loc.path);
                return Err(errno);
            }
        };
        let (child, result) = self
            .replay_until_final("open", &mut local, |sv| async move {
                sv.open(loc, flags, fd).await
            })
            .await;

        if result.is_ok() {
            // the answering child is authoritative; the remaining reachable
            // candidates get the handle too so that it can fail over
            let others: Vec<ChildId> = local
                .snapshot()
                .ones_from(0)
                .into_iter()
                .filter(|&c| c != child)
                .collect();
            let present =
                self.open_on_replicas(loc, flags, fd, child, others).await;
            self.fds.insert(
                fd.id,
                FileHandleState::new(present, &loc.path, Some(child)),
            );
        }
        result
    }

    async fn create(
        &self,
        loc: &Loc,
        flags: i32,
        mode: u32,
        fd: &FileHandle,
    ) -> FopResult<Stat> {
        let (child, stat) = self
            .fan_out_entry("create", loc, flags, |sv, flags| async move {
                sv.create(loc, flags, mode, fd).await
            })
            .await?;

        // healed children hold the file but have not opened it
        let healed: Vec<ChildId> = match self.inodes.get(loc.inode) {
            Some(state) => state
                .snapshot()
                .ones_from(0)
                .into_iter()
                .filter(|&c| c != child)
                .collect(),
            None => vec![],
        };
        let open_flags = flags & !(libc::O_CREAT | libc::O_EXCL);
        let present =
            self.open_on_replicas(loc, open_flags, fd, child, healed).await;
        self.fds.insert(
            fd.id,
            FileHandleState::new(present, &loc.path, Some(child)),
        );
        Ok(stat)
    }

    async fn readv(&self, fd: &FileHandle, size: usize, offset: u64) -> FopResult<ReadReply> {
        self.on_fd("readv", fd, |sv| async move { sv.readv(fd, size, offset).await })
            .await
    }

    async fn writev(&self, fd: &FileHandle, data: Bytes, offset: u64) -> FopResult<Stat> {
        self.on_fd("writev", fd, |sv| {
            let data = data.clone();
            async move { sv.writev(fd, data, offset).await }
        })
        .await
    }

    async fn flush(&self, fd: &FileHandle) -> FopResult<()> {
        self.on_fd("flush", fd, |sv| async move { sv.flush(fd).await })
            .await
    }

    async fn fsync(&self, fd: &FileHandle, datasync: bool) -> FopResult<()> {
        self.on_fd("fsync", fd, |sv| async move { sv.fsync(fd, datasync).await })
            .await
    }

    async fn fstat(&self, fd: &FileHandle) -> FopResult<Stat> {
        self.on_fd("fstat", fd, |sv| async move { sv.fstat(fd).await })
            .await
    }

    async fn ftruncate(&self, fd: &FileHandle, offset: u64) -> FopResult<Stat> {
        self.on_fd("ftruncate", fd, |sv| async move {
            sv.ftruncate(fd, offset).await
        })
        .await
    }

    async fn fsetattr(&self, fd: &FileHandle, attr: &SetAttr) -> FopResult<Stat> {
        self.on_fd("fsetattr", fd, |sv| async move {
            sv.fsetattr(fd, attr).await
        })
        .await
    }

    async fn opendir(&self, loc: &Loc, fd: &FileHandle) -> FopResult<()> {
        let local = match self.retry_local_for_inode(loc.inode) {
            Ok(local) => local,
            Err(errno) => {
                pf_error!("opendir: no active subvolume for {}", loc.path);
                return Err(errno);
            }
        };
        let targets = local.snapshot().ones_from(0);
        let mut any =
            AnyLocal::new(self.replicas.population(), targets.len() as u8, false);

        let mut opens: FuturesUnordered<_> = targets
            .into_iter()
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.opendir(loc, fd).await) }
            })
            .collect();
        while let Some((c, reply)) = opens.next().await {
            if any.on_reply(c, reply) {
                break;
            }
        }

        if let Some(state) = self.inodes.get(loc.inode) {
            for &c in any.unreachable() {
                state.mark(c, false);
            }
        }
        if !any.succeeded().is_clear() {
            self.fds.insert(
                fd.id,
                FileHandleState::new(
                    any.succeeded().clone(),
                    &loc.path,
                    any.succeeded().first_set(),
                ),
            );
        }
        any.finalize()
    }

    async fn readdir(
        &self,
        fd: &FileHandle,
        size: usize,
        offset: u64,
    ) -> FopResult<Vec<DirEntry>> {
        self.on_fd("readdir", fd, |sv| async move {
            sv.readdir(fd, size, offset).await
        })
        .await
    }

    async fn fsyncdir(&self, fd: &FileHandle, datasync: bool) -> FopResult<()> {
        self.on_fd("fsyncdir", fd, |sv| async move {
            sv.fsyncdir(fd, datasync).await
        })
        .await
    }

    async fn getdents(
        &self,
        fd: &FileHandle,
        size: usize,
        offset: u64,
        flag: i32,
    ) -> FopResult<Vec<DirEntry>> {
        self.on_fd("getdents", fd, |sv| async move {
            sv.getdents(fd, size, offset, flag).await
        })
        .await
    }

    async fn setdents(
        &self,
        fd: &FileHandle,
        flags: i32,
        entries: &[DirEntry],
    ) -> FopResult<()> {
        self.on_fd("setdents", fd, |sv| async move {
            sv.setdents(fd, flags, entries).await
        })
        .await
    }

    async fn statfs(&self, loc: &Loc) -> FopResult<StatVfs> {
        self.on_any("statfs", |sv| async move { sv.statfs(loc).await })
            .await
    }

    async fn setxattr(&self, loc: &Loc, xattrs: &Xattrs, flags: i32) -> FopResult<()> {
        self.on_inode("setxattr", loc.inode, |sv| async move {
            sv.setxattr(loc, xattrs, flags).await
        })
        .await
    }

    async fn getxattr(&self, loc: &Loc, name: Option<&str>) -> FopResult<Xattrs> {
        self.on_inode("getxattr", loc.inode, |sv| async move {
            sv.getxattr(loc, name).await
        })
        .await
    }

    async fn removexattr(&self, loc: &Loc, name: &str) -> FopResult<()> {
        self.on_inode("removexattr", loc.inode, |sv| async move {
            sv.removexattr(loc, name).await
        })
        .await
    }

    async fn xattrop(
        &self,
        loc: &Loc,
        op: XattrOpKind,
        xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        self.on_inode("xattrop", loc.inode, |sv| async move {
            sv.xattrop(loc, op, xattrs).await
        })
        .await
    }

    async fn fxattrop(
        &self,
        fd: &FileHandle,
        op: XattrOpKind,
        xattrs: &Xattrs,
    ) -> FopResult<Xattrs> {
        self.on_fd("fxattrop", fd, |sv| async move {
            sv.fxattrop(fd, op, xattrs).await
        })
        .await
    }

    async fn lk(&self, fd: &FileHandle, cmd: LockCmd, lock: &Flock) -> FopResult<Flock> {
        self.lock_all(fd, cmd, lock).await
    }

    async fn inodelk(&self, loc: &Loc, cmd: LockCmd, lock: &Flock) -> FopResult<()> {
        self.on_inode("inodelk", loc.inode, |sv| async move {
            sv.inodelk(loc, cmd, lock).await
        })
        .await
    }

    async fn entrylk(
        &self,
        loc: &Loc,
        basename: Option<&str>,
        cmd: EntryLockCmd,
        kind: EntryLockType,
    ) -> FopResult<()> {
        self.on_inode("entrylk", loc.inode, |sv| async move {
            sv.entrylk(loc, basename, cmd, kind).await
        })
        .await
    }

    async fn checksum(&self, loc: &Loc, flags: i32) -> FopResult<Checksum> {
        self.on_inode("checksum", loc.inode, |sv| async move {
            sv.checksum(loc, flags).await
        })
        .await
    }

    async fn stats(&self, flags: i32) -> FopResult<XlatorStats> {
        self.on_any("stats", |sv| async move { sv.stats(flags).await })
            .await
    }

    async fn getspec(&self, key: &str, flags: i32) -> FopResult<String> {
        self.on_any("getspec", |sv| async move { sv.getspec(key, flags).await })
            .await
    }

    async fn release(&self, fd: &FileHandle) {
        let mut releases: FuturesUnordered<_> = (0..self.replicas.population())
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { sv.release(fd).await }
            })
            .collect();
        while releases.next().await.is_some() {}

        match self.fds.remove(fd.id) {
            Some(state) => pf_trace!("released fd {} {}", fd.id, state.path()),
            None => pf_debug!("release of fd {} without handle state", fd.id),
        }
    }

    async fn forget(&self, inode: InodeNo) {
        let mut forgets: FuturesUnordered<_> = (0..self.replicas.population())
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { sv.forget(inode).await }
            })
            .collect();
        while forgets.next().await.is_some() {}

        self.inodes.remove(inode);
    }
}
