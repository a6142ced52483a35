//! Record locking over the replica set: probe for GETLK, all-or-rollback
//! for acquisition, broadcast for release.

use super::local::{AnyLocal, LockLocal, LockStep};
use super::HaVolume;

use crate::xlator::{
    ChildId, Errno, FileHandle, Flock, FopResult, LockCmd, LockType,
};

use futures::stream::{FuturesUnordered, StreamExt};

// HaVolume record locking
impl HaVolume {
    /// Record lock operation on an open handle.
    pub(super) async fn lock_all(
        &self,
        fd: &FileHandle,
        cmd: LockCmd,
        flock: &Flock,
    ) -> FopResult<Flock> {
        if cmd == LockCmd::GetLk {
            self.on_fd("lk", fd, |sv| async move { sv.lk(fd, cmd, flock).await })
                .await
        } else if flock.kind == LockType::Unlock {
            self.unlock_all(fd, cmd, flock).await
        } else {
            self.acquire_all(fd, cmd, flock).await
        }
    }

    /// Acquires on every live child holding the handle, one at a time
    /// starting at the handle's active child. If a child refuses, every
    /// lock granted so far is released before failing.
    async fn acquire_all(
        &self,
        fd: &FileHandle,
        cmd: LockCmd,
        flock: &Flock,
    ) -> FopResult<Flock> {
        let (retry, _) = self.retry_local_for_fd(fd)?;
        let (mut local, mut child) =
            match LockLocal::new(retry.snapshot(), retry.active()) {
                Some(ctx) => ctx,
                None => return Err(Errno::ENOTCONN),
            };

        loop {
            let reply = self.replicas.child(child).lk(fd, cmd, flock).await;
            match local.on_acquire_reply(child, reply) {
                LockStep::Acquire(next) => child = next,
                LockStep::Rollback(acquired) => {
                    pf_debug!(
                        "lk on fd {} refused by {}, rolling back {:?}",
                        fd.id,
                        self.replicas.child_name(child),
                        acquired
                    );
                    self.rollback(fd, flock, acquired).await;
                    break;
                }
                LockStep::Finalize => break,
            }
        }

        local.finalize()
    }

    /// Concurrently releases the lock on the given children.
    async fn rollback(&self, fd: &FileHandle, flock: &Flock, children: Vec<ChildId>) {
        let unlock = flock.as_unlock();
        let unlock = &unlock;
        let mut unlocks: FuturesUnordered<_> = children
            .into_iter()
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.lk(fd, LockCmd::SetLk, unlock).await) }
            })
            .collect();
        while let Some((c, reply)) = unlocks.next().await {
            if let Err(errno) = reply {
                pf_warn!(
                    "rollback unlock on {} for fd {} failed: {}",
                    self.replicas.child_name(c),
                    fd.id,
                    errno
                );
            }
        }
    }

    /// Broadcasts an unlock to every live child holding the handle;
    /// succeeds if any of them released.
    async fn unlock_all(
        &self,
        fd: &FileHandle,
        cmd: LockCmd,
        flock: &Flock,
    ) -> FopResult<Flock> {
        let (retry, _) = self.retry_local_for_fd(fd)?;
        let targets = retry.snapshot().ones_from(0);
        let mut local =
            AnyLocal::new(self.replicas.population(), targets.len() as u8, true);

        let mut unlocks: FuturesUnordered<_> = targets
            .into_iter()
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.lk(fd, cmd, flock).await) }
            })
            .collect();
        while let Some((c, reply)) = unlocks.next().await {
            if local.on_reply(c, reply) {
                break;
            }
        }

        local.finalize()
    }
}
