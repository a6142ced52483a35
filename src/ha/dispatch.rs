//! Single-target dispatch with rotate-on-disconnect, and ordered fallback
//! for management operations.

use std::future::Future;
use std::sync::Arc;

use super::local::{RetryLocal, RetryStep};
use super::state::FileHandleState;
use super::HaVolume;

use crate::xlator::{ChildId, Errno, FileHandle, FopResult, InodeNo, Subvolume};

// HaVolume single-target dispatch helpers
impl HaVolume {
    /// Issues the saved `call` on the context's active child, replaying it
    /// on the next candidate whenever the target turns out unreachable.
    /// Returns the child that produced the final result along with it.
    pub(super) async fn replay_until_final<T, F, Fut>(
        &self,
        fop: &'static str,
        local: &mut RetryLocal,
        call: F,
    ) -> (ChildId, FopResult<T>)
    where
        F: Fn(Arc<dyn Subvolume>) -> Fut,
        Fut: Future<Output = FopResult<T>>,
    {
        let mut child = local.active();
        loop {
            let reply = call(self.replicas.child(child)).await;
            match local.on_reply(child, reply) {
                RetryStep::Resend(next) => {
                    pf_debug!(
                        "{} failing over {} -> {}",
                        fop,
                        self.replicas.child_name(child),
                        self.replicas.child_name(next)
                    );
                    child = next;
                }
                RetryStep::Finalize(result) => {
                    if let Err(errno) = result {
                        if errno.is_disconnect(true) {
                            pf_error!("{}: no active subvolume", fop);
                        }
                    }
                    return (child, result);
                }
            }
        }
    }

    /// Context for an inode-scoped op: candidates are the live children
    /// known to hold the inode, or every live child if none is known.
    pub(super) fn retry_local_for_inode(
        &self,
        inode: InodeNo,
    ) -> FopResult<RetryLocal> {
        let live = self.replicas.live_snapshot();
        let snapshot = match self.inodes.get(inode) {
            Some(state) => {
                let known = live.and(&state.snapshot());
                if known.is_clear() {
                    live
                } else {
                    known
                }
            }
            None => live,
        };

        RetryLocal::new(snapshot, self.replicas.preferred(), false)
            .ok_or(Errno::ENOTCONN)
    }

    /// Context for a handle-scoped op: candidates are the live children
    /// that have the handle open.
    pub(super) fn retry_local_for_fd(
        &self,
        fd: &FileHandle,
    ) -> FopResult<(RetryLocal, Arc<FileHandleState>)> {
        let state = match self.fds.get(fd.id) {
            Some(state) => state,
            None => {
                pf_warn!("no handle state for fd {}", fd.id);
                return Err(Errno::EBADFD);
            }
        };
        let snapshot = self.replicas.live_snapshot().and(&state.snapshot());
        let preferred =
            state.preferred_active().or(self.replicas.preferred());

        let local = RetryLocal::new(snapshot, preferred, true)
            .ok_or(Errno::ENOTCONN)?;
        Ok((local, state))
    }

    /// Single-target inode-scoped operation.
    pub(super) async fn on_inode<T, F, Fut>(
        &self,
        fop: &'static str,
        inode: InodeNo,
        call: F,
    ) -> FopResult<T>
    where
        F: Fn(Arc<dyn Subvolume>) -> Fut,
        Fut: Future<Output = FopResult<T>>,
    {
        let mut local = match self.retry_local_for_inode(inode) {
            Ok(local) => local,
            Err(errno) => {
                pf_error!("{}: no active subvolume", fop);
                return Err(errno);
            }
        };
        self.replay_until_final(fop, &mut local, call).await.1
    }

    /// Single-target handle-scoped operation. The child that answers
    /// becomes the handle's preferred active child.
    pub(super) async fn on_fd<T, F, Fut>(
        &self,
        fop: &'static str,
        fd: &FileHandle,
        call: F,
    ) -> FopResult<T>
    where
        F: Fn(Arc<dyn Subvolume>) -> Fut,
        Fut: Future<Output = FopResult<T>>,
    {
        let (mut local, state) = match self.retry_local_for_fd(fd) {
            Ok(ctx) => ctx,
            Err(errno) => {
                pf_error!("{}: no active subvolume for fd {}", fop, fd.id);
                return Err(errno);
            }
        };
        let (child, result) =
            self.replay_until_final(fop, &mut local, call).await;
        if result.is_ok() {
            state.set_preferred_active(child);
        }
        result
    }

    /// Ordered fallback for operations with no per-file state: start at
    /// the preferred (or first live) child, move on to the next live one
    /// on disconnect, going through the whole set at most once.
    pub(super) async fn on_any<T, F, Fut>(
        &self,
        fop: &'static str,
        call: F,
    ) -> FopResult<T>
    where
        F: Fn(Arc<dyn Subvolume>) -> Fut,
        Fut: Future<Output = FopResult<T>>,
    {
        let live = self.replicas.live_snapshot();
        let mut local =
            match RetryLocal::new(live, self.replicas.preferred(), false) {
                Some(local) => local.with_tries(self.replicas.population()),
                None => {
                    pf_error!("{}: none of the children are connected", fop);
                    return Err(Errno::ENOTCONN);
                }
            };
        self.replay_until_final(fop, &mut local, call).await.1
    }
}
