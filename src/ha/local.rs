//! Per-operation contexts: one small state machine per dispatch pattern.
//! Each is created on the first dispatch of a client-visible operation,
//! fed every completion tagged with the child that produced it, and
//! consumed when the operation finalizes.

use std::collections::VecDeque;

use crate::utils::Bitmap;
use crate::xlator::{ChildId, Errno, Flock, FopResult, LookupReply};

use super::state::InodeState;

/// What a single-target operation should do after a completion.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RetryStep<T> {
    /// Replay the saved call against this child.
    Resend(ChildId),

    /// Reply upward with this result.
    Finalize(FopResult<T>),
}

/// Context of a single-target operation with rotate-on-disconnect, also
/// used for ordered fallback of management ops.
#[derive(Debug)]
pub(crate) struct RetryLocal {
    /// Whether disconnects show up as "bad descriptor" too.
    fd_scoped: bool,

    /// Private copy of the candidate children; unreachable ones get cleared.
    snapshot: Bitmap,

    /// Child currently targeted.
    active: ChildId,

    /// Remaining attempts.
    tries: u8,
}

impl RetryLocal {
    /// Picks the preferred child if it is a candidate, else the first
    /// candidate. Returns `None` if there is no candidate at all.
    pub(crate) fn new(
        snapshot: Bitmap,
        preferred: Option<ChildId>,
        fd_scoped: bool,
    ) -> Option<Self> {
        let active = match preferred {
            Some(p) if snapshot.is_set(p) => p,
            _ => snapshot.first_set()?,
        };
        let tries = snapshot.count();
        Some(RetryLocal {
            fd_scoped,
            snapshot,
            active,
            tries,
        })
    }

    /// Overrides the number of attempts allowed.
    pub(crate) fn with_tries(mut self, tries: u8) -> Self {
        self.tries = tries;
        self
    }

    #[inline]
    pub(crate) fn active(&self) -> ChildId {
        self.active
    }

    #[inline]
    pub(crate) fn snapshot(&self) -> &Bitmap {
        &self.snapshot
    }

    pub(crate) fn on_reply<T>(
        &mut self,
        child: ChildId,
        reply: FopResult<T>,
    ) -> RetryStep<T> {
        match reply {
            Err(errno) if errno.is_disconnect(self.fd_scoped) => {
                let _ = self.snapshot.set(child, false);
                self.tries = self.tries.saturating_sub(1);
                if self.tries == 0 {
                    return RetryStep::Finalize(Err(errno));
                }
                match self.snapshot.next_set_wrapping(child) {
                    Some(next) => {
                        self.active = next;
                        RetryStep::Resend(next)
                    }
                    None => RetryStep::Finalize(Err(errno)),
                }
            }
            // success or a substantive error: never retried
            reply => RetryStep::Finalize(reply),
        }
    }
}

/// What an entry-creating fan-out should do after a completion.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EntryStep {
    /// Issue the creating call on this child.
    Create(ChildId),

    /// Issue lookups on these children to learn whether they hold it.
    Heal(Vec<ChildId>),

    /// All done.
    Finalize,
}

/// Context of an entry-creating operation (mknod, mkdir, symlink, link,
/// create).
#[derive(Debug)]
pub(crate) struct EntryLocal<T> {
    /// Private copy of the liveness bitmap at dispatch.
    snapshot: Bitmap,

    /// Child currently targeted by the creating call.
    active: ChildId,

    /// Outstanding replies expected.
    call_count: u8,

    /// Open flags passed to the creating call.
    flags: i32,

    /// Authoritative result: the first success and the child it came from.
    result: Option<(ChildId, T)>,

    /// Last substantive error.
    op_errno: Option<Errno>,

    /// Last disconnect status.
    conn_errno: Option<Errno>,
}

impl<T> EntryLocal<T> {
    /// Targets the first live child. Returns `None` if none is live.
    pub(crate) fn new(snapshot: Bitmap, flags: i32) -> Option<Self> {
        let active = snapshot.first_set()?;
        let call_count = snapshot.count();
        Some(EntryLocal {
            snapshot,
            active,
            call_count,
            flags,
            result: None,
            op_errno: None,
            conn_errno: None,
        })
    }

    #[inline]
    pub(crate) fn active(&self) -> ChildId {
        self.active
    }

    #[inline]
    pub(crate) fn flags(&self) -> i32 {
        self.flags
    }

    #[inline]
    pub(crate) fn first_success(&self) -> bool {
        self.result.is_some()
    }

    pub(crate) fn on_create_reply(
        &mut self,
        child: ChildId,
        reply: FopResult<T>,
        present: &InodeState,
    ) -> EntryStep {
        self.call_count = self.call_count.saturating_sub(1);
        present.mark(child, reply.is_ok());

        match reply {
            Ok(r) => {
                if self.result.is_none() {
                    self.result = Some((child, r));
                    // the object exists now; later attempts elsewhere must
                    // not fail just because of that
                    self.flags &= !libc::O_EXCL;
                }
            }
            Err(errno) if errno.is_disconnect(false) => {
                let _ = self.snapshot.set(child, false);
                self.conn_errno = Some(errno);
            }
            Err(errno) => {
                self.op_errno = Some(errno);
            }
        }

        let remaining: Vec<ChildId> = (child + 1..self.snapshot.size())
            .filter(|&c| self.snapshot.is_set(c) && !present.is_present(c))
            .collect();
        if remaining.is_empty() {
            return EntryStep::Finalize;
        }

        if !self.first_success() {
            self.active = remaining[0];
            EntryStep::Create(self.active)
        } else {
            self.call_count = remaining.len() as u8;
            EntryStep::Heal(remaining)
        }
    }

    /// Feeds one heal lookup completion. Returns true when it was the last
    /// one outstanding.
    pub(crate) fn on_heal_reply(
        &mut self,
        child: ChildId,
        found: bool,
        present: &InodeState,
    ) -> bool {
        present.mark(child, found);
        self.call_count = self.call_count.saturating_sub(1);
        self.call_count == 0
    }

    /// The stored authoritative result if any attempt succeeded, else the
    /// last error (substantive errors win over disconnects).
    pub(crate) fn finalize(self) -> FopResult<(ChildId, T)> {
        match self.result {
            Some(result) => Ok(result),
            None => Err(self
                .op_errno
                .or(self.conn_errno)
                .unwrap_or(Errno::ENOTCONN)),
        }
    }
}

/// Context of a fan-out lookup over every child.
#[derive(Debug)]
pub(crate) struct LookupLocal {
    /// Outstanding replies expected.
    call_count: u8,

    /// True if the inode already had presence state (a repeat lookup).
    revalidate: bool,

    /// Set when a child's fresh answer disagrees with recorded presence.
    revalidate_err: bool,

    /// Accumulated result and the child it came from.
    result: Option<(ChildId, LookupReply)>,

    /// Last error that is neither ENOENT nor a disconnect.
    op_errno: Option<Errno>,

    /// Whether any child answered ENOENT.
    saw_enoent: bool,
}

impl LookupLocal {
    pub(crate) fn new(population: u8, revalidate: bool) -> Self {
        LookupLocal {
            call_count: population,
            revalidate,
            revalidate_err: false,
            result: None,
            op_errno: None,
            saw_enoent: false,
        }
    }

    #[inline]
    pub(crate) fn revalidate_err(&self) -> bool {
        self.revalidate_err
    }

    /// Feeds one completion. Returns true when it was the last one
    /// outstanding.
    pub(crate) fn on_reply(
        &mut self,
        child: ChildId,
        reply: FopResult<LookupReply>,
        present: &InodeState,
    ) -> bool {
        self.call_count = self.call_count.saturating_sub(1);

        match reply {
            // an unreachable child tells nothing about presence
            Err(errno) if errno.is_disconnect(false) => {}

            reply => {
                let found = reply.is_ok();
                if self.revalidate && present.is_present(child) != found {
                    pf_debug!(
                        "lookup revalidate mismatch on child {}: recorded {} now {}",
                        child,
                        !found,
                        found
                    );
                    self.revalidate_err = true;
                }
                present.mark(child, found);

                match reply {
                    Ok(r) => {
                        // lowest-indexed success wins so that the answer
                        // does not depend on reply arrival order
                        let replace = match self.result {
                            Some((c, _)) => child < c,
                            None => true,
                        };
                        if replace {
                            self.result = Some((child, r));
                        }
                    }
                    Err(Errno::ENOENT) => self.saw_enoent = true,
                    Err(errno) => self.op_errno = Some(errno),
                }
            }
        }

        self.call_count == 0
    }

    pub(crate) fn finalize(self) -> FopResult<LookupReply> {
        if self.revalidate_err {
            return Err(Errno::EIO);
        }
        match self.result {
            Some((_, reply)) => Ok(reply),
            None => Err(self.op_errno.unwrap_or(if self.saw_enoent {
                Errno::ENOENT
            } else {
                Errno::ENOTCONN
            })),
        }
    }
}

/// Context of a broadcast where one success is enough (opendir, lock
/// release).
#[derive(Debug)]
pub(crate) struct AnyLocal<T> {
    /// Whether disconnects show up as "bad descriptor" too.
    fd_scoped: bool,

    /// Outstanding replies expected.
    call_count: u8,

    /// Children that succeeded.
    succeeded: Bitmap,

    /// Children found unreachable.
    unreachable: Vec<ChildId>,

    /// First success seen.
    result: Option<T>,

    /// First substantive error.
    op_errno: Option<Errno>,

    /// Last disconnect status.
    conn_errno: Option<Errno>,
}

impl<T> AnyLocal<T> {
    pub(crate) fn new(population: u8, call_count: u8, fd_scoped: bool) -> Self {
        AnyLocal {
            fd_scoped,
            call_count,
            succeeded: Bitmap::new(population, false),
            unreachable: vec![],
            result: None,
            op_errno: None,
            conn_errno: None,
        }
    }

    #[inline]
    pub(crate) fn succeeded(&self) -> &Bitmap {
        &self.succeeded
    }

    #[inline]
    pub(crate) fn unreachable(&self) -> &[ChildId] {
        &self.unreachable
    }

    /// Feeds one completion. Returns true when it was the last one
    /// outstanding.
    pub(crate) fn on_reply(&mut self, child: ChildId, reply: FopResult<T>) -> bool {
        self.call_count = self.call_count.saturating_sub(1);
        match reply {
            Ok(r) => {
                let _ = self.succeeded.set(child, true);
                if self.result.is_none() {
                    self.result = Some(r);
                }
            }
            Err(errno) if errno.is_disconnect(self.fd_scoped) => {
                self.unreachable.push(child);
                self.conn_errno = Some(errno);
            }
            Err(errno) => {
                self.op_errno.get_or_insert(errno);
            }
        }
        self.call_count == 0
    }

    pub(crate) fn finalize(self) -> FopResult<T> {
        match self.result {
            Some(r) => Ok(r),
            None => Err(self
                .op_errno
                .or(self.conn_errno)
                .unwrap_or(Errno::ENOTCONN)),
        }
    }
}

/// What a lock acquisition should do after a completion.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LockStep {
    /// Try acquiring on this child next.
    Acquire(ChildId),

    /// Unlock these children, then finalize.
    Rollback(Vec<ChildId>),

    /// All done.
    Finalize,
}

/// Context of a `SETLK`-acquire: children are asked one at a time, and a
/// substantive refusal rolls back every lock granted so far.
#[derive(Debug)]
pub(crate) struct LockLocal {
    /// Candidates not asked yet, in order.
    pending: VecDeque<ChildId>,

    /// Children that granted the lock.
    acquired: Vec<ChildId>,

    /// First grant's reply.
    result: Option<Flock>,

    /// Substantive refusal, if any.
    op_errno: Option<Errno>,

    /// Last disconnect status.
    conn_errno: Option<Errno>,
}

impl LockLocal {
    /// Orders the candidates starting at `active`, wrapping. Returns the
    /// context and the first child to ask, or `None` if there is none.
    pub(crate) fn new(snapshot: &Bitmap, active: ChildId) -> Option<(Self, ChildId)> {
        let mut pending: VecDeque<ChildId> = snapshot.ones_from(active).into();
        let first = pending.pop_front()?;
        Some((
            LockLocal {
                pending,
                acquired: vec![],
                result: None,
                op_errno: None,
                conn_errno: None,
            },
            first,
        ))
    }

    pub(crate) fn on_acquire_reply(
        &mut self,
        child: ChildId,
        reply: FopResult<Flock>,
    ) -> LockStep {
        match reply {
            Ok(flock) => {
                self.acquired.push(child);
                if self.result.is_none() {
                    self.result = Some(flock);
                }
            }
            Err(errno) if errno.is_disconnect(true) => {
                self.conn_errno = Some(errno);
            }
            Err(errno) => {
                self.op_errno = Some(errno);
                return if self.acquired.is_empty() {
                    LockStep::Finalize
                } else {
                    LockStep::Rollback(self.acquired.clone())
                };
            }
        }

        match self.pending.pop_front() {
            Some(next) => LockStep::Acquire(next),
            None => LockStep::Finalize,
        }
    }

    pub(crate) fn finalize(self) -> FopResult<Flock> {
        if let Some(errno) = self.op_errno {
            return Err(errno);
        }
        self.result
            .ok_or(self.conn_errno.unwrap_or(Errno::ENOTCONN))
    }
}

#[cfg(test)]
mod local_tests {
    use super::*;

    fn reply_from(child: ChildId) -> LookupReply {
        let mut reply = LookupReply::default();
        reply.stat.dev = child as u64;
        reply
    }

    #[test]
    fn retry_no_candidate() {
        assert!(RetryLocal::new(Bitmap::new(3, false), None, false).is_none());
    }

    #[test]
    fn retry_prefers_preferred() {
        let local =
            RetryLocal::new(Bitmap::from(3, vec![0, 2]), Some(2), false)
                .unwrap();
        assert_eq!(local.active(), 2);
        let local =
            RetryLocal::new(Bitmap::from(3, vec![0, 2]), Some(1), false)
                .unwrap();
        assert_eq!(local.active(), 0);
    }

    #[test]
    fn retry_rotates_then_exhausts() {
        let mut local =
            RetryLocal::new(Bitmap::from(4, vec![0, 2, 3]), Some(2), false)
                .unwrap();
        assert_eq!(
            local.on_reply::<()>(2, Err(Errno::ENOTCONN)),
            RetryStep::Resend(3)
        );
        assert_eq!(
            local.on_reply::<()>(3, Err(Errno::ENOTCONN)),
            RetryStep::Resend(0)
        );
        assert_eq!(
            local.on_reply::<()>(0, Err(Errno::ENOTCONN)),
            RetryStep::Finalize(Err(Errno::ENOTCONN))
        );
        assert!(local.snapshot().is_clear());
    }

    #[test]
    fn retry_never_retries_substantive() {
        let mut local =
            RetryLocal::new(Bitmap::new(3, true), None, false).unwrap();
        assert_eq!(
            local.on_reply::<()>(0, Err(Errno::EACCES)),
            RetryStep::Finalize(Err(Errno::EACCES))
        );
        assert_eq!(local.on_reply(0, Ok(7)), RetryStep::Finalize(Ok(7)));
    }

    #[test]
    fn retry_fd_scoped_badfd() {
        let mut local =
            RetryLocal::new(Bitmap::new(2, true), None, true).unwrap();
        assert_eq!(
            local.on_reply::<()>(0, Err(Errno::EBADFD)),
            RetryStep::Resend(1)
        );
        let mut local =
            RetryLocal::new(Bitmap::new(2, true), None, false).unwrap();
        assert_eq!(
            local.on_reply::<()>(0, Err(Errno::EBADFD)),
            RetryStep::Finalize(Err(Errno::EBADFD))
        );
    }

    #[test]
    fn retry_with_tries() {
        let mut local = RetryLocal::new(Bitmap::new(3, true), None, false)
            .unwrap()
            .with_tries(1);
        assert_eq!(
            local.on_reply::<()>(0, Err(Errno::ENOTCONN)),
            RetryStep::Finalize(Err(Errno::ENOTCONN))
        );
    }

    #[test]
    fn entry_first_success_heals_rest() {
        let present = InodeState::new(3);
        let mut local =
            EntryLocal::new(Bitmap::new(3, true), libc::O_EXCL).unwrap();
        assert_eq!(local.active(), 0);
        assert_eq!(
            local.on_create_reply(0, Ok("stat0"), &present),
            EntryStep::Heal(vec![1, 2])
        );
        assert_eq!(local.flags() & libc::O_EXCL, 0);
        assert!(!local.on_heal_reply(1, true, &present));
        assert!(local.on_heal_reply(2, true, &present));
        assert_eq!(present.snapshot(), Bitmap::new(3, true));
        assert_eq!(local.finalize(), Ok((0, "stat0")));
    }

    #[test]
    fn entry_failures_move_on() {
        let present = InodeState::new(3);
        let mut local = EntryLocal::new(Bitmap::new(3, true), 0).unwrap();
        assert_eq!(
            local.on_create_reply(0, Err(Errno::ENOTCONN), &present),
            EntryStep::Create(1)
        );
        assert_eq!(
            local.on_create_reply(1, Ok("stat1"), &present),
            EntryStep::Heal(vec![2])
        );
        assert!(local.on_heal_reply(2, false, &present));
        assert_eq!(present.snapshot(), Bitmap::from(3, vec![1]));
        assert_eq!(local.finalize(), Ok((1, "stat1")));
    }

    #[test]
    fn entry_all_fail() {
        let present = InodeState::new(2);
        let mut local = EntryLocal::<()>::new(Bitmap::new(2, true), 0).unwrap();
        assert_eq!(
            local.on_create_reply(0, Err(Errno::EACCES), &present),
            EntryStep::Create(1)
        );
        assert_eq!(
            local.on_create_reply(1, Err(Errno::ENOTCONN), &present),
            EntryStep::Finalize
        );
        assert!(!local.first_success());
        assert_eq!(local.finalize(), Err(Errno::EACCES));
    }

    #[test]
    fn entry_skips_dead() {
        assert!(EntryLocal::<()>::new(Bitmap::new(2, false), 0).is_none());
        let present = InodeState::new(3);
        let mut local =
            EntryLocal::new(Bitmap::from(3, vec![1]), 0).unwrap();
        assert_eq!(local.active(), 1);
        assert_eq!(
            local.on_create_reply(1, Ok(()), &present),
            EntryStep::Finalize
        );
    }

    #[test]
    fn lookup_first_time() {
        let present = InodeState::new(3);
        let mut local = LookupLocal::new(3, false);
        assert!(!local.on_reply(2, Ok(reply_from(2)), &present));
        assert!(!local.on_reply(1, Err(Errno::ENOENT), &present));
        assert!(local.on_reply(0, Ok(reply_from(0)), &present));
        assert_eq!(present.snapshot(), Bitmap::from(3, vec![0, 2]));
        assert_eq!(local.finalize().unwrap().stat.dev, 0);
    }

    #[test]
    fn lookup_revalidate_mismatch() {
        let present = InodeState::new(3);
        present.mark(0, true);
        present.mark(2, true);
        let mut local = LookupLocal::new(3, true);
        local.on_reply(0, Err(Errno::ENOENT), &present);
        local.on_reply(1, Ok(reply_from(1)), &present);
        local.on_reply(2, Ok(reply_from(2)), &present);
        assert!(local.revalidate_err());
        assert_eq!(present.snapshot(), Bitmap::from(3, vec![1, 2]));
        assert_eq!(local.finalize(), Err(Errno::EIO));
    }

    #[test]
    fn lookup_disconnect_ignored() {
        let present = InodeState::new(2);
        present.mark(0, true);
        present.mark(1, true);
        let mut local = LookupLocal::new(2, true);
        local.on_reply(0, Err(Errno::ENOTCONN), &present);
        local.on_reply(1, Ok(reply_from(1)), &present);
        assert!(!local.revalidate_err());
        assert!(present.is_present(0));
        assert!(local.finalize().is_ok());
    }

    #[test]
    fn lookup_error_choice() {
        let present = InodeState::new(2);
        let mut local = LookupLocal::new(2, false);
        local.on_reply(0, Err(Errno::ENOENT), &present);
        local.on_reply(1, Err(Errno::ENOTCONN), &present);
        assert_eq!(local.finalize(), Err(Errno::ENOENT));

        let mut local = LookupLocal::new(2, false);
        local.on_reply(0, Err(Errno::EACCES), &present);
        local.on_reply(1, Err(Errno::ENOENT), &present);
        assert_eq!(local.finalize(), Err(Errno::EACCES));

        let mut local = LookupLocal::new(1, false);
        local.on_reply(0, Err(Errno::ENOTCONN), &present);
        assert_eq!(local.finalize(), Err(Errno::ENOTCONN));
    }

    #[test]
    fn any_one_success_enough() {
        let mut local = AnyLocal::new(3, 3, true);
        assert!(!local.on_reply(0, Err(Errno::EINVAL)));
        assert!(!local.on_reply(1, Err(Errno::EBADFD)));
        assert!(local.on_reply(2, Ok(2)));
        assert_eq!(local.succeeded(), &Bitmap::from(3, vec![2]));
        assert_eq!(local.unreachable(), &[1]);
        assert_eq!(local.finalize(), Ok(2));

        let mut local = AnyLocal::<()>::new(2, 2, false);
        local.on_reply(0, Err(Errno::ENOTCONN));
        local.on_reply(1, Err(Errno::ENOTCONN));
        assert_eq!(local.finalize(), Err(Errno::ENOTCONN));
    }

    #[test]
    fn any_keeps_first_refusal() {
        let mut local = AnyLocal::<()>::new(3, 3, false);
        local.on_reply(2, Err(Errno::EACCES));
        local.on_reply(0, Err(Errno::ENOTCONN));
        assert!(local.on_reply(1, Err(Errno::EINVAL)));
        assert_eq!(local.unreachable(), &[0]);
        assert_eq!(local.finalize(), Err(Errno::EACCES));

        let mut local = AnyLocal::<()>::new(2, 2, true);
        local.on_reply(1, Err(Errno::EINVAL));
        local.on_reply(0, Err(Errno::EACCES));
        assert_eq!(local.finalize(), Err(Errno::EINVAL));
    }

    fn wrlock() -> Flock {
        Flock {
            kind: crate::xlator::LockType::Write,
            start: 0,
            len: 10,
            pid: 1,
        }
    }

    #[test]
    fn lock_acquire_all() {
        let (mut local, first) =
            LockLocal::new(&Bitmap::new(3, true), 1).unwrap();
        assert_eq!(first, 1);
        assert_eq!(local.on_acquire_reply(1, Ok(wrlock())), LockStep::Acquire(2));
        assert_eq!(
            local.on_acquire_reply(2, Err(Errno::EBADFD)),
            LockStep::Acquire(0)
        );
        assert_eq!(local.on_acquire_reply(0, Ok(wrlock())), LockStep::Finalize);
        assert_eq!(local.finalize(), Ok(wrlock()));
    }

    #[test]
    fn lock_substantive_failure_rolls_back() {
        let (mut local, first) =
            LockLocal::new(&Bitmap::new(3, true), 0).unwrap();
        assert_eq!(first, 0);
        assert_eq!(local.on_acquire_reply(0, Ok(wrlock())), LockStep::Acquire(1));
        assert_eq!(local.on_acquire_reply(1, Ok(wrlock())), LockStep::Acquire(2));
        assert_eq!(
            local.on_acquire_reply(2, Err(Errno::EAGAIN)),
            LockStep::Rollback(vec![0, 1])
        );
        assert_eq!(local.finalize(), Err(Errno::EAGAIN));
    }

    #[test]
    fn lock_first_refusal_finalizes() {
        let (mut local, _) = LockLocal::new(&Bitmap::new(2, true), 0).unwrap();
        assert_eq!(
            local.on_acquire_reply(0, Err(Errno::EAGAIN)),
            LockStep::Finalize
        );
        assert_eq!(local.finalize(), Err(Errno::EAGAIN));
        assert!(LockLocal::new(&Bitmap::new(2, false), 0).is_none());
    }
}
