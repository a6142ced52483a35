//! Translator-facing vocabulary: the filesystem operation surface every
//! subvolume exposes, its data types and statuses, and the liveness event
//! plumbing between a translator and its children.

mod errno;
mod event;
mod subvol;
mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use errno::{Errno, FopResult};
pub use event::{Event, EventHub};
pub use subvol::Subvolume;
pub use types::{
    ChildId, Checksum, DirEntry, EntryLockCmd, EntryLockType, FdId,
    FileHandle, Flock, InodeNo, LockCmd, LockType, Loc, LookupReply,
    ReadReply, SetAttr, Stat, StatVfs, XattrOpKind, Xattrs, XlatorStats,
};
