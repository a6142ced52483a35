//! Data types carried by filesystem operations.

use std::collections::HashMap;

use bytes::Bytes;

/// Child (subvolume) index within a translator's ordered child list.
pub type ChildId = u8;

/// Inode number type.
pub type InodeNo = u64;

/// Open file/directory handle ID type.
pub type FdId = u64;

/// Extended attributes map, name -> raw value.
pub type Xattrs = HashMap<String, Bytes>;

/// Location of an object in the namespace: its path plus the inode the
/// upper layer has bound to it.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Loc {
    pub path: String,
    pub inode: InodeNo,
    pub parent: Option<InodeNo>,
}

impl Loc {
    pub fn new(path: impl Into<String>, inode: InodeNo) -> Self {
        Loc {
            path: path.into(),
            inode,
            parent: None,
        }
    }
}

/// Open file or directory handle, passed down unchanged to every child;
/// each child keeps its own context keyed by the handle ID.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileHandle {
    pub id: FdId,
    pub inode: InodeNo,
}

/// File attributes.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Stat {
    pub ino: InodeNo,
    pub dev: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Attribute changes requested by `setattr`/`fsetattr`; `None` fields are
/// left untouched.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
}

/// Filesystem statistics returned by `statfs`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct StatVfs {
    pub bsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub namemax: u64,
}

/// Translator usage statistics returned by the `stats` management op.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct XlatorStats {
    pub nr_files: u64,
    pub disk_usage: u64,
    pub free_disk: u64,
    pub total_disk_size: u64,
    pub read_usage: u64,
    pub write_usage: u64,
    pub nr_clients: u64,
}

/// Reply of a `lookup`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LookupReply {
    pub stat: Stat,
    pub xattrs: Xattrs,
}

/// Reply of a `readv`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ReadReply {
    pub data: Bytes,
    pub stat: Stat,
}

/// One directory entry returned by `readdir`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DirEntry {
    pub name: String,
    pub ino: InodeNo,
    pub offset: u64,
}

/// Reply of a `checksum`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Checksum {
    pub file: Bytes,
    pub dir: Bytes,
}

/// POSIX record lock command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockCmd {
    GetLk,
    SetLk,
    SetLkW,
}

/// POSIX record lock type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockType {
    Read,
    Write,
    Unlock,
}

/// POSIX record lock description.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Flock {
    pub kind: LockType,
    pub start: u64,
    pub len: u64,
    pub pid: u32,
}

impl Flock {
    /// The unlock request covering the same range as this lock.
    pub fn as_unlock(&self) -> Flock {
        Flock {
            kind: LockType::Unlock,
            ..self.clone()
        }
    }
}

/// Entry lock command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EntryLockCmd {
    Lock,
    LockNonBlocking,
    Unlock,
}

/// Entry lock type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EntryLockType {
    Read,
    Write,
}

/// Arithmetic applied by `xattrop`/`fxattrop` to the stored values.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum XattrOpKind {
    AddArray,
    AddArray64,
    OrArray,
    AndArray,
}
