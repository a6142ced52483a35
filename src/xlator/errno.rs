//! POSIX error number wrapper used as the status of every fop.

use std::fmt;

/// Status of a failed filesystem operation: a POSIX errno as reported by
/// the backend that answered (or synthesized by this layer).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Errno(pub i32);

/// Result type of every filesystem operation.
pub type FopResult<T> = Result<T, Errno>;

impl Errno {
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EBADF: Errno = Errno(libc::EBADF);
    pub const EAGAIN: Errno = Errno(libc::EAGAIN);
    pub const EACCES: Errno = Errno(libc::EACCES);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);
    pub const EBADFD: Errno = Errno(libc::EBADFD);
    pub const ENOTCONN: Errno = Errno(libc::ENOTCONN);

    /// Whether this status means the child that produced it is unreachable,
    /// rather than a substantive answer from the backend. Handle-scoped
    /// operations additionally see a lost connection as "bad descriptor",
    /// since the child no longer knows the handle.
    #[inline]
    pub fn is_disconnect(self, fd_scoped: bool) -> bool {
        self == Self::ENOTCONN || (fd_scoped && self == Self::EBADFD)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Self::ENOENT => "ENOENT",
            Self::EIO => "EIO",
            Self::EBADF => "EBADF",
            Self::EAGAIN => "EAGAIN",
            Self::EACCES => "EACCES",
            Self::EEXIST => "EEXIST",
            Self::EINVAL => "EINVAL",
            Self::ENOSYS => "ENOSYS",
            Self::EBADFD => "EBADFD",
            Self::ENOTCONN => "ENOTCONN",
            Errno(n) => return write!(f, "errno {}", n),
        };
        write!(f, "{}", name)
    }
}
