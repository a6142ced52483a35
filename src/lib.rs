//! High-availability replication/failover volume over N child subvolumes.
//!
//! An `HaVolume` presents an ordered list of independent children as one
//! fault-tolerant volume: single-target operations fail over to another
//! live child when the one they were sent to turns out unreachable,
//! entry-creating operations are replicated onto every reachable child,
//! lookups keep per-inode presence knowledge and flag inconsistencies,
//! and record locks are taken on all children or none.

#[macro_use]
mod utils;

pub mod xlator;

mod ha;

pub use ha::{HaConfig, HaVolume};
pub use utils::{logger_init, Bitmap, BitmapIter, HaError, ME};
pub use xlator::{Errno, Event, EventHub, FopResult, Subvolume};
