//! High-availability translator: presents N independent child subvolumes
//! as one fault-tolerant volume.
//!
//! Every filesystem operation is dispatched with one of four patterns:
//!   - single-target with rotate-on-disconnect (`dispatch`)
//!   - fan-out creation with eventual presence (`entry`)
//!   - fan-out/fan-in consistency check (`lookup`)
//!   - ordered fallback for management ops (`dispatch`)
//!
//! plus the all-or-rollback record locking protocol (`locking`). Liveness
//! of children is tracked from their Up/Down events (`liveness`).

mod dispatch;
mod entry;
mod fops;
mod liveness;
mod local;
mod locking;
mod lookup;
mod state;

use std::sync::Arc;

use crate::utils::{Bitmap, HaError, ME};
use crate::xlator::{ChildId, EventHub, FdId, InodeNo, Subvolume};

use serde::Deserialize;

use state::{CtxTable, FileHandleState, InodeState, ReplicaSet};

/// Configuration options struct.
#[derive(Debug, Clone, Deserialize)]
pub struct HaConfig {
    /// Index of the child to prefer as default active target; -1 means
    /// the first available one.
    pub preferred_subvolume: i64,

    /// Capacity of the liveness event channels.
    pub event_chan_cap: usize,
}

#[allow(clippy::derivable_impls)]
impl Default for HaConfig {
    fn default() -> Self {
        HaConfig {
            preferred_subvolume: -1,
            event_chan_cap: 1000,
        }
    }
}

/// The HA volume.
pub struct HaVolume {
    /// Volume name.
    name: String,

    /// Configuration options struct.
    config: HaConfig,

    /// Children, preferred child, and shared liveness bitmap.
    replicas: ReplicaSet,

    /// Per-inode presence state, keyed by inode number.
    inodes: CtxTable<InodeState>,

    /// Per-handle presence state, keyed by handle ID.
    fds: CtxTable<FileHandleState>,
}

impl HaVolume {
    /// Creates an HA volume over the given ordered list of children. All
    /// children start out down until they report `ChildUp`.
    pub fn new_and_setup(
        name: impl Into<String>,
        children: Vec<Arc<dyn Subvolume>>,
        config_str: Option<&str>,
    ) -> Result<Self, HaError> {
        let name = name.into();
        let _ = ME.set(name.clone());

        if children.is_empty() {
            return logged_err!(
                "FATAL: ha should have one or more child defined"
            );
        }
        if children.len() > ChildId::MAX as usize {
            return logged_err!(
                "too many children {} (max {})",
                children.len(),
                ChildId::MAX
            );
        }
        let population = children.len() as u8;

        // parse volume options
        let config = parsed_config!(config_str => HaConfig;
                                    preferred_subvolume, event_chan_cap)?;
        if config.preferred_subvolume < -1
            || config.preferred_subvolume >= population as i64
        {
            return logged_err!(
                "invalid config.preferred_subvolume '{}'",
                config.preferred_subvolume
            );
        }
        if config.event_chan_cap == 0 {
            return logged_err!(
                "invalid config.event_chan_cap '{}'",
                config.event_chan_cap
            );
        }
        let preferred = u8::try_from(config.preferred_subvolume).ok();

        pf_info!(
            "ha volume over {} children, preferred {:?}",
            population,
            preferred
        );
        Ok(HaVolume {
            name,
            config,
            replicas: ReplicaSet::new(children, preferred),
            inodes: CtxTable::new(),
            fds: CtxTable::new(),
        })
    }

    /// Spawns the event hub that feeds children's liveness events through
    /// this volume and yields the aggregate events meant for its parent.
    pub fn setup_event_hub(self: &Arc<Self>) -> Result<EventHub, HaError> {
        let volume = self.clone();
        EventHub::new_and_setup(self.config.event_chan_cap, move |child, ev| {
            volume.notify(child, ev)
        })
    }

    /// Number of children.
    pub fn population(&self) -> u8 {
        self.replicas.population()
    }

    /// Copy of the current liveness bitmap.
    pub fn live_children(&self) -> Bitmap {
        self.replicas.live_snapshot()
    }

    /// Copy of the presence bitmap recorded for an inode, if any.
    pub fn inode_presence(&self, inode: InodeNo) -> Option<Bitmap> {
        self.inodes.get(inode).map(|state| state.snapshot())
    }

    /// Copy of the presence bitmap recorded for an open handle, if any.
    pub fn fd_presence(&self, fd: FdId) -> Option<Bitmap> {
        self.fds.get(fd).map(|state| state.snapshot())
    }
}
