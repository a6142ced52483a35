//! Long-lived HA state: the replica set with its liveness bitmap, and the
//! per-inode / per-handle presence contexts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::utils::{Bitmap, HaError};
use crate::xlator::{ChildId, Subvolume};

/// Ordered children, preferred child, and the shared liveness bitmap. The
/// bitmap is only ever mutated through `set_live()`; everyone else works
/// on copies taken by `live_snapshot()`.
pub(crate) struct ReplicaSet {
    /// Child subvolumes; a child's identity is its index here.
    children: Vec<Arc<dyn Subvolume>>,

    /// Child to prefer as default active target.
    preferred: Option<ChildId>,

    /// Liveness bitmap, one flag per child.
    live: Mutex<Bitmap>,
}

impl ReplicaSet {
    pub(crate) fn new(
        children: Vec<Arc<dyn Subvolume>>,
        preferred: Option<ChildId>,
    ) -> Self {
        let population = children.len() as u8;
        ReplicaSet {
            children,
            preferred,
            live: Mutex::new(Bitmap::new(population, false)),
        }
    }

    #[inline]
    pub(crate) fn population(&self) -> u8 {
        self.children.len() as u8
    }

    #[inline]
    pub(crate) fn preferred(&self) -> Option<ChildId> {
        self.preferred
    }

    /// Handle to the child at given index.
    #[inline]
    pub(crate) fn child(&self, idx: ChildId) -> Arc<dyn Subvolume> {
        self.children[idx as usize].clone()
    }

    #[inline]
    pub(crate) fn child_name(&self, idx: ChildId) -> &str {
        self.children
            .get(idx as usize)
            .map_or("<unknown>", |c| c.name())
    }

    /// Copy of the liveness bitmap taken under its lock.
    pub(crate) fn live_snapshot(&self) -> Bitmap {
        self.live.lock().unwrap().clone()
    }

    /// Sets a child's liveness flag. Returns whether it was set before and
    /// the number of live children after the update.
    pub(crate) fn set_live(
        &self,
        idx: ChildId,
        flag: bool,
    ) -> Result<(bool, u8), HaError> {
        let mut live = self.live.lock().unwrap();
        let was = live.get(idx)?;
        live.set(idx, flag)?;
        Ok((was, live.count()))
    }
}

/// Per-inode record of which children are known to hold the object.
pub(crate) struct InodeState {
    present: Mutex<Bitmap>,
}

impl InodeState {
    /// New all-zero presence state.
    pub(crate) fn new(population: u8) -> Self {
        InodeState {
            present: Mutex::new(Bitmap::new(population, false)),
        }
    }

    /// Records whether `child` holds the object.
    pub(crate) fn mark(&self, child: ChildId, flag: bool) {
        let mut present = self.present.lock().unwrap();
        if let Err(e) = present.set(child, flag) {
            pf_error!("error marking inode presence: {}", e);
        }
    }

    pub(crate) fn is_present(&self, child: ChildId) -> bool {
        self.present.lock().unwrap().is_set(child)
    }

    pub(crate) fn snapshot(&self) -> Bitmap {
        self.present.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct HandleInner {
    present: Bitmap,
    path: String,
    preferred_active: Option<ChildId>,
}

/// Per-open-handle record of which children have the handle open, plus the
/// handle's preferred active child.
pub(crate) struct FileHandleState {
    inner: Mutex<HandleInner>,
}

impl FileHandleState {
    pub(crate) fn new(
        present: Bitmap,
        path: impl Into<String>,
        preferred_active: Option<ChildId>,
    ) -> Self {
        FileHandleState {
            inner: Mutex::new(HandleInner {
                present,
                path: path.into(),
                preferred_active,
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> Bitmap {
        self.inner.lock().unwrap().present.clone()
    }

    pub(crate) fn path(&self) -> String {
        self.inner.lock().unwrap().path.clone()
    }

    pub(crate) fn preferred_active(&self) -> Option<ChildId> {
        self.inner.lock().unwrap().preferred_active
    }

    pub(crate) fn set_preferred_active(&self, child: ChildId) {
        self.inner.lock().unwrap().preferred_active = Some(child);
    }
}

/// Context table attaching state objects to inodes or handles by number.
pub(crate) struct CtxTable<S> {
    map: Mutex<HashMap<u64, Arc<S>>>,
}

impl<S> CtxTable<S> {
    pub(crate) fn new() -> Self {
        CtxTable {
            map: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: u64) -> Option<Arc<S>> {
        self.map.lock().unwrap().get(&key).cloned()
    }

    /// Attaches `state`, replacing whatever was attached before.
    pub(crate) fn insert(&self, key: u64, state: S) -> Arc<S> {
        let state = Arc::new(state);
        self.map.lock().unwrap().insert(key, state.clone());
        state
    }

    /// Returns the attached state, creating it with `init` if absent. The
    /// flag is true if it got created by this call.
    pub(crate) fn get_or_insert_with(
        &self,
        key: u64,
        init: impl FnOnce() -> S,
    ) -> (Arc<S>, bool) {
        let mut map = self.map.lock().unwrap();
        if let Some(state) = map.get(&key) {
            return (state.clone(), false);
        }
        let state = Arc::new(init());
        map.insert(key, state.clone());
        (state, true)
    }

    pub(crate) fn remove(&self, key: u64) -> Option<Arc<S>> {
        self.map.lock().unwrap().remove(&key)
    }
}
