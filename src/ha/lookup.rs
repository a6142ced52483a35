//! Fan-out/fan-in lookup that records and checks per-child presence.

use super::local::LookupLocal;
use super::state::InodeState;
use super::HaVolume;

use crate::xlator::{FopResult, Loc, LookupReply};

use futures::stream::{FuturesUnordered, StreamExt};

// HaVolume lookup
impl HaVolume {
    /// Looks `loc` up on every child concurrently. The first lookup of an
    /// inode records which children hold it; a repeat lookup that finds
    /// the children disagreeing with that record fails with `EIO`.
    pub(super) async fn lookup_all(
        &self,
        loc: &Loc,
        need_xattr: bool,
    ) -> FopResult<LookupReply> {
        let population = self.replicas.population();
        let (present, created) = self
            .inodes
            .get_or_insert_with(loc.inode, || InodeState::new(population));
        let mut local = LookupLocal::new(population, !created);

        let mut lookups: FuturesUnordered<_> = (0..population)
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.lookup(loc, need_xattr).await) }
            })
            .collect();
        while let Some((c, reply)) = lookups.next().await {
            if local.on_reply(c, reply, &present) {
                break;
            }
        }

        if local.revalidate_err() {
            pf_warn!(
                "lookup {} disagrees with recorded presence {:?}",
                loc.path,
                present.snapshot()
            );
        }
        local.finalize()
    }
}
