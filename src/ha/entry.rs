//! Fan-out creation with eventual presence: the creating call walks the
//! live children one at a time until it succeeds somewhere, then the
//! remaining children are healed with lookups.

use std::future::Future;
use std::sync::Arc;

use super::local::{EntryLocal, EntryStep};
use super::state::InodeState;
use super::HaVolume;

use crate::xlator::{ChildId, Errno, FopResult, Loc, Subvolume};

use futures::stream::{FuturesUnordered, StreamExt};

// HaVolume entry-creating fan-out
impl HaVolume {
    /// Runs an entry-creating operation for the object at `loc`. `call`
    /// issues the creating fop on a child with the given open flags (only
    /// `create` looks at them). Returns the authoritative result and the
    /// child it came from.
    pub(super) async fn fan_out_entry<T, F, Fut>(
        &self,
        fop: &'static str,
        loc: &Loc,
        flags: i32,
        call: F,
    ) -> FopResult<(ChildId, T)>
    where
        F: Fn(Arc<dyn Subvolume>, i32) -> Fut,
        Fut: Future<Output = FopResult<T>>,
    {
        let mut local =
            match EntryLocal::new(self.replicas.live_snapshot(), flags) {
                Some(local) => local,
                None => {
                    pf_error!("{}: no active subvolume for {}", fop, loc.path);
                    return Err(Errno::ENOTCONN);
                }
            };
        let present = self
            .inodes
            .insert(loc.inode, InodeState::new(self.replicas.population()));

        // creation phase: strictly one child at a time
        let mut child = local.active();
        let heal = loop {
            let reply = call(self.replicas.child(child), local.flags()).await;
            if let Err(errno) = &reply {
                pf_debug!(
                    "{} {} failed on {}: {}",
                    fop,
                    loc.path,
                    self.replicas.child_name(child),
                    errno
                );
            }
            match local.on_create_reply(child, reply, &present) {
                EntryStep::Create(next) => child = next,
                EntryStep::Heal(targets) => break targets,
                EntryStep::Finalize => return local.finalize(),
            }
        };

        // heal phase: concurrent lookups, only to learn presence
        pf_debug!("{} {} healing presence on {:?}", fop, loc.path, heal);
        let mut lookups: FuturesUnordered<_> = heal
            .into_iter()
            .map(|c| {
                let sv = self.replicas.child(c);
                async move { (c, sv.lookup(loc, false).await) }
            })
            .collect();
        while let Some((c, reply)) = lookups.next().await {
            if local.on_heal_reply(c, reply.is_ok(), &present) {
                break;
            }
        }

        local.finalize()
    }
}
