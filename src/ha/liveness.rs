//! Child liveness tracking and aggregate Up/Down propagation.

use super::HaVolume;

use crate::xlator::{ChildId, Event};

// HaVolume liveness event handling
impl HaVolume {
    /// Handles an event reported by child `child`. Returns the event to
    /// propagate to this volume's parent, if any.
    ///
    /// The volume as a whole goes Down only when its last live child goes
    /// down, and comes Up only when its first child comes up; transitions
    /// in between are absorbed here.
    pub fn notify(&self, child: ChildId, event: Event) -> Option<Event> {
        match event {
            Event::ChildUp | Event::ChildDown => {
                let up = event == Event::ChildUp;
                let (was, count) = match self.replicas.set_live(child, up) {
                    Ok(res) => res,
                    Err(e) => {
                        pf_error!("error handling event from {}: {}", child, e);
                        return None;
                    }
                };
                pf_debug!(
                    "child {} ({}) {}, {} live",
                    child,
                    self.replicas.child_name(child),
                    if up { "up" } else { "down" },
                    count
                );

                if up && !was && count == 1 {
                    pf_info!("volume {} up", self.name);
                    Some(Event::ChildUp)
                } else if !up && was && count == 0 {
                    pf_info!("volume {} down: no live children", self.name);
                    Some(Event::ChildDown)
                } else {
                    None
                }
            }

            // everything else is passed through unchanged
            _ => Some(event),
        }
    }
}
