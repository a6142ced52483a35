//! Liveness notification events and the hub that carries them from a
//! translator's children up to its parent.

use crate::utils::HaError;
use crate::xlator::ChildId;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notification exchanged between adjacent translators.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Event {
    /// The sender became reachable.
    ChildUp,

    /// The sender became unreachable.
    ChildDown,

    /// The sender's configuration or layout changed.
    ChildModified,

    /// The parent finished its own setup.
    ParentUp,

    /// The parent is going away.
    ParentDown,
}

/// The event hub: children submit `(child, event)` pairs, an executor task
/// feeds them through the owning translator's handler, and whatever the
/// handler decides to propagate comes out on the upward channel.
pub struct EventHub {
    /// Sender side of the child events channel.
    tx_child: mpsc::Sender<(ChildId, Event)>,

    /// Receiver side of the upward events channel.
    rx_up: mpsc::Receiver<Event>,

    /// Join handle of the executor task.
    _executor_handle: JoinHandle<()>,
}

impl EventHub {
    /// Creates the channels and spawns the executor task. Must be called
    /// within the context of a tokio runtime.
    pub fn new_and_setup<H>(
        chan_cap: usize,
        handler: H,
    ) -> Result<Self, HaError>
    where
        H: Fn(ChildId, Event) -> Option<Event> + Send + 'static,
    {
        if chan_cap == 0 {
            return logged_err!("invalid event chan_cap {}", chan_cap);
        }

        let (tx_child, rx_child) = mpsc::channel(chan_cap);
        let (tx_up, rx_up) = mpsc::channel(chan_cap);

        let executor_handle =
            tokio::spawn(Self::executor_thread(rx_child, tx_up, handler));

        Ok(EventHub {
            tx_child,
            rx_up,
            _executor_handle: executor_handle,
        })
    }

    /// A sender that a child can keep to report its own events.
    pub fn child_sender(&self) -> mpsc::Sender<(ChildId, Event)> {
        self.tx_child.clone()
    }

    /// Submits an event on behalf of given child.
    pub async fn submit_event(
        &self,
        child: ChildId,
        event: Event,
    ) -> Result<(), HaError> {
        Ok(self.tx_child.send((child, event)).await?)
    }

    /// Waits for the next event propagated upward.
    pub async fn get_event(&mut self) -> Result<Event, HaError> {
        match self.rx_up.recv().await {
            Some(event) => Ok(event),
            None => logged_err!("upward event channel has been closed"),
        }
    }

    /// Returns the next already-propagated event without waiting, if any.
    pub fn try_get_event(&mut self) -> Option<Event> {
        self.rx_up.try_recv().ok()
    }

    /// Executor task function.
    async fn executor_thread<H>(
        mut rx_child: mpsc::Receiver<(ChildId, Event)>,
        tx_up: mpsc::Sender<Event>,
        handler: H,
    ) where
        H: Fn(ChildId, Event) -> Option<Event> + Send + 'static,
    {
        pf_debug!("event executor thread spawned");

        while let Some((child, event)) = rx_child.recv().await {
            if let Some(up) = handler(child, event) {
                if let Err(e) = tx_up.send(up).await {
                    pf_error!("error sending to tx_up: {}", e);
                }
            }
        }

        // channel gets closed and no messages remain
        pf_debug!("event executor thread exitted");
    }
}
