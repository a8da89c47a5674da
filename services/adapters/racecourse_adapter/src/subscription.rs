//! Background watch over one contract event stream

use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chain::{EventLog, EventStream, RaceEvent};

/// Callback receiving the human-readable event name
pub type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Live watch for one [`RaceEvent`]
///
/// Owns the task draining the event stream. Stopping (or dropping) the
/// subscription aborts the task, which drops the stream and with it the
/// node-side filter.
///
/// The watch task holds a read guard on `active` while it checks the flag and
/// runs the callback; `stop` clears the flag under the write guard. The
/// callback must not stop its own subscription.
pub struct EventSubscription {
    event: RaceEvent,
    active: Arc<RwLock<bool>>,
    handle: JoinHandle<()>,
}

impl EventSubscription {
    /// Start watching `stream`, suppressing logs mined in `skip_block`
    pub fn spawn(
        event: RaceEvent,
        stream: EventStream,
        skip_block: Option<u64>,
        on_event: EventCallback,
    ) -> Self {
        let active = Arc::new(RwLock::new(true));
        let handle = tokio::spawn(run_watch(
            event,
            stream,
            skip_block,
            on_event,
            active.clone(),
        ));

        Self {
            event,
            active,
            handle,
        }
    }

    pub fn event(&self) -> RaceEvent {
        self.event
    }

    pub fn is_active(&self) -> bool {
        *self.active.read() && !self.handle.is_finished()
    }

    /// Stop the watch; no callback runs after this returns. Safe to call twice.
    ///
    /// Waits for a callback already in progress to finish.
    pub fn stop(&mut self) {
        {
            let mut active = self.active.write();
            if *active {
                debug!("Stopping {} watch", self.event);
            }
            *active = false;
        }
        self.handle.abort();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Logs from the block current at connect time are history, not news
pub(crate) fn is_new_event(log: &EventLog, skip_block: Option<u64>) -> bool {
    log.block_number != skip_block
}

async fn run_watch(
    event: RaceEvent,
    mut stream: EventStream,
    skip_block: Option<u64>,
    on_event: EventCallback,
    active: Arc<RwLock<bool>>,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(log) => {
                if !is_new_event(&log, skip_block) {
                    debug!("Skipping {} from block {:?}", event, log.block_number);
                    continue;
                }
                let gate = active.read();
                if !*gate {
                    break;
                }
                debug!(
                    "📨 {} in block {:?} (tx {:?})",
                    event, log.block_number, log.transaction_hash
                );
                on_event(event.display_name());
                drop(gate);
            }
            Err(e) => {
                warn!("Event watch error ({}): {}", event, e);
            }
        }
    }

    debug!("{} watch ended", event);
}
