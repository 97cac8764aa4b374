//! Event bridge between the presence engine thread and the Tokio runtime
//!
//! The engine thread is the only owner of the debounced presence state. It
//! publishes what it decided over this channel; the runtime side only observes.

use crate::{PresenceMask, ReaderAction};
use async_channel::{Receiver, Sender, TrySendError, bounded};

/// Events published by the presence engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Startup synchronisation finished
    Synced {
        /// Initial presence sample
        mask: PresenceMask,
    },

    /// A debounced change flipped the aggregate presence
    Changed {
        /// Previous debounced mask
        from: PresenceMask,
        /// New debounced mask
        to: PresenceMask,
        /// Action issued against the reader
        action: ReaderAction,
    },

    /// A debounced change that kept the aggregate presence
    Unchanged {
        /// Previous debounced mask
        from: PresenceMask,
        /// New debounced mask
        to: PresenceMask,
    },
}

impl PresenceEvent {
    /// Debounced mask after this event
    pub fn mask(&self) -> PresenceMask {
        match self {
            PresenceEvent::Synced { mask } => *mask,
            PresenceEvent::Changed { to, .. } | PresenceEvent::Unchanged { to, .. } => *to,
        }
    }
}

/// Handle for the engine thread (never blocks)
#[derive(Clone)]
pub struct EngineEvents {
    event_tx: Sender<PresenceEvent>,
}

impl EngineEvents {
    /// Publish an event without blocking
    ///
    /// A full queue drops the event; the engine must not stall on observers.
    pub fn publish(&self, event: PresenceEvent) -> crate::Result<()> {
        match self.event_tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                tracing::debug!("Presence event queue full, dropping {:?}", event);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(crate::Error::Channel("presence event receiver closed".into()))
            }
        }
    }
}

/// Handle for the Tokio runtime (async)
pub struct PresenceEvents {
    event_rx: Receiver<PresenceEvent>,
}

impl PresenceEvents {
    /// Receive the next event from the engine thread
    ///
    /// Fails once the engine side has been dropped and the queue is empty.
    pub async fn recv(&self) -> crate::Result<PresenceEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between the engine thread and the runtime
///
/// Returns (EngineEvents for the engine thread, PresenceEvents for Tokio)
pub fn create_presence_bridge() -> (EngineEvents, PresenceEvents) {
    let (event_tx, event_rx) = bounded(64);
    (EngineEvents { event_tx }, PresenceEvents { event_rx })
}
