//! Debounce and USB sync engine
//!
//! Waits for raw edges on the presence lines, waits out contact bounce with a
//! quiet-period rule and keeps the card reader's USB authorization in step
//! with whether any card is inserted.
//!
//! Every edge restarts the quiet period. A reading is trusted only when the
//! quiet period elapses with no further edge *and* a fresh sample agrees with
//! the one taken when the timer was armed.
//!
//! The engine owns the debounced state exclusively. Observers get
//! [`PresenceEvent`]s over the event bridge and never touch the state itself.

use crate::sampler::PresenceSampler;
use common::{EngineEvents, LineProvider, PresenceEvent, PresenceMask, ReaderAction, ReaderControl};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures of the edge wait once the engine is running
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Waiting for a presence edge failed: {0}")]
    IdleWait(String),

    #[error("Waiting for presence lines to settle failed: {0}")]
    SettleWait(String),
}

impl EngineError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            EngineError::IdleWait(_) => 4,
            EngineError::SettleWait(_) => 5,
        }
    }
}

/// Debounce state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Lines are quiet and the mask is confirmed
    Stable(PresenceMask),
    /// An edge was seen; `mask` is trusted if nothing changes before `deadline`
    Bouncing {
        mask: PresenceMask,
        deadline: Instant,
    },
}

pub struct SyncEngine<L, C> {
    sampler: PresenceSampler<L>,
    reader: C,
    quiet_period: Duration,
    state: DebounceState,
    debounced: PresenceMask,
    events: Option<EngineEvents>,
}

impl<L: LineProvider, C: ReaderControl> SyncEngine<L, C> {
    pub fn new(sampler: PresenceSampler<L>, reader: C, quiet_period: Duration) -> Self {
        Self {
            sampler,
            reader,
            quiet_period,
            state: DebounceState::Stable(PresenceMask::EMPTY),
            debounced: PresenceMask::EMPTY,
            events: None,
        }
    }

    /// Publish decisions on the given event bridge
    pub fn with_events(mut self, events: EngineEvents) -> Self {
        self.events = Some(events);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Last confirmed presence mask
    #[cfg(test)]
    pub fn debounced(&self) -> PresenceMask {
        self.debounced
    }

    /// Take the initial sample and force the reader into the matching state
    ///
    /// Whatever a previous run or the bootloader left behind, the reader ends
    /// up bound and authorized iff a card is present.
    pub fn synchronize(&mut self) -> PresenceMask {
        let mask = self.sampler.sample();
        self.debounced = mask;
        self.state = DebounceState::Stable(mask);

        if mask.is_any() {
            info!("Card present at startup ({}), connecting reader", mask);
            self.reader.bind();
            self.reader.connect();
        } else {
            info!("No card at startup, disconnecting reader");
            self.reader.disconnect();
        }

        self.publish(PresenceEvent::Synced { mask });
        mask
    }

    /// Block until the presence lines change and settle again
    ///
    /// Returns the newly confirmed mask. It may equal the previous one if the
    /// lines bounced back.
    pub fn wait_for_change(&mut self) -> Result<PresenceMask, EngineError> {
        let ready = self
            .sampler
            .lines_mut()
            .wait_edge(None)
            .map_err(|e| EngineError::IdleWait(e.to_string()))?;
        if !ready {
            return Err(EngineError::IdleWait(
                "wait returned without a pending edge".into(),
            ));
        }

        let mask = self.take_edges();
        self.arm(mask);

        loop {
            let (armed, deadline) = match self.state {
                DebounceState::Bouncing { mask, deadline } => (mask, deadline),
                DebounceState::Stable(mask) => return Ok(mask),
            };

            let timeout = deadline.saturating_duration_since(Instant::now());
            let edge = self
                .sampler
                .lines_mut()
                .wait_edge(Some(timeout))
                .map_err(|e| EngineError::SettleWait(e.to_string()))?;

            if edge {
                let mask = self.take_edges();
                debug!("Still bouncing at {}, restarting quiet period", mask);
                self.arm(mask);
                continue;
            }

            let confirm = self.sampler.sample();
            if confirm == armed {
                self.state = DebounceState::Stable(armed);
            } else {
                // Trust the fresh sample and restart the timer instead of waiting on the stale mask
                debug!(
                    "Presence moved from {} to {} without an edge, restarting quiet period",
                    armed, confirm
                );
                self.arm(confirm);
            }
        }
    }

    /// Record a confirmed mask, issuing connect/disconnect if aggregate presence flipped
    pub fn apply_transition(&mut self, mask: PresenceMask) -> Option<ReaderAction> {
        let from = self.debounced;
        self.debounced = mask;

        if from.is_any() == mask.is_any() {
            debug!("Presence settled {} -> {}, reader unchanged", from, mask);
            self.publish(PresenceEvent::Unchanged { from, to: mask });
            return None;
        }

        let action = if mask.is_any() {
            ReaderAction::Connect
        } else {
            ReaderAction::Disconnect
        };
        info!("Presence settled {} -> {}, {} reader", from, mask, action);
        self.reader.apply(action);
        self.publish(PresenceEvent::Changed {
            from,
            to: mask,
            action,
        });
        Some(action)
    }

    /// One full wait-debounce-apply cycle
    pub fn step(&mut self) -> Result<Option<ReaderAction>, EngineError> {
        let mask = self.wait_for_change()?;
        Ok(self.apply_transition(mask))
    }

    /// Monitor forever; only returns when the edge wait fails
    pub fn run(mut self) -> Result<Infallible, EngineError> {
        loop {
            self.step()?;
        }
    }

    /// Enter `Bouncing` with a fresh quiet period
    fn arm(&mut self, mask: PresenceMask) {
        self.state = DebounceState::Bouncing {
            mask,
            deadline: Instant::now() + self.quiet_period,
        };
    }

    /// Drain pending events, then sample
    fn take_edges(&mut self) -> PresenceMask {
        match self.sampler.lines_mut().drain_edges() {
            Ok(count) => debug!("Drained {} edge event(s)", count),
            Err(e) => warn!("Failed to drain edge events: {}", e),
        }
        self.sampler.sample()
    }

    fn publish(&self, event: PresenceEvent) {
        if let Some(events) = &self.events
            && let Err(e) = events.publish(event)
        {
            debug!("Presence event not delivered: {}", e);
        }
    }
}
