//! Test utilities for card-presenced
//!
//! Provides a scripted [`LineProvider`] and a recording [`ReaderControl`] so
//! the debounce engine can be exercised without GPIO hardware or sysfs.
//!
//! # Example
//!
//! ```
//! use common::LineProvider;
//! use common::test_utils::{ScriptedLines, WaitStep};
//!
//! let mut lines = ScriptedLines::new(&[false, false])
//!     .then(WaitStep::Edge(vec![true, false]));
//! assert_eq!(lines.levels().unwrap(), vec![false, false]);
//! assert!(lines.wait_edge(None).unwrap());
//! assert_eq!(lines.drain_edges().unwrap(), 1);
//! assert_eq!(lines.levels().unwrap(), vec![true, false]);
//! ```

use crate::{Error, LineProvider, ReaderAction, ReaderControl, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one `wait_edge` call
#[derive(Debug, Clone)]
pub enum WaitStep {
    /// An edge arrives and the lines settle at these levels
    Edge(Vec<bool>),
    /// The wait times out with no change
    Timeout,
    /// The wait times out, but the levels changed without a queued event
    SilentChange(Vec<bool>),
    /// The wait call itself fails
    Fail(String),
}

/// One call made on a [`ScriptedLines`], in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCall {
    /// Batch read of the line levels
    Read,
    /// Edge wait; `edge` is true when it reported a pending event
    Wait { edge: bool },
    /// Drain of pending edge events
    Drain,
}

/// Line provider that replays a fixed script of wait outcomes
///
/// Once the script is exhausted every further wait fails, which ends an
/// engine's `run` loop.
pub struct ScriptedLines {
    levels: Vec<bool>,
    script: VecDeque<WaitStep>,
    pending: usize,
    fail_reads: bool,
    waits: Arc<Mutex<Vec<Option<Duration>>>>,
    calls: Arc<Mutex<Vec<LineCall>>>,
}

impl ScriptedLines {
    pub fn new(initial: &[bool]) -> Self {
        Self {
            levels: initial.to_vec(),
            script: VecDeque::new(),
            pending: 0,
            fail_reads: false,
            waits: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a step to the script
    pub fn then(mut self, step: WaitStep) -> Self {
        self.script.push_back(step);
        self
    }

    /// Make every batch read fail
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Shared log of the timeouts passed to `wait_edge`
    pub fn waits(&self) -> Arc<Mutex<Vec<Option<Duration>>>> {
        Arc::clone(&self.waits)
    }

    /// Shared log of every read, wait and drain in the order they happened
    pub fn calls(&self) -> Arc<Mutex<Vec<LineCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: LineCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| Error::Other("call log poisoned".into()))?
            .push(call);
        Ok(())
    }
}

impl LineProvider for ScriptedLines {
    fn levels(&mut self) -> Result<Vec<bool>> {
        self.record(LineCall::Read)?;
        if self.fail_reads {
            return Err(Error::Gpio("scripted read failure".into()));
        }
        Ok(self.levels.clone())
    }

    fn wait_edge(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.waits
            .lock()
            .map_err(|_| Error::Other("wait log poisoned".into()))?
            .push(timeout);

        let outcome = match self.script.pop_front() {
            Some(WaitStep::Edge(levels)) => {
                self.levels = levels;
                self.pending += 1;
                Ok(true)
            }
            Some(WaitStep::Timeout) => Ok(false),
            Some(WaitStep::SilentChange(levels)) => {
                self.levels = levels;
                Ok(false)
            }
            Some(WaitStep::Fail(reason)) => Err(Error::Gpio(reason)),
            None => Err(Error::Gpio("script exhausted".into())),
        };
        self.record(LineCall::Wait {
            edge: matches!(outcome, Ok(true)),
        })?;
        outcome
    }

    fn drain_edges(&mut self) -> Result<usize> {
        self.record(LineCall::Drain)?;
        Ok(std::mem::take(&mut self.pending))
    }
}

/// Reader control that records every action issued
#[derive(Clone, Default)]
pub struct RecordingReader {
    actions: Arc<Mutex<Vec<ReaderAction>>>,
}

impl RecordingReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the actions issued so far
    pub fn actions(&self) -> Vec<ReaderAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&mut self, action: ReaderAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

impl ReaderControl for RecordingReader {
    fn bind(&mut self) {
        self.record(ReaderAction::Bind);
    }

    fn connect(&mut self) {
        self.record(ReaderAction::Connect);
    }

    fn disconnect(&mut self) {
        self.record(ReaderAction::Disconnect);
    }
}

/// Level vector for a four-slot reader from a mask literal
///
/// # Example
/// ```
/// use common::test_utils::levels;
///
/// assert_eq!(levels(0b0011), vec![true, true, false, false]);
/// ```
pub fn levels(bits: u8) -> Vec<bool> {
    (0..4).map(|i| bits & (1 << i) != 0).collect()
}
