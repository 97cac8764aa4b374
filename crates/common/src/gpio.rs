//! GPIO line provider abstraction
//!
//! The daemon consumes presence-detect lines through this trait so the
//! debounce engine can be driven by real hardware or by a scripted provider
//! in tests.

use std::time::Duration;

/// A fixed, ordered set of input lines that report edge events
///
/// Levels are logical: a line configured active-low reads `true` when the
/// electrical level is low.
pub trait LineProvider {
    /// Read every line in one batch, in request order
    fn levels(&mut self) -> crate::Result<Vec<bool>>;

    /// Block until an edge is pending on any line
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first. `None` waits forever.
    fn wait_edge(&mut self, timeout: Option<Duration>) -> crate::Result<bool>;

    /// Read out all pending edge events, returning how many were consumed
    fn drain_edges(&mut self) -> crate::Result<usize>;
}

impl<L: LineProvider + ?Sized> LineProvider for Box<L> {
    fn levels(&mut self) -> crate::Result<Vec<bool>> {
        (**self).levels()
    }

    fn wait_edge(&mut self, timeout: Option<Duration>) -> crate::Result<bool> {
        (**self).wait_edge(timeout)
    }

    fn drain_edges(&mut self) -> crate::Result<usize> {
        (**self).drain_edges()
    }
}
