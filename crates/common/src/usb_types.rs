//! Card reader USB control types

use std::fmt;

/// Side effects the daemon issues against the USB subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderAction {
    /// Bind the reader's interface to the storage driver
    Bind,
    /// Authorize the reader device
    Connect,
    /// Deauthorize the reader device
    Disconnect,
}

impl fmt::Display for ReaderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderAction::Bind => f.write_str("bind"),
            ReaderAction::Connect => f.write_str("connect"),
            ReaderAction::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// Control surface for the card reader's USB state
///
/// All operations are best-effort. Implementations absorb failures; the
/// caller never learns whether the subsystem accepted the request.
pub trait ReaderControl {
    fn bind(&mut self);

    fn connect(&mut self);

    fn disconnect(&mut self);

    fn apply(&mut self, action: ReaderAction) {
        match action {
            ReaderAction::Bind => self.bind(),
            ReaderAction::Connect => self.connect(),
            ReaderAction::Disconnect => self.disconnect(),
        }
    }
}
