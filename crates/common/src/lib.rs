//! Common building blocks for card-presenced
//!
//! This crate holds the pieces shared between the daemon binary and its tests:
//! presence data types, the GPIO line-provider and reader-control seams, the
//! event bridge from the engine thread to the async runtime, error handling and
//! logging setup.

pub mod channel;
pub mod error;
pub mod gpio;
pub mod logging;
pub mod presence;
pub mod test_utils;
pub mod usb_types;

pub use channel::{EngineEvents, PresenceEvent, PresenceEvents, create_presence_bridge};
pub use error::{Error, Result};
pub use gpio::LineProvider;
pub use logging::setup_logging;
pub use presence::{PresenceMask, Slot};
pub use usb_types::{ReaderAction, ReaderControl};
