//! usb-storage quirk removal
//!
//! The bootloader may register a quirk for the card reader that stops
//! usb-storage from binding it. At startup the daemon removes that single
//! entry from the module's comma-separated quirk list and leaves any other
//! entries alone.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Longest quirk list read from the parameter file
const MAX_QUIRKS_LEN: u64 = 1023;

/// What `remove_quirk` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuirkOutcome {
    /// The entry was found and the shortened list written back
    Removed,
    /// The list does not contain the entry; nothing was written
    NotPresent,
    /// The parameter file is missing, empty or unreadable
    Unavailable,
    /// The entry was found but writing the list back failed
    WriteFailed,
}

/// Remove the first `token` entry from a comma-separated list
///
/// Returns `None` when no entry equals `token`. Entries are compared whole,
/// so a token that is only part of a longer entry is never matched.
pub fn strip_quirk(list: &str, token: &str) -> Option<String> {
    let mut entries: Vec<&str> = list.split(',').collect();
    let index = entries.iter().position(|entry| *entry == token)?;
    entries.remove(index);
    Some(entries.join(","))
}

/// Remove `token` from the quirk list stored at `path`
///
/// Best-effort: every failure is logged and absorbed.
pub fn remove_quirk(path: &Path, token: &str) -> QuirkOutcome {
    let list = match read_quirks(path) {
        Ok(Some(list)) => list,
        Ok(None) => {
            debug!("Quirk list {} is empty", path.display());
            return QuirkOutcome::Unavailable;
        }
        Err(e) => {
            debug!("Cannot read quirk list {}: {}", path.display(), e);
            return QuirkOutcome::Unavailable;
        }
    };

    let Some(remaining) = strip_quirk(&list, token) else {
        debug!("Quirk {} not installed", token);
        return QuirkOutcome::NotPresent;
    };

    match fs::write(path, remaining.as_bytes()) {
        Ok(()) => {
            info!("Removed usb-storage quirk {}", token);
            QuirkOutcome::Removed
        }
        Err(e) => {
            warn!("Failed to write quirk list {}: {}", path.display(), e);
            QuirkOutcome::WriteFailed
        }
    }
}

/// Read the list without its trailing newline; `None` if there is nothing to read
fn read_quirks(path: &Path) -> std::io::Result<Option<String>> {
    let mut raw = Vec::new();
    File::open(path)?
        .take(MAX_QUIRKS_LEN)
        .read_to_end(&mut raw)?;

    if raw.is_empty() {
        return Ok(None);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }

    String::from_utf8(raw)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
