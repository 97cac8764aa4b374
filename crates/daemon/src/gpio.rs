//! GPIO character device adapter
//!
//! Opens the presence-detect lines as a single line request: active-low
//! inputs with both-edge detection. One request means one batch read covers
//! every slot at the same instant.

use common::LineProvider;
use gpiocdev::Request;
use gpiocdev::chip::{self, Chip};
use gpiocdev::line::{EdgeDetection, Offset, Value, Values};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound of a single kernel wait when waiting forever
const IDLE_WAIT_SLICE: Duration = Duration::from_secs(3600);

/// Failures while acquiring the presence lines
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO chip labelled '{0}' not found")]
    ChipNotFound(String),

    #[error("Failed to acquire line {offset} on {chip}: {reason}")]
    LineRequest {
        chip: String,
        offset: Offset,
        reason: String,
    },

    #[error("Failed to request edge events on {chip}: {reason}")]
    EdgeRequest { chip: String, reason: String },
}

/// Locate a GPIO chip by its label
pub fn find_chip(label: &str) -> Result<PathBuf, GpioError> {
    let paths = chip::chips().map_err(|_| GpioError::ChipNotFound(label.to_string()))?;

    for path in paths {
        let Ok(chip) = Chip::from_path(&path) else {
            continue;
        };
        match chip.info() {
            Ok(info) if info.label == label => {
                debug!("Found chip '{}' at {}", label, path.display());
                return Ok(path);
            }
            _ => continue,
        }
    }

    Err(GpioError::ChipNotFound(label.to_string()))
}

/// Presence lines backed by the GPIO character device
pub struct CdevLines {
    request: Request,
    offsets: Vec<Offset>,
}

impl CdevLines {
    /// Find the chip, verify the lines and request edge events
    pub fn open(chip_label: &str, offsets: &[Offset], consumer: &str) -> Result<Self, GpioError> {
        let path = find_chip(chip_label)?;
        let chip_name = path.display().to_string();

        let chip = Chip::from_path(&path).map_err(|_| GpioError::ChipNotFound(chip_label.into()))?;
        for &offset in offsets {
            chip.line_info(offset)
                .map_err(|e| GpioError::LineRequest {
                    chip: chip_name.clone(),
                    offset,
                    reason: e.to_string(),
                })?;
        }
        drop(chip);

        let request = Request::builder()
            .on_chip(path.clone())
            .with_consumer(consumer)
            .with_lines(offsets)
            .as_input()
            .as_active_low()
            .with_edge_detection(EdgeDetection::BothEdges)
            .request()
            .map_err(|e| GpioError::EdgeRequest {
                chip: chip_name.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Requested {} presence lines {:?} on {}",
            offsets.len(),
            offsets,
            chip_name
        );

        Ok(Self {
            request,
            offsets: offsets.to_vec(),
        })
    }
}

impl LineProvider for CdevLines {
    fn levels(&mut self) -> common::Result<Vec<bool>> {
        let mut values = Values::from_offsets(&self.offsets);
        self.request
            .values(&mut values)
            .map_err(|e| common::Error::Gpio(e.to_string()))?;

        Ok(self
            .offsets
            .iter()
            .map(|&offset| values.get(offset) == Some(Value::Active))
            .collect())
    }

    fn wait_edge(&mut self, timeout: Option<Duration>) -> common::Result<bool> {
        match timeout {
            Some(timeout) => self
                .request
                .wait_edge_event(timeout)
                .map_err(|e| common::Error::Gpio(e.to_string())),
            None => loop {
                let ready = self
                    .request
                    .wait_edge_event(IDLE_WAIT_SLICE)
                    .map_err(|e| common::Error::Gpio(e.to_string()))?;
                if ready {
                    return Ok(true);
                }
            },
        }
    }

    fn drain_edges(&mut self) -> common::Result<usize> {
        let mut drained = 0;
        while self
            .request
            .has_edge_event()
            .map_err(|e| common::Error::Gpio(e.to_string()))?
        {
            let event = self
                .request
                .read_edge_event()
                .map_err(|e| common::Error::Gpio(e.to_string()))?;
            debug!("Edge on line {}: {:?}", event.offset, event.kind);
            drained += 1;
        }
        Ok(drained)
    }
}
