//! Card presence types
//!
//! A [`PresenceMask`] holds one bit per monitored slot. Bit `i` corresponds to
//! the `i`-th presence line in the order the lines were requested, and a set
//! bit means a card is physically seated in that slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Card slot types on a multi-format reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// SD / MMC
    Sd,
    /// xD-Picture Card
    Xd,
    /// Memory Stick
    Ms,
    /// CompactFlash
    Cf,
}

impl Slot {
    pub fn name(&self) -> &'static str {
        match self {
            Slot::Sd => "SD",
            Slot::Xd => "xD",
            Slot::Ms => "MS",
            Slot::Cf => "CF",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maximum number of slots a mask can represent
pub const MAX_SLOTS: usize = 8;

/// Bitmask of slots that currently hold a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PresenceMask(u8);

impl PresenceMask {
    /// No card in any slot
    pub const EMPTY: PresenceMask = PresenceMask(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Build a mask from logical line levels
    ///
    /// Level `i` sets bit `i`. Levels past [`MAX_SLOTS`] are ignored.
    pub fn from_levels(levels: &[bool]) -> Self {
        let bits = levels
            .iter()
            .take(MAX_SLOTS)
            .enumerate()
            .filter(|(_, active)| **active)
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// True if any slot holds a card
    pub const fn is_any(&self) -> bool {
        self.0 != 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index < MAX_SLOTS && self.0 & (1 << index) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Slots present in this mask, given the slot order of the line set
    pub fn slots<'a>(&'a self, order: &'a [Slot]) -> impl Iterator<Item = Slot> + 'a {
        order
            .iter()
            .enumerate()
            .filter(|(i, _)| self.contains(*i))
            .map(|(_, slot)| *slot)
    }
}

impl fmt::Display for PresenceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}
