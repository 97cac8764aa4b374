//! Presence sampling

use common::{LineProvider, PresenceMask};
use tracing::{trace, warn};

/// Turns a batch read of the presence lines into a [`PresenceMask`]
pub struct PresenceSampler<L> {
    lines: L,
}

impl<L: LineProvider> PresenceSampler<L> {
    pub fn new(lines: L) -> Self {
        Self { lines }
    }

    /// Instantaneous presence of every slot
    ///
    /// A failed read reports no card at all.
    pub fn sample(&mut self) -> PresenceMask {
        match self.lines.levels() {
            Ok(levels) => {
                let mask = PresenceMask::from_levels(&levels);
                trace!("Sampled presence {}", mask);
                mask
            }
            Err(e) => {
                warn!("Presence read failed, assuming no card: {}", e);
                PresenceMask::EMPTY
            }
        }
    }

    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{ScriptedLines, WaitStep, levels};

    #[test]
    fn test_sample_maps_levels_to_bits() {
        for bits in 0..16u8 {
            let mut sampler = PresenceSampler::new(ScriptedLines::new(&levels(bits)));
            assert_eq!(sampler.sample().bits(), bits);
        }
    }

    #[test]
    fn test_sample_read_failure_is_empty() {
        let mut sampler = PresenceSampler::new(ScriptedLines::new(&levels(0b1111)).failing_reads());
        assert_eq!(sampler.sample(), PresenceMask::EMPTY);
    }

    #[test]
    fn test_sample_tracks_line_changes() {
        let mut sampler =
            PresenceSampler::new(ScriptedLines::new(&levels(0)).then(WaitStep::Edge(levels(0b0100))));
        assert_eq!(sampler.sample(), PresenceMask::EMPTY);
        assert!(sampler.lines_mut().wait_edge(None).unwrap());
        assert_eq!(sampler.sample(), PresenceMask::from_bits(0b0100));
    }
}
