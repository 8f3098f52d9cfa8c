//! Humanized send pacing
//!
//! Every outbound action sleeps for a randomized interval first, so an
//! instance's traffic never forms a mechanical rhythm. The bands are fixed
//! per content kind; campaign leads use the campaign's own min/max delay.

use rand::Rng;
use std::time::Duration;
use zapcast_common::types::MessageKind;

/// Inclusive pause band in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseBand {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl PauseBand {
    pub const fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Pre-send pause for one message kind
    pub const fn for_kind(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text | MessageKind::Reaction => Self::new(2, 5),
            MessageKind::Audio => Self::new(5, 15),
            MessageKind::Image | MessageKind::Video => Self::new(3, 8),
            MessageKind::Sticker => Self::new(2, 6),
        }
    }

    /// Pause between consecutive messages of one warmup cycle
    pub const INTER_MESSAGE: Self = Self::new(8, 20);

    /// Pause between full warmup cycles
    pub const INTER_CYCLE: Self = Self::new(15, 30);

    /// Draw a duration uniformly from the band
    pub fn sample(&self) -> Duration {
        Duration::from_secs(uniform_secs(self.min_secs, self.max_secs))
    }
}

/// Uniform draw from `[min, max]` seconds. A degenerate or inverted band
/// collapses to `min`.
pub fn uniform_secs(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Sleep for a uniformly drawn interval in `[min, max]` seconds
pub async fn sleep_between(min: u64, max: u64) {
    tokio::time::sleep(Duration::from_secs(uniform_secs(min, max))).await;
}

/// Sleep for a draw from the band
pub async fn pause(band: PauseBand) {
    tokio::time::sleep(band.sample()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_uniform_stays_in_band() {
        for _ in 0..200 {
            let v = uniform_secs(8, 20);
            assert!((8..=20).contains(&v), "drew {v}");
        }
    }

    #[test]
    fn test_inverted_band_collapses_to_min() {
        assert_eq!(uniform_secs(30, 5), 30);
        assert_eq!(uniform_secs(7, 7), 7);
    }

    #[test]
    fn test_kind_bands() {
        assert_eq!(PauseBand::for_kind(MessageKind::Text), PauseBand::new(2, 5));
        assert_eq!(PauseBand::for_kind(MessageKind::Audio), PauseBand::new(5, 15));
        assert_eq!(PauseBand::for_kind(MessageKind::Image), PauseBand::new(3, 8));
        assert_eq!(PauseBand::for_kind(MessageKind::Video), PauseBand::new(3, 8));
        assert_eq!(PauseBand::for_kind(MessageKind::Sticker), PauseBand::new(2, 6));
    }
}
