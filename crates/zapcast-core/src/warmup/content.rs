//! Warmup content selection
//!
//! Message kinds are drawn from a fixed weighted table, restricted to the
//! kinds the user actually supplied content for and the kinds the plan
//! allows. The cumulative weights deliberately exceed 1.0; earlier entries
//! get first claim on the draw, which skews traffic toward stickers and
//! audio the way a chatty human account looks.

use crate::gateway::MediaPayload;
use crate::limits::PlanLimits;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zapcast_common::types::MessageKind;

/// Selection weights, in draw order
const KIND_WEIGHTS: &[(MessageKind, f64)] = &[
    (MessageKind::Sticker, 0.30),
    (MessageKind::Audio, 0.40),
    (MessageKind::Text, 0.30),
    (MessageKind::Reaction, 0.20),
    (MessageKind::Image, 0.10),
    (MessageKind::Video, 0.10),
];

/// User-supplied content pools for warmup traffic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPools {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub images: Vec<MediaPayload>,
    #[serde(default)]
    pub videos: Vec<MediaPayload>,
    #[serde(default)]
    pub audios: Vec<MediaPayload>,
    #[serde(default)]
    pub stickers: Vec<MediaPayload>,
    #[serde(default)]
    pub emojis: Vec<String>,
}

impl ContentPools {
    /// Whether the pool for a kind has anything to send
    pub fn has(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Text => !self.texts.is_empty(),
            MessageKind::Image => !self.images.is_empty(),
            MessageKind::Video => !self.videos.is_empty(),
            MessageKind::Audio => !self.audios.is_empty(),
            MessageKind::Sticker => !self.stickers.is_empty(),
            MessageKind::Reaction => !self.emojis.is_empty(),
        }
    }

    /// Draw a random text
    pub fn pick_text(&self) -> Option<&String> {
        self.texts.choose(&mut rand::thread_rng())
    }

    /// Draw a random emoji
    pub fn pick_emoji(&self) -> Option<&String> {
        self.emojis.choose(&mut rand::thread_rng())
    }

    /// Draw a random media item for a kind
    pub fn pick_media(&self, kind: MessageKind) -> Option<&MediaPayload> {
        let pool = match kind {
            MessageKind::Image => &self.images,
            MessageKind::Video => &self.videos,
            MessageKind::Audio => &self.audios,
            MessageKind::Sticker => &self.stickers,
            _ => return None,
        };
        pool.choose(&mut rand::thread_rng())
    }
}

/// The weighted kinds currently drawable: content exists, the plan allows
/// the kind, and reactions additionally need a message to react to.
pub fn available_kinds(
    pools: &ContentPools,
    limits: &PlanLimits,
    has_reaction_target: bool,
) -> Vec<(MessageKind, f64)> {
    KIND_WEIGHTS
        .iter()
        .filter(|(kind, _)| pools.has(*kind) && limits.allows(*kind))
        .filter(|(kind, _)| *kind != MessageKind::Reaction || has_reaction_target)
        .copied()
        .collect()
}

/// Pick a kind by cumulative weight scan over `kinds` for a draw in [0, 1).
/// Falls back to the first entry when the draw overshoots the total.
pub fn select_weighted(kinds: &[(MessageKind, f64)], draw: f64) -> Option<MessageKind> {
    if kinds.is_empty() {
        return None;
    }

    let mut accumulated = 0.0;
    for (kind, chance) in kinds {
        accumulated += chance;
        if draw <= accumulated {
            return Some(*kind);
        }
    }
    Some(kinds[0].0)
}

/// Draw a kind with a fresh random value
pub fn draw_kind(kinds: &[(MessageKind, f64)]) -> Option<MessageKind> {
    select_weighted(kinds, rand::thread_rng().gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zapcast_common::types::Plan;

    fn media() -> MediaPayload {
        MediaPayload {
            base64: "QUFB".to_string(),
            caption: None,
            file_name: None,
            mimetype: Some("image/webp".to_string()),
        }
    }

    fn full_pools() -> ContentPools {
        ContentPools {
            texts: vec!["oi".to_string()],
            images: vec![media()],
            videos: vec![media()],
            audios: vec![media()],
            stickers: vec![media()],
            emojis: vec!["👍".to_string()],
        }
    }

    #[test]
    fn test_free_plan_restricts_to_text() {
        let limits = PlanLimits::for_plan(Plan::Free);
        let kinds = available_kinds(&full_pools(), &limits, true);
        assert_eq!(kinds, vec![(MessageKind::Text, 0.30)]);
    }

    #[test]
    fn test_empty_pools_offer_nothing() {
        let limits = PlanLimits::for_plan(Plan::Enterprise);
        let kinds = available_kinds(&ContentPools::default(), &limits, true);
        assert!(kinds.is_empty());
        assert_eq!(draw_kind(&kinds), None);
    }

    #[test]
    fn test_reaction_requires_a_target() {
        let limits = PlanLimits::for_plan(Plan::Pro);
        let with = available_kinds(&full_pools(), &limits, true);
        let without = available_kinds(&full_pools(), &limits, false);
        assert!(with.iter().any(|(k, _)| *k == MessageKind::Reaction));
        assert!(!without.iter().any(|(k, _)| *k == MessageKind::Reaction));
    }

    #[test]
    fn test_weighted_scan_walks_cumulative_bands() {
        let limits = PlanLimits::for_plan(Plan::Enterprise);
        let kinds = available_kinds(&full_pools(), &limits, true);

        // Bands: sticker (0, .30], audio (.30, .70], text (.70, 1.0], ...
        assert_eq!(select_weighted(&kinds, 0.10), Some(MessageKind::Sticker));
        assert_eq!(select_weighted(&kinds, 0.50), Some(MessageKind::Audio));
        assert_eq!(select_weighted(&kinds, 0.90), Some(MessageKind::Text));
    }

    #[test]
    fn test_overshoot_falls_back_to_first() {
        let kinds = vec![(MessageKind::Text, 0.30)];
        assert_eq!(select_weighted(&kinds, 0.99), Some(MessageKind::Text));
    }
}
