//! Quality availability probing.
//!
//! Both tiers are probed concurrently. A failed probe only marks its own tier
//! unavailable; it never fails the resolution.

use crate::models::{QualityAvailability, QualityTier};
use crate::providers::LinkProvider;

fn probe(link: &dyn LinkProvider, track_id: &str, tier: QualityTier) -> bool {
    match link.resolve_url(track_id, tier) {
        Ok(url) => url.is_some(),
        Err(err) => {
            log::warn!(
                "Failed to get download URL for quality {} ({}): {}",
                tier.label(),
                tier.code(),
                err
            );
            false
        }
    }
}

pub fn probe_qualities(link: &dyn LinkProvider, track_id: &str) -> QualityAvailability {
    let (mp3_320, flac) = rayon::join(
        || probe(link, track_id, QualityTier::Mp3_320),
        || probe(link, track_id, QualityTier::Flac),
    );
    QualityAvailability { mp3_320, flac }
}
