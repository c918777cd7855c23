//! Engagement metrics.
//!
//! The engagement rate is always recomputed from the current counts and is
//! never read back from a store.

use serde::Serialize;

use crate::models::VideoRecord;

/// `(likes + comments + shares) / max(views, 1) * 100`, rounded to 2 dp.
///
/// Zero views divide by 1, so the rate is the raw interaction count
/// times 100.
pub fn compute_engagement_rate(video: &VideoRecord) -> f64 {
    let interactions = video.likes as f64 + video.comments as f64 + video.shares as f64;
    let views = video.views.max(1) as f64;
    round_to(interactions / views * 100.0, 2)
}

/// Set `engagement_rate` on every video. Idempotent.
pub fn apply_engagement(videos: &mut [VideoRecord]) {
    for video in videos.iter_mut() {
        video.engagement_rate = Some(compute_engagement_rate(video));
    }
}

/// Headline sums over a video corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusTotals {
    pub videos: usize,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    /// `None` when no video in the corpus tracks saves.
    pub saves: Option<u64>,
    pub avg_engagement_rate: f64,
}

pub fn corpus_totals(videos: &[VideoRecord]) -> CorpusTotals {
    let mut totals = CorpusTotals {
        videos: videos.len(),
        ..Default::default()
    };
    let mut rate_sum = 0.0;
    for v in videos {
        totals.views = totals.views.saturating_add(v.views);
        totals.likes = totals.likes.saturating_add(v.likes);
        totals.comments = totals.comments.saturating_add(v.comments);
        totals.shares = totals.shares.saturating_add(v.shares);
        if let Some(saves) = v.saves {
            totals.saves = Some(totals.saves.unwrap_or(0).saturating_add(saves));
        }
        rate_sum += compute_engagement_rate(v);
    }
    if !videos.is_empty() {
        totals.avg_engagement_rate = round_to(rate_sum / videos.len() as f64, 2);
    }
    totals
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
