use chrono::{DateTime, Utc};

/// Only the most recent gaps carry the weighting; anything further back has a
/// relative weight below 2^-63 and would push the shift past what u128 holds.
const MAX_WEIGHTED_GAPS: usize = 64;

/// Weighted average of the day-gaps between consecutive events, weighting gap
/// *i* (0-indexed from the oldest) by `2^i` so the most recent intervals
/// dominate. Returns `default_days` when fewer than two gaps can be computed.
///
/// `timestamps` must be sorted ascending; the caller owns that invariant.
pub fn weighted_interval_days(timestamps: &[DateTime<Utc>], default_days: i64) -> i64 {
    if timestamps.len() < 2 {
        return default_days;
    }

    let gaps: Vec<u128> = timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days().max(0) as u128)
        .collect();
    let skip = gaps.len().saturating_sub(MAX_WEIGHTED_GAPS);

    let mut weighted_sum: u128 = 0;
    let mut total_weight: u128 = 0;
    for (i, gap) in gaps[skip..].iter().enumerate() {
        let weight = 1u128 << i;
        weighted_sum += gap * weight;
        total_weight += weight;
    }

    (weighted_sum / total_weight) as i64
}
