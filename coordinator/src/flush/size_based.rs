use config::Flush;
use log::info;
use parking_lot::Mutex;

use super::CommittingSegment;

/// Adaptive sizing from observed segment sizes.
///
/// The target for the next segment is
/// `ideal_size * (a * current_ratio + b * prior_ratio)` with `a = 0.25` and
/// `b = 0.75` by default, where the ratio is rows per byte of the committed
/// segment and the prior ratio accumulates over all previous commits of the
/// table. Segments that land outside the `[min, max]` size guard band skip
/// the ratio formula and grow by half or halve instead; the uneven blend
/// weights and the guard bands together damp oscillation when the average
/// record size drifts.
#[derive(Debug)]
pub struct SizeBasedPolicy {
    ideal_segment_size_bytes: u64,

    min_size_bytes: f64,

    max_size_bytes: f64,

    initial_rows_threshold: u64,

    current_ratio_weight: f64,

    prior_ratio_weight: f64,

    /// Rows-to-bytes ratio of the table's last committed segment; zero until
    /// the first commit. In-memory only: losing it on restart merely degrades
    /// the first sizing decision.
    latest_rows_to_size_ratio: Mutex<f64>,
}

impl SizeBasedPolicy {
    pub fn new(flush: &Flush) -> Self {
        Self {
            ideal_segment_size_bytes: flush.ideal_segment_size_bytes,
            min_size_bytes: flush.ideal_segment_size_bytes as f64 * flush.min_size_factor,
            max_size_bytes: flush.ideal_segment_size_bytes as f64 * flush.max_size_factor,
            initial_rows_threshold: flush.initial_rows_threshold,
            current_ratio_weight: flush.current_ratio_weight,
            prior_ratio_weight: flush.prior_ratio_weight,
            latest_rows_to_size_ratio: Mutex::new(0.0),
        }
    }

    pub fn rows_threshold(&self, committing: Option<&CommittingSegment>) -> u64 {
        let Some(segment) = committing else {
            // No committing-segment statistics. A table with ratio history is
            // a newly added partition; size it from the history. Otherwise
            // start from the fixed default.
            let prior_ratio = *self.latest_rows_to_size_ratio.lock();
            if prior_ratio > 0.0 {
                let target = self.ideal_segment_size_bytes as f64 * prior_ratio;
                info!(
                    "No committing segment statistics, sizing from historical ratio {}: {} rows",
                    prior_ratio,
                    cap_rows(target)
                );
                return cap_rows(target);
            }
            return self.initial_rows_threshold.max(1);
        };

        if segment.size_bytes == 0 {
            // First commit after a repair: the previous artifact size is
            // unknown, keep the threshold unchanged.
            return segment.rows_threshold.max(1);
        }

        let current_ratio = segment.row_count as f64 / segment.size_bytes as f64;
        let blended_ratio = {
            let mut prior = self.latest_rows_to_size_ratio.lock();
            if *prior > 0.0 {
                *prior = self.current_ratio_weight * current_ratio
                    + self.prior_ratio_weight * *prior;
            } else {
                *prior = current_ratio;
            }
            *prior
        };

        let size_bytes = segment.size_bytes as f64;
        let target = if size_bytes < self.min_size_bytes {
            // Finished far too small, likely under a conservative threshold.
            segment.row_count as f64 * 1.5
        } else if size_bytes > self.max_size_bytes {
            segment.row_count as f64 / 2.0
        } else {
            self.ideal_segment_size_bytes as f64 * blended_ratio
        };
        info!(
            "Rows consumed: {}, segment size: {}, blended ratio: {}, next threshold: {}",
            segment.row_count,
            segment.size_bytes,
            blended_ratio,
            cap_rows(target)
        );
        cap_rows(target)
    }
}

/// Clamp a computed target into the representable positive range.
pub(crate) fn cap_rows(target: f64) -> u64 {
    if !(target >= 1.0) {
        return 1;
    }
    if target > i32::MAX as f64 {
        return i32::MAX as u64;
    }
    target as u64
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn policy(ideal: u64) -> SizeBasedPolicy {
        let flush = Flush {
            ideal_segment_size_bytes: ideal,
            ..Default::default()
        };
        SizeBasedPolicy::new(&flush)
    }

    fn segment(row_count: u64, size_bytes: u64) -> CommittingSegment {
        CommittingSegment {
            row_count,
            size_bytes,
            rows_threshold: 100_000,
            consumption_time: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_first_segment_uses_default() {
        let policy = policy(500_000_000);
        assert_eq!(100_000, policy.rows_threshold(None));
    }

    #[test]
    fn test_new_partition_uses_historical_ratio() {
        let policy = policy(500_000_000);
        // Seed the history with one in-band commit.
        policy.rows_threshold(Some(&segment(100_000, 400_000_000)));
        // ratio = 0.00025 -> 500_000_000 * 0.00025 = 125_000
        assert_eq!(125_000, policy.rows_threshold(None));
    }

    #[test]
    fn test_in_band_blends_ratio() {
        let policy = policy(500_000_000);
        // First commit: no prior ratio, blended = current = 0.00025.
        assert_eq!(125_000, policy.rows_threshold(Some(&segment(100_000, 400_000_000))));
        // Second commit at ratio 0.0005: blended = 0.25*0.0005 + 0.75*0.00025.
        let target = policy.rows_threshold(Some(&segment(200_000, 400_000_000)));
        let prior = 100_000f64 / 400_000_000f64;
        let current = 200_000f64 / 400_000_000f64;
        let expected = (500_000_000f64 * (0.25 * current + 0.75 * prior)) as u64;
        assert_eq!(expected, target);
        assert!((156_249..=156_251).contains(&target), "target {}", target);
    }

    #[test]
    fn test_small_segment_grows_aggressively() {
        let policy = policy(500_000_000);
        // 100 MB is below the 250 MB guard band.
        let target = policy.rows_threshold(Some(&segment(100_000, 100_000_000)));
        assert_eq!(150_000, target);
    }

    #[test]
    fn test_large_segment_halves() {
        let policy = policy(500_000_000);
        // 800 MB exceeds the 750 MB guard band.
        let target = policy.rows_threshold(Some(&segment(100_000, 800_000_000)));
        assert_eq!(50_000, target);
    }

    #[test]
    fn test_repair_reuses_threshold() {
        let policy = policy(500_000_000);
        let mut repair = segment(0, 0);
        repair.rows_threshold = 180_000;
        assert_eq!(180_000, policy.rows_threshold(Some(&repair)));
    }

    #[test]
    fn test_target_never_below_one() {
        let policy = policy(500_000_000);
        // Ratio of zero rows per byte, in-band size.
        let target = policy.rows_threshold(Some(&segment(0, 400_000_000)));
        assert_eq!(1, target);
    }

    #[test]
    fn test_target_capped_on_overflow() {
        let policy = policy(u64::MAX / 2);
        // An absurd ratio must clamp at the representable maximum.
        let target = policy.rows_threshold(Some(&segment(u64::MAX / 4, 1)));
        assert_eq!(i32::MAX as u64, target);
    }

    #[test]
    fn test_bounded_oscillation_under_stable_record_size() {
        let policy = policy(500_000_000);
        // 4000 bytes per row; start from the default threshold and iterate
        // the control loop. The target must settle inside the guard band.
        let bytes_per_row = 4_000u64;
        let mut threshold = 100_000u64;
        for _ in 0..10 {
            let size = threshold * bytes_per_row;
            threshold = policy.rows_threshold(Some(&segment(threshold, size)));
        }
        let final_size = threshold * bytes_per_row;
        assert!(final_size >= 250_000_000, "size {} too small", final_size);
        assert!(final_size <= 750_000_000, "size {} too large", final_size);
    }
}
