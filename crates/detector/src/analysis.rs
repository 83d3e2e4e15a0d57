use serde::Serialize;

use crate::{DetectionParams, Frame};

/// Aggregate statistics of one frame against one threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ZoneAnalysis {
    pub valid_readings: u8,
    /// Closest valid reading; the top of the valid range when nothing was valid.
    pub closest_mm: u16,
    /// Mean of all valid readings, 0 when nothing was valid.
    pub average_mm: u16,
    /// Valid readings strictly below the threshold.
    pub below_threshold: u8,
    /// `100 * below_threshold / valid_readings`, 0 when nothing was valid.
    pub confidence_pct: f32,
    pub timestamp_ms: u64,
}

/// Reduce a frame to its detection statistics.
///
/// Readings outside `[min_range_mm, max_range_mm]` (including 0, "no return")
/// are ignored entirely.
pub fn analyze(
    frame: &Frame,
    threshold_mm: u16,
    params: &DetectionParams,
    timestamp_ms: u64,
) -> ZoneAnalysis {
    let mut valid: u8 = 0;
    let mut below: u8 = 0;
    let mut sum: u32 = 0;
    let mut closest = params.max_range_mm;

    for &d in frame.zones().iter().filter(|&&d| params.is_valid_reading(d)) {
        valid += 1;
        sum += u32::from(d);
        closest = closest.min(d);
        if d < threshold_mm {
            below += 1;
        }
    }

    let (average_mm, confidence_pct) = if valid > 0 {
        (
            (sum / u32::from(valid)) as u16,
            f32::from(below) / f32::from(valid) * 100.0,
        )
    } else {
        (0, 0.0)
    };

    ZoneAnalysis {
        valid_readings: valid,
        closest_mm: closest,
        average_mm,
        below_threshold: below,
        confidence_pct,
        timestamp_ms,
    }
}

/// Which consensus rule decided the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Too few valid zones to trust the frame.
    InsufficientData,
    /// Too small a share of zones below the threshold.
    LowConsensus,
    /// Closest reading stands out from the background average.
    DistinctObject,
    /// Most of the field of view is below the threshold.
    Majority,
    /// Enough consensus, but neither a distinct object nor a majority.
    NoConsensus,
}

impl Verdict {
    pub fn is_detected(self) -> bool {
        matches!(self, Verdict::DistinctObject | Verdict::Majority)
    }
}

/// Apply the consensus rules in order; the first decisive rule wins.
pub fn consensus(a: &ZoneAnalysis, params: &DetectionParams) -> Verdict {
    if a.valid_readings < params.min_valid_readings {
        return Verdict::InsufficientData;
    }

    if a.confidence_pct < params.consensus_pct {
        return Verdict::LowConsensus;
    }

    // Signed: the average can sit within the hysteresis band of zero.
    let spread_floor = i32::from(a.average_mm) - i32::from(params.hysteresis_mm);
    if a.below_threshold > 0 && i32::from(a.closest_mm) < spread_floor {
        return Verdict::DistinctObject;
    }

    if a.confidence_pct > params.high_confidence_pct {
        return Verdict::Majority;
    }

    Verdict::NoConsensus
}

pub fn is_object_present(a: &ZoneAnalysis, params: &DetectionParams) -> bool {
    consensus(a, params).is_detected()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZONE_COUNT;
    use proptest::prelude::*;

    fn p() -> DetectionParams {
        DetectionParams::default()
    }

    /// 60 valid zones: 10 at 300mm, 50 at 1020mm (average 900), 4 no-return.
    fn scenario_a_frame() -> Frame {
        let mut zones = [0u16; ZONE_COUNT];
        for (i, z) in zones.iter_mut().enumerate().take(60) {
            *z = if i < 10 { 300 } else { 1020 };
        }
        Frame::new(zones)
    }

    #[test]
    fn blank_frame_has_zero_stats() {
        let a = analyze(&Frame::blank(), 1000, &p(), 7);
        assert_eq!(a.valid_readings, 0);
        assert_eq!(a.below_threshold, 0);
        assert_eq!(a.average_mm, 0);
        assert_eq!(a.confidence_pct, 0.0);
        assert_eq!(a.closest_mm, 4000);
        assert_eq!(a.timestamp_ms, 7);
        assert_eq!(consensus(&a, &p()), Verdict::InsufficientData);
    }

    #[test]
    fn out_of_range_readings_are_excluded() {
        let mut zones = [0u16; ZONE_COUNT];
        zones[0] = 30; // under noise floor
        zones[1] = 5000; // beyond range
        zones[2] = 800;
        zones[3] = 1200;
        let a = analyze(&Frame::new(zones), 1000, &p(), 0);
        assert_eq!(a.valid_readings, 2);
        assert_eq!(a.closest_mm, 800);
        assert_eq!(a.average_mm, 1000);
        assert_eq!(a.below_threshold, 1);
        assert_eq!(a.confidence_pct, 50.0);
    }

    #[test]
    fn reading_equal_to_threshold_is_not_below() {
        let a = analyze(&Frame::filled(1000), 1000, &p(), 0);
        assert_eq!(a.valid_readings, 64);
        assert_eq!(a.below_threshold, 0);
    }

    #[test]
    fn full_frame_sum_does_not_overflow() {
        let a = analyze(&Frame::filled(4000), u16::MAX, &p(), 0);
        assert_eq!(a.average_mm, 4000);
        assert_eq!(a.confidence_pct, 100.0);
    }

    #[test]
    fn scenario_a_distinct_close_object_is_detected() {
        let a = analyze(&scenario_a_frame(), 1000, &p(), 0);
        assert_eq!(a.valid_readings, 60);
        assert_eq!(a.below_threshold, 10);
        assert_eq!(a.closest_mm, 300);
        assert_eq!(a.average_mm, 900);
        assert!((a.confidence_pct - 16.67).abs() < 0.01);
        assert_eq!(consensus(&a, &p()), Verdict::DistinctObject);
        assert!(is_object_present(&a, &p()));
    }

    #[test]
    fn scenario_b_three_close_readings_are_not_enough() {
        let mut zones = [0u16; ZONE_COUNT];
        zones[10] = 200;
        zones[11] = 210;
        zones[12] = 220;
        let a = analyze(&Frame::new(zones), 1000, &p(), 0);
        assert_eq!(a.valid_readings, 3);
        assert_eq!(a.confidence_pct, 100.0);
        assert_eq!(consensus(&a, &p()), Verdict::InsufficientData);
    }

    #[test]
    fn small_share_below_threshold_is_low_consensus() {
        // 5 of 64 below: 7.8%
        let mut f = Frame::filled(2000);
        for x in 0..5 {
            f.set(x, 0, 300);
        }
        let a = analyze(&f, 1000, &p(), 0);
        assert_eq!(consensus(&a, &p()), Verdict::LowConsensus);
    }

    #[test]
    fn uniform_wall_inside_threshold_is_majority() {
        // No spread at all, so only the majority rule can fire.
        let a = analyze(&Frame::filled(600), 1000, &p(), 0);
        assert_eq!(a.closest_mm, a.average_mm);
        assert_eq!(consensus(&a, &p()), Verdict::Majority);
    }

    #[test]
    fn moderate_share_without_spread_is_no_consensus() {
        // 16 of 64 at 950, rest at 1000: closest is only 12mm under average.
        let mut f = Frame::filled(1000);
        for x in 0..8 {
            f.set(x, 0, 950);
            f.set(x, 1, 950);
        }
        let a = analyze(&f, 1000, &p(), 0);
        assert_eq!(a.below_threshold, 16);
        assert_eq!(consensus(&a, &p()), Verdict::NoConsensus);
        assert!(!is_object_present(&a, &p()));
    }

    #[test]
    fn average_inside_hysteresis_band_does_not_underflow() {
        let a = ZoneAnalysis {
            valid_readings: 10,
            closest_mm: 50,
            average_mm: 60,
            below_threshold: 3,
            confidence_pct: 30.0,
            timestamp_ms: 0,
        };
        assert_eq!(consensus(&a, &p()), Verdict::NoConsensus);
    }

    fn stats(valid: u8, below: u8, closest: u16, average: u16, pct: f32) -> ZoneAnalysis {
        ZoneAnalysis {
            valid_readings: valid,
            closest_mm: closest,
            average_mm: average,
            below_threshold: below,
            confidence_pct: pct,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn confidence_exactly_at_consensus_floor_passes() {
        // 10 valid zones, one of them under the threshold: exactly 10%.
        let mut f = Frame::blank();
        for i in 0..10 {
            let (x, y) = crate::zone_coords(i);
            f.set(x, y, 1000);
        }
        f.set(0, 0, 950);
        let a = analyze(&f, 1000, &p(), 0);
        assert_eq!(a.valid_readings, 10);
        assert_eq!(a.confidence_pct, 10.0);
        assert_eq!(consensus(&a, &p()), Verdict::NoConsensus);

        assert_eq!(
            consensus(&stats(10, 1, 900, 950, 10.0), &p()),
            Verdict::NoConsensus
        );
        assert_eq!(
            consensus(&stats(10, 1, 900, 950, 9.99), &p()),
            Verdict::LowConsensus
        );
    }

    #[test]
    fn confidence_exactly_at_majority_floor_is_not_majority() {
        // Half the field below, no spread.
        let mut f = Frame::filled(1000);
        for y in 0..4 {
            for x in 0..8 {
                f.set(x, y, 990);
            }
        }
        let a = analyze(&f, 1000, &p(), 0);
        assert_eq!(a.confidence_pct, 50.0);
        assert_eq!(consensus(&a, &p()), Verdict::NoConsensus);

        assert_eq!(
            consensus(&stats(64, 32, 990, 995, 50.0), &p()),
            Verdict::NoConsensus
        );
        assert_eq!(
            consensus(&stats(64, 33, 990, 995, 50.01), &p()),
            Verdict::Majority
        );
    }

    #[test]
    fn closest_on_hysteresis_edge_is_not_distinct() {
        assert_eq!(
            consensus(&stats(10, 2, 800, 900, 20.0), &p()),
            Verdict::NoConsensus
        );
        assert_eq!(
            consensus(&stats(10, 2, 799, 900, 20.0), &p()),
            Verdict::DistinctObject
        );
    }

    fn any_frame() -> impl Strategy<Value = Frame> {
        proptest::collection::vec(0u16..6000, ZONE_COUNT).prop_map(|v| {
            let mut zones = [0u16; ZONE_COUNT];
            zones.copy_from_slice(&v);
            Frame::new(zones)
        })
    }

    proptest! {
        #[test]
        fn analysis_invariants_hold(frame in any_frame(), threshold in any::<u16>()) {
            let a = analyze(&frame, threshold, &p(), 0);
            prop_assert!(usize::from(a.valid_readings) <= ZONE_COUNT);
            prop_assert!(a.below_threshold <= a.valid_readings);
            prop_assert!((0.0..=100.0).contains(&a.confidence_pct));
            if a.valid_readings == 0 {
                prop_assert_eq!(a.confidence_pct, 0.0);
            }
        }

        #[test]
        fn analysis_is_idempotent(frame in any_frame(), threshold in any::<u16>()) {
            prop_assert_eq!(
                analyze(&frame, threshold, &p(), 42),
                analyze(&frame, threshold, &p(), 42)
            );
        }

        #[test]
        fn too_few_valid_readings_never_detect(
            readings in proptest::collection::vec(50u16..=4000, 0..5),
            threshold in any::<u16>(),
        ) {
            let mut zones = [0u16; ZONE_COUNT];
            zones[..readings.len()].copy_from_slice(&readings);
            let a = analyze(&Frame::new(zones), threshold, &p(), 0);
            prop_assert!(!is_object_present(&a, &p()));
        }

        #[test]
        fn nothing_below_threshold_never_detects(frame in any_frame()) {
            // Threshold at the noise floor: no valid reading can be below it.
            let a = analyze(&frame, 50, &p(), 0);
            prop_assert_eq!(a.below_threshold, 0);
            prop_assert!(!is_object_present(&a, &p()));
        }
    }
}
