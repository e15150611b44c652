//! Scaling decision policy — pure functions of (samples, parameters).
//!
//! Every function here is total: empty sample sets and boundary
//! utilizations produce defined values, never errors. Samples are
//! re-sorted by timestamp (stable, ascending) before each evaluation
//! so out-of-order delivery from the telemetry side cannot skew the
//! weighting.

use downshift_core::{ScalingParameters, ScalingSummary, UtilizationSample};

/// Fraction of the fully-qualifying threshold weight that must be
/// reached before a scale-down fires. Fixed hysteresis margin, not
/// configurable.
pub const SCALE_DOWN_WEIGHT_FRACTION: f64 = 0.8;

/// Utilization below this skips the ratio formula and returns
/// `min_capacity` directly, keeping a near-zero denominator from
/// amplifying the target.
pub const NEAR_ZERO_UTILIZATION: f64 = 0.01;

/// Utilization values sorted ascending by timestamp (stable on ties).
fn sorted_utilizations(samples: &[UtilizationSample]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.epoch);
    sorted.into_iter().map(|s| s.utilization).collect()
}

/// Exponentially weighted mean of the samples, most recent first.
///
/// The most recent sample always has weight 1; each step into the
/// past multiplies the weight by `decay_factor`. A `decay_factor` of
/// 1 degenerates to the arithmetic mean. Returns 0.0 for an empty
/// sample set.
pub fn weighted_average(samples: &[UtilizationSample], decay_factor: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let values = sorted_utilizations(samples);
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (i, utilization) in values.iter().rev().enumerate() {
        let weight = decay_factor.powi(i as i32);
        weighted_sum += utilization * weight;
        weight_sum += weight;
    }
    weighted_sum / weight_sum
}

/// Whether the cluster should be scaled down.
///
/// Sums the weights of samples strictly below `low_threshold` and
/// compares against [`SCALE_DOWN_WEIGHT_FRACTION`] of the weight a
/// fully-populated, fully-qualifying window of `threshold_periods`
/// samples would carry. Fewer than `threshold_periods` samples is
/// insufficient data and answers `false`, whatever their values.
pub fn should_scale_down(samples: &[UtilizationSample], params: &ScalingParameters) -> bool {
    if samples.len() < params.threshold_periods {
        return false;
    }
    weighted_below_threshold(samples, params) >= required_weight(params)
}

/// Weight sum of samples strictly below the low threshold.
fn weighted_below_threshold(samples: &[UtilizationSample], params: &ScalingParameters) -> f64 {
    let values = sorted_utilizations(samples);
    let mut weighted_count = 0.0;
    for (i, utilization) in values.iter().rev().enumerate() {
        if *utilization < params.low_threshold {
            weighted_count += params.decay_factor.powi(i as i32);
        }
    }
    weighted_count
}

/// The scale-down bar: 80% of the weight sum of a hypothetical window
/// of `threshold_periods` samples that all qualify.
fn required_weight(params: &ScalingParameters) -> f64 {
    let threshold_weight_sum: f64 = (0..params.threshold_periods)
        .map(|i| params.decay_factor.powi(i as i32))
        .sum();
    threshold_weight_sum * SCALE_DOWN_WEIGHT_FRACTION
}

/// Whether original capacity should be restored while scaled down.
/// Strict comparison: equality with the high threshold does not
/// trigger a restore.
pub fn should_restore_capacity(current_utilization: f64, params: &ScalingParameters) -> bool {
    current_utilization > params.high_threshold
}

/// Capacity needed to bring utilization to the configured target.
///
/// `round(current_capacity × current / target)`, clamped to
/// `min_capacity`. Utilization under [`NEAR_ZERO_UTILIZATION`] short-
/// circuits to `min_capacity`. The result is always ≥ `min_capacity`.
pub fn calculate_target_capacity(
    current_utilization: f64,
    current_capacity: u32,
    params: &ScalingParameters,
) -> u32 {
    if current_utilization < NEAR_ZERO_UTILIZATION {
        return params.min_capacity;
    }
    let raw = current_capacity as f64 * (current_utilization / params.target_utilization);
    params.min_capacity.max(raw.round() as u32)
}

/// Recompute every decision factor from scratch.
///
/// All-zero/`false` for an empty sample set; never an error.
pub fn scaling_summary(samples: &[UtilizationSample], params: &ScalingParameters) -> ScalingSummary {
    if samples.is_empty() {
        return ScalingSummary::empty();
    }

    let values = sorted_utilizations(samples);
    let avg_utilization = values.iter().sum::<f64>() / values.len() as f64;
    let below_threshold_count = values
        .iter()
        .filter(|u| **u < params.low_threshold)
        .count();

    ScalingSummary {
        sample_count: samples.len(),
        avg_utilization,
        weighted_avg: weighted_average(samples, params.decay_factor),
        below_threshold_count,
        weighted_below_count: weighted_below_threshold(samples, params),
        should_scale_down: should_scale_down(samples, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn params() -> ScalingParameters {
        ScalingParameters {
            low_threshold: 0.4,
            high_threshold: 0.8,
            target_utilization: 0.6,
            decay_factor: 0.9,
            threshold_periods: 8,
            history_periods: 12,
            min_capacity: 1,
        }
    }

    fn series(values: &[f64]) -> Vec<UtilizationSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, u)| UtilizationSample::new(1000 + 300 * i as u64, *u))
            .collect()
    }

    /// Closed-form geometric sum used to cross-check the engine.
    fn geometric_sum(decay: f64, terms: usize) -> f64 {
        (0..terms).map(|i| decay.powi(i as i32)).sum()
    }

    // ── weighted_average ───────────────────────────────────────────

    #[test]
    fn weighted_average_of_empty_is_zero() {
        assert_eq!(weighted_average(&[], 0.9), 0.0);
    }

    #[test]
    fn weighted_average_of_single_sample_is_that_sample() {
        for decay in [0.1, 0.5, 0.9, 1.0] {
            let samples = series(&[0.37]);
            assert!((weighted_average(&samples, decay) - 0.37).abs() < EPS);
        }
    }

    #[test]
    fn decay_of_one_is_the_arithmetic_mean() {
        let samples = series(&[0.2, 0.4, 0.9, 0.1]);
        let mean = (0.2 + 0.4 + 0.9 + 0.1) / 4.0;
        assert!((weighted_average(&samples, 1.0) - mean).abs() < EPS);
    }

    #[test]
    fn recent_samples_dominate_the_weighted_average() {
        // Old samples low, newest high: weighted average must sit
        // above the plain mean.
        let samples = series(&[0.1, 0.1, 0.1, 0.9]);
        let weighted = weighted_average(&samples, 0.5);
        assert!(weighted > 0.3);
        // Exact: (0.9 + 0.05 + 0.025 + 0.0125) / 1.875
        assert!((weighted - 0.9875 / 1.875).abs() < EPS);
    }

    #[test]
    fn weighted_average_ignores_delivery_order() {
        let mut samples = series(&[0.1, 0.2, 0.9]);
        let expected = weighted_average(&samples, 0.9);
        samples.swap(0, 2);
        assert!((weighted_average(&samples, 0.9) - expected).abs() < EPS);
    }

    // ── should_scale_down ──────────────────────────────────────────

    #[test]
    fn short_history_never_scales_down() {
        let p = params();
        // Seven deeply idle samples, but m = 8.
        let samples = series(&[0.01; 7]);
        assert!(!should_scale_down(&samples, &p));
    }

    #[test]
    fn fully_idle_window_scales_down() {
        let p = params();
        // All eight below 0.4: weighted count equals the full
        // threshold weight sum, comfortably over the 80% bar.
        let samples = series(&[0.3; 8]);
        assert!(should_scale_down(&samples, &p));

        let summary = scaling_summary(&samples, &p);
        let expected = geometric_sum(0.9, 8);
        assert!((summary.weighted_below_count - expected).abs() < EPS);
    }

    #[test]
    fn single_recent_blip_still_scales_down() {
        let p = params();
        // Newest sample above threshold loses only weight 0.9^0 = 1:
        // 4.6953279 remaining vs a 4.5562623 bar. One blip is not
        // enough hysteresis to hold the decision off.
        let samples = series(&[0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.5]);
        let weighted = geometric_sum(0.9, 8) - 1.0;
        let bar = geometric_sum(0.9, 8) * SCALE_DOWN_WEIGHT_FRACTION;
        assert!((weighted - 4.6953279).abs() < 1e-7);
        assert!((bar - 4.556262328).abs() < 1e-7);
        assert!(weighted >= bar);
        assert!(should_scale_down(&samples, &p));
    }

    #[test]
    fn two_recent_blips_hold_off_scale_down() {
        let p = params();
        // Losing weights 1 and 0.9 drops the count to 3.7953279,
        // under the 4.5562623 bar.
        let samples = series(&[0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.5, 0.5]);
        let weighted = geometric_sum(0.9, 8) - 1.0 - 0.9;
        let bar = geometric_sum(0.9, 8) * SCALE_DOWN_WEIGHT_FRACTION;
        assert!(weighted < bar);
        assert!(!should_scale_down(&samples, &p));
    }

    #[test]
    fn lowering_a_sample_never_cancels_a_scale_down() {
        let p = params();
        let base = vec![0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.5];
        assert!(should_scale_down(&series(&base), &p));

        // Decreasing any single sample keeps (or strengthens) the
        // decision.
        for i in 0..base.len() {
            let mut lowered = base.clone();
            lowered[i] = (lowered[i] - 0.25).max(0.0);
            assert!(
                should_scale_down(&series(&lowered), &p),
                "lowering index {i} flipped the decision off"
            );
        }
    }

    #[test]
    fn lowering_a_blip_can_enable_a_scale_down() {
        let p = params();
        let mut values = vec![0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.5, 0.5];
        assert!(!should_scale_down(&series(&values), &p));
        values[6] = 0.39;
        assert!(should_scale_down(&series(&values), &p));
    }

    #[test]
    fn utilization_at_the_low_threshold_does_not_qualify() {
        let p = params();
        // Strictly below: exactly 0.4 counts as not idle.
        let samples = series(&[0.4; 8]);
        assert!(!should_scale_down(&samples, &p));
        assert_eq!(scaling_summary(&samples, &p).below_threshold_count, 0);
    }

    // ── should_restore_capacity ────────────────────────────────────

    #[test]
    fn restore_is_strictly_above_the_high_threshold() {
        let p = params();
        assert!(!should_restore_capacity(0.79, &p));
        assert!(!should_restore_capacity(0.8, &p));
        assert!(should_restore_capacity(0.800001, &p));
        assert!(should_restore_capacity(1.0, &p));
    }

    // ── calculate_target_capacity ──────────────────────────────────

    #[test]
    fn near_zero_utilization_returns_min_capacity() {
        let mut p = params();
        p.min_capacity = 3;
        for u in [0.0, 0.001, 0.0099] {
            assert_eq!(calculate_target_capacity(u, 100, &p), 3);
        }
    }

    #[test]
    fn exactly_one_percent_takes_the_ratio_path() {
        let mut p = params();
        p.target_utilization = 0.5;
        // 0.01 is not under the floor: 1000 × (0.01 / 0.5) = 20.
        assert_eq!(calculate_target_capacity(0.01, 1000, &p), 20);
    }

    #[test]
    fn target_capacity_matches_the_utilization_ratio() {
        let mut p = params();
        p.target_utilization = 0.5;
        // Already at target: capacity unchanged.
        assert_eq!(calculate_target_capacity(0.5, 10, &p), 10);
        // Half the target utilization: half the capacity.
        assert_eq!(calculate_target_capacity(0.25, 10, &p), 5);
    }

    #[test]
    fn target_capacity_rounds_to_nearest() {
        let mut p = params();
        p.target_utilization = 0.6;
        // 10 × (0.35 / 0.6) = 5.833… → 6.
        assert_eq!(calculate_target_capacity(0.35, 10, &p), 6);
        // 10 × (0.32 / 0.6) = 5.333… → 5.
        assert_eq!(calculate_target_capacity(0.32, 10, &p), 5);
    }

    #[test]
    fn target_capacity_never_drops_below_min() {
        let mut p = params();
        p.min_capacity = 2;
        let mut u = 0.01;
        while u <= 1.0 {
            for capacity in [1u32, 2, 10, 100] {
                let target = calculate_target_capacity(u, capacity, &p);
                assert!(target >= 2, "target {target} below min at u={u}");
            }
            u += 0.03;
        }
    }

    // ── scaling_summary ────────────────────────────────────────────

    #[test]
    fn summary_of_empty_is_all_zero() {
        assert_eq!(scaling_summary(&[], &params()), ScalingSummary::empty());
    }

    #[test]
    fn summary_reports_every_factor() {
        let p = params();
        let samples = series(&[0.3, 0.5, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3]);
        let summary = scaling_summary(&samples, &p);

        assert_eq!(summary.sample_count, 8);
        assert!((summary.avg_utilization - (0.3 * 7.0 + 0.5) / 8.0).abs() < EPS);
        assert_eq!(summary.below_threshold_count, 7);
        // The 0.5 sample is seventh from the newest: loses 0.9^6.
        let expected_below = geometric_sum(0.9, 8) - 0.9f64.powi(6);
        assert!((summary.weighted_below_count - expected_below).abs() < EPS);
        assert!((summary.weighted_avg - weighted_average(&samples, 0.9)).abs() < EPS);
        assert!(summary.should_scale_down);
    }
}
