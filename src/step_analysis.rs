use crate::config::PipelineConfig;
use log::{debug, warn};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

/// A confirmed step peak, located on the recording's time axis.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeakEvent {
    pub index: usize,
    pub time_s: f64,
    pub value: f64,
}

/// Gait cadence is only searched for inside this band (Hz); slower than one
/// step per two seconds or faster than three per second is not walking.
const CADENCE_BAND_HZ: (f64, f64) = (0.5, 3.0);

/// Nearest-rank percentile of `values` (pct in 0..=100).
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() as f64 * pct / 100.0) as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn local_maxima(signal: &[f64]) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }
    (1..signal.len() - 1)
        .filter(|&i| signal[i] > signal[i - 1] && signal[i] > signal[i + 1])
        .collect()
}

/// Prominence of the peak at `idx`: vertical drop to the lowest point between
/// the peak and the nearest higher sample on each side (or the signal edge),
/// taking the smaller drop of the two.
fn peak_prominence(signal: &[f64], idx: usize) -> f64 {
    let peak = signal[idx];

    let mut left_base = peak;
    let mut i = idx;
    while i > 0 {
        i -= 1;
        if signal[i] > peak {
            break;
        }
        left_base = left_base.min(signal[i]);
    }

    let mut right_base = peak;
    let mut i = idx;
    while i + 1 < signal.len() {
        i += 1;
        if signal[i] > peak {
            break;
        }
        right_base = right_base.min(signal[i]);
    }

    peak - left_base.max(right_base)
}

fn enforce_min_distance(signal: &[f64], candidates: Vec<usize>, min_distance: usize) -> Vec<usize> {
    if min_distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    // Taller peaks win distance conflicts; on equal height the leftmost wins.
    let mut by_priority = candidates.clone();
    by_priority.sort_by(|&a, &b| {
        signal[b]
            .partial_cmp(&signal[a])
            .unwrap()
            .then(a.cmp(&b))
    });

    let mut kept: Vec<usize> = Vec::new();
    for idx in by_priority {
        let conflicts = kept
            .iter()
            .any(|&k| ((k as i64 - idx as i64).unsigned_abs() as usize) < min_distance);
        if !conflicts {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

/// Local maxima of `signal` that clear the `height` and `prominence`
/// thresholds and are at least `min_distance` samples apart.
///
/// An empty result just means nothing qualified. Candidate filtering runs
/// height, then distance, then prominence, matching the reference tooling.
pub fn find_peaks(signal: &[f64], height: f64, prominence: f64, min_distance: usize) -> Vec<usize> {
    let candidates: Vec<usize> = local_maxima(signal)
        .into_iter()
        .filter(|&i| signal[i] >= height)
        .collect();
    let spaced = enforce_min_distance(signal, candidates, min_distance);
    spaced
        .into_iter()
        .filter(|&i| peak_prominence(signal, i) >= prominence)
        .collect()
}

/// Step-candidate detection with adaptive thresholds.
///
/// The height threshold starts at a percentile of the signal itself (motion
/// amplitude varies a lot between recordings) and the prominence threshold at
/// a fraction of that. If the attempt yields an implausible peak count the
/// thresholds are relaxed geometrically, up to `max_detect_attempts` times;
/// the stopping predicate is `3 <= count < len/2` and the last attempt's
/// result stands if no attempt satisfies it.
pub fn fit_step_peaks(signal: &[f64], config: &PipelineConfig, min_distance: usize) -> Vec<usize> {
    if !signal.iter().all(|v| v.is_finite()) {
        warn!("Detection signal contains non-finite values, skipping peak search");
        return Vec::new();
    }
    let max = signal.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = signal.iter().cloned().fold(f64::INFINITY, f64::min);
    if signal.is_empty() || max - min < 1e-9 {
        // Constant signal: percentile thresholds would be degenerate.
        return Vec::new();
    }

    let mut height = percentile(signal, config.height_percentile);
    let mut prominence = height * config.prominence_fraction;
    let mut peaks = Vec::new();

    for attempt in 0..config.max_detect_attempts.max(1) {
        peaks = find_peaks(signal, height, prominence, min_distance);
        debug!(
            "attempt {}: height {:.4}, prominence {:.4} -> {} peaks",
            attempt,
            height,
            prominence,
            peaks.len()
        );
        if peaks.len() >= 3 && peaks.len() < signal.len() / 2 {
            return peaks;
        }
        height *= 0.5;
        prominence *= 0.5;
    }
    peaks
}

/// Gait confirmation: reject isolated peaks, keep sustained runs.
///
/// Peaks are grouped into runs by scanning consecutive time gaps; a gap above
/// `max_gap_s` starts a new run. Runs shorter than `min_run` are dropped in
/// full, the rest are concatenated in original order.
pub fn confirm_gait(peaks: &[usize], t: &[f64], min_run: usize, max_gap_s: f64) -> Vec<usize> {
    let mut confirmed = Vec::new();
    if peaks.is_empty() {
        return confirmed;
    }

    let mut current_run = vec![peaks[0]];
    for pair in peaks.windows(2) {
        let gap = t[pair[1]] - t[pair[0]];
        if gap <= max_gap_s {
            current_run.push(pair[1]);
        } else {
            if current_run.len() >= min_run {
                confirmed.extend_from_slice(&current_run);
            }
            current_run = vec![pair[1]];
        }
    }
    if current_run.len() >= min_run {
        confirmed.extend_from_slice(&current_run);
    }
    confirmed
}

/// Optional accel+gyro fusion: each filtered series is normalized by its
/// absolute maximum and mixed with `accel_weight`. A flat series contributes
/// zero instead of dividing by zero.
pub fn fuse_activity_index(a_filt: &[f64], g_filt: &[f64], accel_weight: f64) -> Vec<f64> {
    fn max_normalize(signal: &[f64]) -> Vec<f64> {
        let max_abs = signal.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
        if max_abs <= f64::EPSILON {
            vec![0.0; signal.len()]
        } else {
            signal.iter().map(|&v| v / max_abs).collect()
        }
    }

    let a_norm = max_normalize(a_filt);
    let g_norm = max_normalize(g_filt);
    a_norm
        .iter()
        .zip(g_norm.iter())
        .map(|(&a, &g)| accel_weight * a + (1.0 - accel_weight) * g)
        .collect()
}

/// Dominant frequency of the detection signal inside the cadence band, in
/// steps per second. Diagnostic output only; detection never depends on it.
pub fn estimate_cadence(signal: &[f64], sample_rate_hz: f64) -> Option<f64> {
    if signal.len() < 8 {
        return None;
    }

    let mean = signal.iter().sum::<f64>() / signal.len() as f64;

    // Pad to a power of two for the FFT.
    let n = signal.len().next_power_of_two();
    let mut buffer = vec![Complex::new(0.0, 0.0); n];
    for (i, &x) in signal.iter().enumerate() {
        buffer[i] = Complex::new(x - mean, 0.0);
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let freq_resolution = sample_rate_hz / n as f64;
    let min_idx = (CADENCE_BAND_HZ.0 / freq_resolution).ceil() as usize;
    let max_idx = ((CADENCE_BAND_HZ.1 / freq_resolution).floor() as usize).min(n / 2);
    if min_idx > max_idx {
        return None;
    }

    let mut max_power = 0.0;
    let mut peak_freq = 0.0;
    for i in min_idx..=max_idx {
        let power = buffer[i].norm_sqr();
        if power > max_power {
            max_power = power;
            peak_freq = i as f64 * freq_resolution;
        }
    }

    if peak_freq > 0.0 {
        Some(peak_freq)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn finds_strict_local_maxima_above_height() {
        let signal = [0.0, 1.0, 0.0, 3.0, 0.0, 0.2, 0.0];
        assert_eq!(find_peaks(&signal, 0.5, 0.0, 1), vec![1, 3]);
        assert_eq!(find_peaks(&signal, 2.0, 0.0, 1), vec![3]);
        assert!(find_peaks(&signal, 10.0, 0.0, 1).is_empty());
    }

    #[test]
    fn plateaus_are_not_strict_maxima() {
        let signal = [0.0, 1.0, 1.0, 0.0];
        assert!(find_peaks(&signal, 0.0, 0.0, 1).is_empty());
    }

    #[test]
    fn prominence_uses_smaller_side_drop() {
        // Peak of 2 at index 1 is separated from the taller peak at index 3
        // by a saddle at 1.0, so its prominence is 1.0, not 2.0.
        let signal = [0.0, 2.0, 1.0, 3.0, 0.0];
        assert_eq!(find_peaks(&signal, 0.0, 1.5, 1), vec![3]);
        assert_eq!(find_peaks(&signal, 0.0, 0.9, 1), vec![1, 3]);
    }

    #[test]
    fn distance_conflicts_keep_the_taller_peak() {
        let signal = [0.0, 1.0, 0.0, 2.0, 0.0, 1.0, 0.0];
        assert_eq!(find_peaks(&signal, 0.0, 0.0, 3), vec![3]);
        // All three survive once the spacing constraint allows it.
        assert_eq!(find_peaks(&signal, 0.0, 0.0, 2), vec![1, 3, 5]);
    }

    #[test]
    fn distance_ties_keep_the_leftmost_peak() {
        let signal = [0.0, 1.0, 0.0, 1.0, 0.0];
        assert_eq!(find_peaks(&signal, 0.0, 0.0, 3), vec![1]);
    }

    #[test]
    fn peak_count_is_monotone_in_height_and_distance() {
        let signal: Vec<f64> = (0..200)
            .map(|i| {
                let t = i as f64 / 50.0;
                (2.0 * PI * 2.0 * t).sin() + 0.4 * (2.0 * PI * 7.3 * t).sin()
            })
            .collect();

        let mut prev = usize::MAX;
        for height in [-1.0, -0.5, 0.0, 0.3, 0.6, 0.9, 1.2] {
            let count = find_peaks(&signal, height, 0.0, 1).len();
            assert!(count <= prev, "height {} increased peak count", height);
            prev = count;
        }

        let mut prev = usize::MAX;
        for distance in [1, 2, 5, 10, 25, 60] {
            let count = find_peaks(&signal, 0.0, 0.0, distance).len();
            assert!(count <= prev, "distance {} increased peak count", distance);
            prev = count;
        }
    }

    #[test]
    fn gait_confirmation_drops_short_runs() {
        // Runs: [1,2,3] kept, [10,11,12,13] kept, isolated [30] dropped.
        let t = vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0, 30.0];
        let peaks: Vec<usize> = (0..t.len()).collect();
        let confirmed = confirm_gait(&peaks, &t, 3, 6.0);
        assert_eq!(confirmed, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn gait_confirmation_of_empty_input_is_empty() {
        assert!(confirm_gait(&[], &[], 3, 6.0).is_empty());
    }

    #[test]
    fn gait_confirmation_keeps_single_long_run_in_full() {
        let t = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let peaks: Vec<usize> = (0..5).collect();
        assert_eq!(confirm_gait(&peaks, &t, 3, 6.0).len(), 5);
    }

    #[test]
    fn adaptive_search_falls_back_to_last_attempt() {
        // Only two bumps exist, so the stopping predicate (count >= 3) can
        // never be met; after all relaxations the two peaks are returned.
        let mut signal = vec![0.0; 120];
        for (offset, scale) in [(30usize, 1.0), (80, 0.6)] {
            signal[offset - 1] = 0.5 * scale;
            signal[offset] = 1.0 * scale;
            signal[offset + 1] = 0.5 * scale;
        }
        let config = PipelineConfig::default();
        let peaks = fit_step_peaks(&signal, &config, 5);
        assert_eq!(peaks, vec![30, 80]);
    }

    #[test]
    fn adaptive_search_guards_degenerate_signals() {
        let config = PipelineConfig::default();
        assert!(fit_step_peaks(&vec![1.0; 100], &config, 5).is_empty());
        assert!(fit_step_peaks(&[], &config, 5).is_empty());
        let with_nan = vec![0.0, f64::NAN, 1.0, 0.0];
        assert!(fit_step_peaks(&with_nan, &config, 1).is_empty());
    }

    #[test]
    fn adaptive_search_finds_walking_peaks_directly() {
        // 1.25 Hz at 50 Hz sampling puts a crest exactly on every 40th sample.
        let fs = 50.0;
        let signal: Vec<f64> = (0..500)
            .map(|i| (2.0 * PI * 1.25 * i as f64 / fs).sin())
            .collect();
        let config = PipelineConfig::default();
        let peaks = fit_step_peaks(&signal, &config, (0.5 * fs) as usize);
        assert!(peaks.len() >= 11 && peaks.len() <= 13, "{} peaks", peaks.len());
    }

    #[test]
    fn fusion_mixes_normalized_series() {
        let a = vec![0.0, 2.0, 0.0];
        let g = vec![4.0, 0.0, 0.0];
        let fused = fuse_activity_index(&a, &g, 0.9);
        assert_relative_eq!(fused[0], 0.1);
        assert_relative_eq!(fused[1], 0.9);
        assert_relative_eq!(fused[2], 0.0);
    }

    #[test]
    fn fusion_guards_flat_gyro() {
        let a = vec![0.0, 2.0];
        let g = vec![0.0, 0.0];
        let fused = fuse_activity_index(&a, &g, 0.9);
        assert_relative_eq!(fused[1], 0.9);
        assert!(fused.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cadence_matches_dominant_frequency() {
        let fs = 20.0;
        let signal: Vec<f64> = (0..600)
            .map(|i| 1.0 + 0.3 * (2.0 * PI * 1.0 * i as f64 / fs).sin())
            .collect();
        let cadence = estimate_cadence(&signal, fs).unwrap();
        assert!((cadence - 1.0).abs() < 0.1, "cadence {}", cadence);
    }

    #[test]
    fn cadence_of_tiny_input_is_none() {
        assert!(estimate_cadence(&[1.0, 2.0, 3.0], 20.0).is_none());
    }
}
