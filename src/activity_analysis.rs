use crate::config::{MaskPolicy, PipelineConfig};
use crate::step_analysis::percentile;
use log::debug;
use serde::Serialize;

/// A half-open `[start, end)` interval over sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplePeriod {
    pub start: usize,
    pub end: usize,
}

impl SamplePeriod {
    /// Interval bounds on the recording's time axis: `(start_s, end_s,
    /// duration_s)`. The half-open end may point one past the last sample.
    pub fn bounds_s(&self, t: &[f64]) -> (f64, f64, f64) {
        let start_s = t[self.start];
        let end_s = if self.end < t.len() {
            t[self.end]
        } else {
            *t.last().unwrap()
        };
        (start_s, end_s, end_s - start_s)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Contiguous active and inactive regions of one recording. The two lists
/// are disjoint and together cover every sample index exactly once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Segmentation {
    pub active: Vec<SamplePeriod>,
    pub inactive: Vec<SamplePeriod>,
}

/// Fraction of sign changes within a centered window of `window` samples.
///
/// The divisor is the fixed window width, so values taper toward the signal
/// edges where the window hangs over the boundary.
pub fn zero_crossing_rate(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 || window == 0 {
        return vec![0.0; n];
    }

    let mut crossings = vec![0.0f64; n];
    for i in 0..n.saturating_sub(1) {
        if signal[i].signum() != signal[i + 1].signum() {
            crossings[i] = 1.0;
        }
    }

    // Prefix sums make the sliding window O(1) per sample.
    let mut prefix = vec![0.0f64; n + 1];
    for i in 0..n {
        prefix[i + 1] = prefix[i] + crossings[i];
    }

    // Each window covers exactly `window` crossing flags, centered on `i`
    // (the extra slot of an even window falls on the right).
    let half = window / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + (window - half)).min(n);
            (prefix[hi] - prefix[lo]) / window as f64
        })
        .collect()
}

/// Per-sample activity mask combining the amplitude and ZCR conditions.
pub fn activity_mask(
    filtered: &[f64],
    zcr: &[f64],
    amplitude_threshold: f64,
    zcr_threshold: f64,
    policy: MaskPolicy,
) -> Vec<bool> {
    filtered
        .iter()
        .zip(zcr.iter())
        .map(|(&x, &z)| {
            let loud = x.abs() > amplitude_threshold;
            let oscillating = z > zcr_threshold;
            match policy {
                MaskPolicy::And => loud && oscillating,
                MaskPolicy::Or => loud || oscillating,
            }
        })
        .collect()
}

/// Edge-detect the mask into raw activity periods.
///
/// INACTIVE -> ACTIVE on a rising edge, ACTIVE -> INACTIVE on a falling edge;
/// an ACTIVE region still open at end-of-sequence is closed at the last
/// index. Initial state is INACTIVE.
pub fn mask_to_periods(mask: &[bool]) -> Vec<SamplePeriod> {
    let mut periods = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &active) in mask.iter().enumerate() {
        match (start, active) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                periods.push(SamplePeriod { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        periods.push(SamplePeriod { start: s, end: mask.len() });
    }
    periods
}

/// Coalesce periods separated by at most `min_gap` samples. Merging chains:
/// a run of close-together periods collapses into one.
pub fn merge_periods(periods: &[SamplePeriod], min_gap: usize) -> Vec<SamplePeriod> {
    let mut merged: Vec<SamplePeriod> = Vec::new();
    for &period in periods {
        match merged.last_mut() {
            Some(prev) if period.start.saturating_sub(prev.end) <= min_gap => {
                prev.end = prev.end.max(period.end);
            }
            _ => merged.push(period),
        }
    }
    merged
}

/// Every maximal span not covered by an activity period, including the
/// boundary spans at the very start and end of the recording.
pub fn complement_periods(periods: &[SamplePeriod], len: usize) -> Vec<SamplePeriod> {
    let mut inactive = Vec::new();
    let mut cursor = 0;
    for period in periods {
        if period.start > cursor {
            inactive.push(SamplePeriod { start: cursor, end: period.start });
        }
        cursor = period.end;
    }
    if cursor < len {
        inactive.push(SamplePeriod { start: cursor, end: len });
    }
    inactive
}

/// Segment a filtered magnitude series into active and inactive regions.
///
/// The amplitude condition compares `|filtered|` against a percentile of its
/// own distribution; the ZCR condition does the same over a clipped copy of
/// the signal. A constant or non-finite signal yields no active periods
/// instead of degenerate thresholds.
pub fn segment(filtered: &[f64], config: &PipelineConfig) -> Segmentation {
    let n = filtered.len();
    if n == 0 {
        return Segmentation::default();
    }

    let all_inactive = Segmentation {
        active: Vec::new(),
        inactive: vec![SamplePeriod { start: 0, end: n }],
    };

    if !filtered.iter().all(|v| v.is_finite()) {
        debug!("Non-finite filtered signal, reporting the recording as inactive");
        return all_inactive;
    }
    let max = filtered.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = filtered.iter().cloned().fold(f64::INFINITY, f64::min);
    // Tolerance sits far below sensor resolution but above the numeric
    // residue filtfilt leaves when the input is a pure constant.
    if max - min < 1e-9 {
        return all_inactive;
    }

    let clipped: Vec<f64> = filtered
        .iter()
        .map(|&x| x.clamp(-config.clip_limit_g, config.clip_limit_g))
        .collect();
    let zcr = zero_crossing_rate(&clipped, config.zcr_window);

    let magnitudes: Vec<f64> = filtered.iter().map(|x| x.abs()).collect();
    let amplitude_threshold = percentile(&magnitudes, config.amplitude_percentile);
    let zcr_threshold = percentile(&zcr, config.zcr_percentile);
    debug!(
        "activity thresholds: amplitude {:.5}, zcr {:.5}",
        amplitude_threshold, zcr_threshold
    );

    let mask = activity_mask(filtered, &zcr, amplitude_threshold, zcr_threshold, config.mask_policy);
    let raw = mask_to_periods(&mask);
    let active = merge_periods(&raw, config.merge_gap_samples);
    let inactive = complement_periods(&active, n);

    Segmentation { active, inactive }
}
