use crate::data_loading::ImuSample;
use anyhow::{bail, Result};

/// Raw counts per g at the configured ±2 g full-scale range (16-bit).
pub const ACCEL_LSB_PER_G: f64 = 16384.0;
/// Raw counts per deg/s at the configured ±250 dps full-scale range.
pub const GYRO_LSB_PER_DPS: f64 = 131.0;

/// A timestamp first-difference below this marks a rollover of the u32
/// millisecond counter (a large negative jump).
pub const ROLLOVER_JUMP_MS: i64 = -100_000;

/// Sensor counts converted to physical units (g, deg/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSample {
    pub ax_g: f64,
    pub ay_g: f64,
    pub az_g: f64,
    pub gx_dps: f64,
    pub gy_dps: f64,
    pub gz_dps: f64,
}

impl PhysicalSample {
    pub fn accel_magnitude(&self) -> f64 {
        (self.ax_g * self.ax_g + self.ay_g * self.ay_g + self.az_g * self.az_g).sqrt()
    }

    pub fn gyro_magnitude(&self) -> f64 {
        (self.gx_dps * self.gx_dps + self.gy_dps * self.gy_dps + self.gz_dps * self.gz_dps).sqrt()
    }
}

pub fn to_physical(sample: &ImuSample) -> PhysicalSample {
    PhysicalSample {
        ax_g: sample.ax_raw as f64 / ACCEL_LSB_PER_G,
        ay_g: sample.ay_raw as f64 / ACCEL_LSB_PER_G,
        az_g: sample.az_raw as f64 / ACCEL_LSB_PER_G,
        gx_dps: sample.gx_raw as f64 / GYRO_LSB_PER_DPS,
        gy_dps: sample.gy_raw as f64 / GYRO_LSB_PER_DPS,
        gz_dps: sample.gz_raw as f64 / GYRO_LSB_PER_DPS,
    }
}

/// Accel and gyro magnitude series for a whole recording.
pub fn magnitude_series(samples: &[ImuSample]) -> (Vec<f64>, Vec<f64>) {
    let mut accel_mag = Vec::with_capacity(samples.len());
    let mut gyro_mag = Vec::with_capacity(samples.len());
    for sample in samples {
        let physical = to_physical(sample);
        accel_mag.push(physical.accel_magnitude());
        gyro_mag.push(physical.gyro_magnitude());
    }
    (accel_mag, gyro_mag)
}

/// Truncate the recording at the first timestamp rollover.
///
/// The device clock is a u32 millisecond counter; when it wraps, consecutive
/// timestamps jump by a large negative amount. Everything from the first such
/// jump onward is dropped (no wrap-around stitching). Returns the kept prefix
/// and, if a rollover was found, the index the series was cut at.
pub fn truncate_at_rollover(samples: &[ImuSample]) -> (&[ImuSample], Option<usize>) {
    for i in 1..samples.len() {
        let diff = samples[i].timestamp_ms as i64 - samples[i - 1].timestamp_ms as i64;
        if diff < ROLLOVER_JUMP_MS {
            return (&samples[..i], Some(i));
        }
    }
    (samples, None)
}

/// Elapsed seconds since the first sample.
pub fn time_axis(samples: &[ImuSample]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let origin = samples[0].timestamp_ms;
    samples
        .iter()
        .map(|s| (s.timestamp_ms as f64 - origin as f64) / 1000.0)
        .collect()
}

/// Estimate the sampling rate from the median timestamp delta.
pub fn estimate_sample_rate(samples: &[ImuSample]) -> Result<f64> {
    if samples.len() < 2 {
        bail!("Cannot estimate sample rate from fewer than 2 samples");
    }

    let mut diffs: Vec<i64> = samples
        .windows(2)
        .map(|pair| pair[1].timestamp_ms as i64 - pair[0].timestamp_ms as i64)
        .collect();
    diffs.sort_unstable();
    let median = diffs[diffs.len() / 2];

    if median <= 0 {
        bail!("Timestamps are not increasing (median delta {} ms)", median);
    }
    Ok(1000.0 / median as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_at(ts: u32) -> ImuSample {
        ImuSample {
            timestamp_ms: ts,
            ax_raw: 0,
            ay_raw: 0,
            az_raw: 0,
            gx_raw: 0,
            gy_raw: 0,
            gz_raw: 0,
        }
    }

    #[test]
    fn scaling_matches_full_scale_constants() {
        let sample = ImuSample {
            timestamp_ms: 0,
            ax_raw: 16384,
            ay_raw: -16384,
            az_raw: 0,
            gx_raw: 131,
            gy_raw: -262,
            gz_raw: 0,
        };
        let physical = to_physical(&sample);
        assert_relative_eq!(physical.ax_g, 1.0);
        assert_relative_eq!(physical.ay_g, -1.0);
        assert_relative_eq!(physical.gx_dps, 1.0);
        assert_relative_eq!(physical.gy_dps, -2.0);
    }

    #[test]
    fn scaling_is_invertible_up_to_rounding() {
        for raw in [-32768i16, -1234, -1, 0, 1, 9999, 32767] {
            let g = raw as f64 / ACCEL_LSB_PER_G;
            assert_eq!((g * ACCEL_LSB_PER_G).round() as i32, raw as i32);
            let dps = raw as f64 / GYRO_LSB_PER_DPS;
            assert_eq!((dps * GYRO_LSB_PER_DPS).round() as i32, raw as i32);
        }
    }

    #[test]
    fn magnitude_is_euclidean_norm() {
        let sample = ImuSample {
            timestamp_ms: 0,
            ax_raw: 16384,
            ay_raw: 16384,
            az_raw: 16384,
            gx_raw: 0,
            gy_raw: 0,
            gz_raw: 0,
        };
        let physical = to_physical(&sample);
        assert_relative_eq!(physical.accel_magnitude(), 3.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(physical.gyro_magnitude(), 0.0);
    }

    #[test]
    fn truncates_before_first_rollover() {
        // Simulated wrap: the counter climbs 0, 10s, 20s, ... 990s and then
        // snaps back to 5s, a negative jump far past the rollover threshold.
        let mut samples: Vec<ImuSample> = (0..100).map(|i| sample_at(i * 10_000)).collect();
        samples.push(sample_at(5_000));

        let (kept, cut) = truncate_at_rollover(&samples);
        assert_eq!(cut, Some(100));
        assert_eq!(kept.len(), 100);
        assert_eq!(kept.last().unwrap().timestamp_ms, 990_000);

        let t = time_axis(kept);
        assert!(t.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(t[0], 0.0);
        assert_relative_eq!(*t.last().unwrap(), 990.0);
    }

    #[test]
    fn no_rollover_is_identity() {
        let samples: Vec<ImuSample> = (0..50).map(|i| sample_at(i * 20)).collect();
        let (kept, cut) = truncate_at_rollover(&samples);
        assert_eq!(cut, None);
        assert_eq!(kept.len(), 50);
    }

    #[test]
    fn small_backwards_jitter_is_not_a_rollover() {
        let samples = vec![sample_at(0), sample_at(100), sample_at(95), sample_at(200)];
        let (kept, cut) = truncate_at_rollover(&samples);
        assert_eq!(cut, None);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn estimates_sample_rate_from_median_delta() {
        let samples: Vec<ImuSample> = (0..100).map(|i| sample_at(i * 20)).collect();
        let fs = estimate_sample_rate(&samples).unwrap();
        assert_relative_eq!(fs, 50.0);
    }

    #[test]
    fn sample_rate_estimation_rejects_stuck_clock() {
        let samples = vec![sample_at(10); 20];
        assert!(estimate_sample_rate(&samples).is_err());
    }
}
