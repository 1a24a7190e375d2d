pub mod activity_analysis;
pub mod config;
pub mod data_loading;
pub mod filtering;
pub mod output;
pub mod preprocessing;
pub mod step_analysis;

use activity_analysis::Segmentation;
use anyhow::{bail, Result};
use config::PipelineConfig;
use data_loading::ImuSample;
use log::{debug, warn};
use step_analysis::PeakEvent;

/// The zero-phase filter pads the signal at both ends before the backward
/// pass; recordings shorter than this have no runway left after padding.
const MIN_ANALYZABLE_SAMPLES: usize = 64;

/// Everything the pipeline derives from one recording.
#[derive(Debug, Clone)]
pub struct RecordingAnalysis {
    /// Sampling rate used for the analysis (configured or estimated).
    pub sample_rate_hz: f64,
    /// Elapsed seconds since the first kept sample.
    pub time_axis: Vec<f64>,
    /// Zero-phase filtered accel magnitude (g).
    pub filtered_accel: Vec<f64>,
    /// Zero-phase filtered gyro magnitude (deg/s).
    pub filtered_gyro: Vec<f64>,
    /// Confirmed step count (after gait confirmation).
    pub step_count: usize,
    /// The confirmed step peaks, in time order.
    pub confirmed_peaks: Vec<PeakEvent>,
    /// Dominant gait frequency in steps/second, when one stands out.
    pub cadence_hz: Option<f64>,
    /// Active and inactive regions of the recording.
    pub segmentation: Segmentation,
    /// Index the series was cut at when the timestamp counter rolled over.
    pub rollover_truncation: Option<usize>,
}

/// Run the whole offline pipeline over one recording.
///
/// Stages: rollover truncation, unit conversion + magnitudes, zero-phase
/// band-limiting, adaptive peak detection + gait confirmation, and activity
/// segmentation. Strictly sequential and synchronous; the caller owns the
/// sample buffer and every derived array in the result.
pub fn analyze_recording(
    samples: &[ImuSample],
    config: &PipelineConfig,
) -> Result<RecordingAnalysis> {
    if samples.is_empty() {
        bail!("No IMU samples supplied");
    }

    let (samples, rollover_truncation) = preprocessing::truncate_at_rollover(samples);
    if let Some(idx) = rollover_truncation {
        warn!(
            "Timestamp rollover detected at index {}; using only the first {} samples",
            idx,
            samples.len()
        );
    }
    if samples.len() < MIN_ANALYZABLE_SAMPLES {
        bail!(
            "Recording too short to analyze: {} samples (need at least {})",
            samples.len(),
            MIN_ANALYZABLE_SAMPLES
        );
    }

    let sample_rate_hz = match config.sample_rate_hz {
        Some(fs) if fs > 0.0 => fs,
        Some(fs) => bail!("Invalid sample rate: {} Hz", fs),
        None => {
            let fs = preprocessing::estimate_sample_rate(samples)?;
            debug!("Estimated sample rate: {:.2} Hz", fs);
            fs
        }
    };

    let time_axis = preprocessing::time_axis(samples);
    let (accel_mag, gyro_mag) = preprocessing::magnitude_series(samples);

    let filtered_accel = filtering::band_limit(
        &accel_mag,
        config.lowcut_hz,
        config.highcut_hz,
        sample_rate_hz,
        config.filter_order,
    )?;
    let filtered_gyro = filtering::band_limit(
        &gyro_mag,
        config.lowcut_hz,
        config.highcut_hz,
        sample_rate_hz,
        config.filter_order,
    )?;

    let detection_signal = if config.fuse_gyro {
        step_analysis::fuse_activity_index(&filtered_accel, &filtered_gyro, config.accel_weight)
    } else {
        filtered_accel.clone()
    };

    let min_distance = ((config.min_step_interval_s * sample_rate_hz).round() as usize).max(1);
    let candidates = step_analysis::fit_step_peaks(&detection_signal, config, min_distance);
    debug!("{} candidate peaks before gait confirmation", candidates.len());

    let confirmed = step_analysis::confirm_gait(
        &candidates,
        &time_axis,
        config.min_consecutive_steps,
        config.max_step_interval_s,
    );
    let confirmed_peaks: Vec<PeakEvent> = confirmed
        .iter()
        .map(|&index| PeakEvent {
            index,
            time_s: time_axis[index],
            value: detection_signal[index],
        })
        .collect();

    // One step per confirmed peak unless the legacy half-stride convention
    // was explicitly requested.
    let step_count = if config.half_stride_peaks {
        confirmed_peaks.len() * 2
    } else {
        confirmed_peaks.len()
    };

    let cadence_hz = step_analysis::estimate_cadence(&detection_signal, sample_rate_hz);
    let segmentation = activity_analysis::segment(&filtered_accel, config);

    Ok(RecordingAnalysis {
        sample_rate_hz,
        time_axis,
        filtered_accel,
        filtered_gyro,
        step_count,
        confirmed_peaks,
        cadence_hz,
        segmentation,
        rollover_truncation,
    })
}
