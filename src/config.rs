use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

/// How the amplitude and zero-crossing-rate conditions combine into the
/// per-sample activity mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Both conditions must hold (stricter, default).
    And,
    /// Either condition is enough.
    Or,
}

impl FromStr for MaskPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(MaskPolicy::And),
            "or" => Ok(MaskPolicy::Or),
            _ => Err(format!(
                "Invalid mask policy: {}. Use \"and\" (amplitude AND zcr, default) or \"or\"",
                s
            )),
        }
    }
}

/// Process IMU recordings (step counting + activity segmentation)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a .bin/.csv recording, or a directory of recordings
    #[arg(help = "Path to a .bin/.csv recording, or a directory of recordings")]
    pub input_path: PathBuf,

    /// Force CSV parsing regardless of file extension
    #[arg(long)]
    pub csv_input: bool,

    /// Sampling rate in Hz (estimated from timestamps when omitted)
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Band-pass low cutoff in Hz (0 selects a plain low-pass at the high cutoff)
    #[arg(long, default_value = "0.3")]
    pub lowcut: f64,

    /// Band-pass high cutoff in Hz
    #[arg(long, default_value = "5.0")]
    pub highcut: f64,

    /// Butterworth design order (band-pass response is twice this)
    #[arg(long, default_value = "4")]
    pub filter_order: usize,

    /// Percentile of the detection signal used as the peak height threshold
    #[arg(long, default_value = "85.0")]
    pub height_percentile: f64,

    /// Peak prominence threshold as a fraction of the height threshold
    #[arg(long, default_value = "0.5")]
    pub prominence_fraction: f64,

    /// Minimum spacing between step peaks in seconds (~one stride period)
    #[arg(long, default_value = "1.0")]
    pub min_step_interval: f64,

    /// Minimum run of closely-spaced peaks to count as walking
    #[arg(long, default_value = "3")]
    pub min_consecutive_steps: usize,

    /// Maximum gap between peaks of the same walking run, in seconds
    #[arg(long, default_value = "6.0")]
    pub max_step_interval: f64,

    /// Count every confirmed peak as two steps (legacy half-stride convention)
    #[arg(long)]
    pub half_stride_peaks: bool,

    /// Maximum threshold-relaxation attempts for peak detection
    #[arg(long, default_value = "6")]
    pub max_detect_attempts: usize,

    /// Detect peaks on a fused accel+gyro index instead of accel alone
    #[arg(long)]
    pub fuse_gyro: bool,

    /// Accelerometer weight of the fused index (gyro gets the remainder)
    #[arg(long, default_value = "0.9")]
    pub accel_weight: f64,

    /// Zero-crossing-rate window size in samples
    #[arg(long, default_value = "200")]
    pub zcr_window: usize,

    /// Percentile of |filtered| used as the activity amplitude threshold
    #[arg(long, default_value = "95.0")]
    pub amplitude_percentile: f64,

    /// Percentile of the ZCR series used as the ZCR threshold
    #[arg(long, default_value = "40.0")]
    pub zcr_percentile: f64,

    /// Clipping limit (g) applied to the filtered signal before ZCR
    #[arg(long, default_value = "2.0")]
    pub clip_limit: f64,

    /// Activity periods separated by at most this many samples are merged
    #[arg(long, default_value = "100")]
    pub merge_gap: usize,

    /// Activity mask policy: "and" (default) or "or"
    #[arg(long, default_value = "and")]
    pub mask_policy: MaskPolicy,

    /// Output file prefix for CSV/JSON exports (e.g. /path/to/output/prefix)
    #[arg(long)]
    pub csv_output: Option<String>,
}

/// All tunable numeric parameters of the pipeline in one place.
///
/// Defaults are the values the recordings were originally tuned with; every
/// field is overridable from the CLI.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sampling rate in Hz; `None` means estimate from the timestamps.
    pub sample_rate_hz: Option<f64>,
    /// Low cutoff of the motion band (Hz); `<= 0` selects a low-pass design.
    pub lowcut_hz: f64,
    /// High cutoff of the motion band (Hz).
    pub highcut_hz: f64,
    /// Butterworth design order.
    pub filter_order: usize,
    /// Height threshold percentile for peak detection.
    pub height_percentile: f64,
    /// Prominence threshold as a fraction of the height threshold.
    pub prominence_fraction: f64,
    /// Minimum peak spacing in seconds.
    pub min_step_interval_s: f64,
    /// Minimum confirmed run length.
    pub min_consecutive_steps: usize,
    /// Maximum intra-run peak gap in seconds.
    pub max_step_interval_s: f64,
    /// Legacy convention: count each confirmed peak as two steps.
    pub half_stride_peaks: bool,
    /// Bounded retries for the adaptive threshold search.
    pub max_detect_attempts: usize,
    /// Detect on the fused accel+gyro index instead of accel alone.
    pub fuse_gyro: bool,
    /// Accel weight of the fused index.
    pub accel_weight: f64,
    /// ZCR window width in samples.
    pub zcr_window: usize,
    /// Amplitude threshold percentile for the activity mask.
    pub amplitude_percentile: f64,
    /// ZCR threshold percentile for the activity mask.
    pub zcr_percentile: f64,
    /// Clipping limit (g) before the ZCR computation.
    pub clip_limit_g: f64,
    /// Maximum sample gap bridged when merging activity periods.
    pub merge_gap_samples: usize,
    /// Mask combination policy.
    pub mask_policy: MaskPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sample_rate_hz: None,
            lowcut_hz: 0.3,
            highcut_hz: 5.0,
            filter_order: 4,
            height_percentile: 85.0,
            prominence_fraction: 0.5,
            min_step_interval_s: 1.0,
            min_consecutive_steps: 3,
            max_step_interval_s: 6.0,
            half_stride_peaks: false,
            max_detect_attempts: 6,
            fuse_gyro: false,
            accel_weight: 0.9,
            zcr_window: 200,
            amplitude_percentile: 95.0,
            zcr_percentile: 40.0,
            clip_limit_g: 2.0,
            merge_gap_samples: 100,
            mask_policy: MaskPolicy::And,
        }
    }
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate_hz: self.sample_rate,
            lowcut_hz: self.lowcut,
            highcut_hz: self.highcut,
            filter_order: self.filter_order,
            height_percentile: self.height_percentile,
            prominence_fraction: self.prominence_fraction,
            min_step_interval_s: self.min_step_interval,
            min_consecutive_steps: self.min_consecutive_steps,
            max_step_interval_s: self.max_step_interval,
            half_stride_peaks: self.half_stride_peaks,
            max_detect_attempts: self.max_detect_attempts,
            fuse_gyro: self.fuse_gyro,
            accel_weight: self.accel_weight,
            zcr_window: self.zcr_window,
            amplitude_percentile: self.amplitude_percentile,
            zcr_percentile: self.zcr_percentile,
            clip_limit_g: self.clip_limit,
            merge_gap_samples: self.merge_gap,
            mask_policy: self.mask_policy,
        }
    }
}
