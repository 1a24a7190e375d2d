use crate::RecordingAnalysis;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One `(start_s, end_s, duration_s)` row of the period export.
#[derive(Debug, Serialize)]
struct PeriodRow {
    kind: &'static str,
    start_s: f64,
    end_s: f64,
    duration_s: f64,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    recording: &'a str,
    sample_rate_hz: f64,
    samples: usize,
    rollover_truncated_at: Option<usize>,
    step_count: usize,
    cadence_hz: Option<f64>,
    confirmed_peaks: &'a [crate::step_analysis::PeakEvent],
    active_time_s: f64,
    inactive_time_s: f64,
    activity_periods: Vec<PeriodRow>,
}

fn output_path(base_path: &str, stem: &str, suffix: &str) -> Result<PathBuf> {
    let path = Path::new(base_path);
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let prefix = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    Ok(dir.join(format!("{}_{}_{}", prefix, stem, suffix)))
}

/// Export the filtered signals with a step-peak flag column, one row per
/// sample, for downstream visualization.
pub fn write_signal_csv(base_path: &str, stem: &str, analysis: &RecordingAnalysis) -> Result<()> {
    let full_path = output_path(base_path, stem, "signal.csv")?;
    println!("Writing filtered signal to {}", full_path.display());

    let file = std::fs::File::create(full_path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["time_s", "accel_filtered", "gyro_filtered", "is_step_peak"])?;

    let peak_indices: HashSet<usize> =
        analysis.confirmed_peaks.iter().map(|p| p.index).collect();
    for i in 0..analysis.time_axis.len() {
        writer.write_record(&[
            analysis.time_axis[i].to_string(),
            analysis.filtered_accel[i].to_string(),
            analysis.filtered_gyro[i].to_string(),
            (peak_indices.contains(&i) as u8).to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn period_rows(analysis: &RecordingAnalysis) -> (Vec<PeriodRow>, Vec<PeriodRow>) {
    let to_rows = |periods: &[crate::activity_analysis::SamplePeriod], kind: &'static str| {
        periods
            .iter()
            .map(|p| {
                let (start_s, end_s, duration_s) = p.bounds_s(&analysis.time_axis);
                PeriodRow { kind, start_s, end_s, duration_s }
            })
            .collect::<Vec<_>>()
    };
    (
        to_rows(&analysis.segmentation.active, "active"),
        to_rows(&analysis.segmentation.inactive, "inactive"),
    )
}

/// Export activity and inactivity periods with their time bounds.
pub fn write_periods_csv(base_path: &str, stem: &str, analysis: &RecordingAnalysis) -> Result<()> {
    let full_path = output_path(base_path, stem, "periods.csv")?;
    println!("Writing activity periods to {}", full_path.display());

    let file = std::fs::File::create(full_path)?;
    let mut writer = csv::Writer::from_writer(file);

    let (active, inactive) = period_rows(analysis);
    for row in active.iter().chain(inactive.iter()) {
        writer.serialize(row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Export a compact JSON summary of the run.
pub fn write_summary_json(base_path: &str, stem: &str, analysis: &RecordingAnalysis) -> Result<()> {
    let full_path = output_path(base_path, stem, "summary.json")?;
    println!("Writing summary to {}", full_path.display());

    let (active, _) = period_rows(analysis);
    let active_time_s: f64 = active.iter().map(|r| r.duration_s).sum();
    let total_s = analysis
        .time_axis
        .last()
        .copied()
        .unwrap_or(0.0);

    let summary = RunSummary {
        recording: stem,
        sample_rate_hz: analysis.sample_rate_hz,
        samples: analysis.time_axis.len(),
        rollover_truncated_at: analysis.rollover_truncation,
        step_count: analysis.step_count,
        cadence_hz: analysis.cadence_hz,
        confirmed_peaks: &analysis.confirmed_peaks,
        active_time_s,
        inactive_time_s: total_s - active_time_s,
        activity_periods: active,
    };

    let file = std::fs::File::create(full_path)?;
    serde_json::to_writer_pretty(file, &summary)?;
    Ok(())
}
