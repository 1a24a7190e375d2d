use activity_decoder::config::Args;
use activity_decoder::{analyze_recording, data_loading, output, RecordingAnalysis};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;

fn load_samples(path: &Path, force_csv: bool) -> Result<Vec<data_loading::ImuSample>> {
    let is_csv = force_csv
        || path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

    if is_csv {
        data_loading::read_csv_file(path)
    } else {
        data_loading::read_binary_file(path)
    }
}

fn recording_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording")
        .to_string()
}

fn print_report(stem: &str, analysis: &RecordingAnalysis) {
    let duration_s = analysis.time_axis.last().copied().unwrap_or(0.0);
    println!("\nRecording {}", stem);
    println!(
        "  {} samples at {:.1} Hz ({:.1} s)",
        analysis.time_axis.len(),
        analysis.sample_rate_hz,
        duration_s
    );
    if let Some(idx) = analysis.rollover_truncation {
        println!("  Truncated at sample {} (timestamp rollover)", idx);
    }

    println!("\n  Steps: {}", analysis.step_count);
    if let Some(cadence) = analysis.cadence_hz {
        println!("  Cadence: {:.2} steps/s", cadence);
    }
    if let (Some(first), Some(last)) = (
        analysis.confirmed_peaks.first(),
        analysis.confirmed_peaks.last(),
    ) {
        println!(
            "  Walking between {:.1} s and {:.1} s",
            first.time_s, last.time_s
        );
    }

    println!("\n  Activity periods:");
    let mut total_active_s = 0.0;
    for period in &analysis.segmentation.active {
        let (start_s, end_s, period_duration_s) = period.bounds_s(&analysis.time_axis);
        println!(
            "    {:8.2} s to {:8.2} s  ({:.2} s)",
            start_s, end_s, period_duration_s
        );
        total_active_s += period_duration_s;
    }
    if analysis.segmentation.active.is_empty() {
        println!("    none");
    }
    println!(
        "  Total active: {:.2} s, inactive: {:.2} s ({} inactivity periods)",
        total_active_s,
        duration_s - total_active_s,
        analysis.segmentation.inactive.len()
    );
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.pipeline_config();

    let recordings = data_loading::collect_recordings(&args.input_path)?;
    if recordings.is_empty() {
        bail!(
            "No .bin or .csv recordings found under {}",
            args.input_path.display()
        );
    }

    for path in &recordings {
        println!("Loading file: {}", path.display());
        let samples = load_samples(path, args.csv_input)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        println!("Loaded {} samples", samples.len());

        let stem = recording_stem(path);
        let analysis = analyze_recording(&samples, &config)
            .with_context(|| format!("Analysis failed for {}", path.display()))?;

        print_report(&stem, &analysis);

        if let Some(base_path) = &args.csv_output {
            output::write_signal_csv(base_path, &stem, &analysis)?;
            output::write_periods_csv(base_path, &stem, &analysis)?;
            output::write_summary_json(base_path, &stem, &analysis)?;
        }
    }

    Ok(())
}
