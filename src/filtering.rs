use anyhow::{bail, Result};
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, SosFormatFilter,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;

/// Zero-phase Butterworth band-limiting of a magnitude series.
///
/// The filter is designed in second-order sections and applied forward and
/// backward (`sosfiltfilt`), so peak timing in the output lines up with the
/// input time axis. A band-pass of design order `n` has a 2n-order response.
/// `lowcut_hz <= 0` selects the low-pass variant with cutoff `highcut_hz`.
pub fn band_limit(
    signal: &[f64],
    lowcut_hz: f64,
    highcut_hz: f64,
    sample_rate_hz: f64,
    order: usize,
) -> Result<Vec<f64>> {
    if sample_rate_hz <= 0.0 {
        bail!("Invalid filter parameters: sample rate {} Hz", sample_rate_hz);
    }
    let nyquist = sample_rate_hz / 2.0;
    if highcut_hz <= 0.0 || highcut_hz >= nyquist {
        bail!(
            "Invalid filter parameters: high cutoff {} Hz must lie in (0, {} Hz)",
            highcut_hz,
            nyquist
        );
    }

    let filter = if lowcut_hz <= 0.0 {
        butter_dyn(
            order,
            vec![highcut_hz],
            Some(FilterBandType::Lowpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(sample_rate_hz),
        )
    } else {
        if lowcut_hz >= highcut_hz {
            bail!(
                "Invalid filter parameters: low cutoff {} Hz must be below high cutoff {} Hz",
                lowcut_hz,
                highcut_hz
            );
        }
        butter_dyn(
            order,
            vec![lowcut_hz, highcut_hz],
            Some(FilterBandType::Bandpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(sample_rate_hz),
        )
    };

    let DigitalFilter::Sos(SosFormatFilter { sos }) = filter else {
        bail!("Butterworth design did not return second-order sections");
    };

    Ok(sosfiltfilt_dyn(signal.iter(), &sos))
}
