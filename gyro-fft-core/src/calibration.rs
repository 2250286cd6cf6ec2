//! # Startup Self-Test
//!
//! Runs synthetic sinusoids through the full step machine and checks that
//! the interpolated peak lands where the tone was injected. Bin centres and
//! half-bin offsets are both tested, across every bin of the detection range.

use std::f32::consts::PI;

use crate::config::Interpolation;
use crate::window::WindowState;

const SELF_TEST_AMPLITUDE: f32 = 20.0;

/// Result of a self-test sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfTestReport {
    /// Largest distance between an injected and a detected frequency.
    pub max_error_hz: f32,
    /// Injected frequency with the largest error.
    pub worst_freq_hz: f32,
    /// Largest error still accepted, one bin.
    pub tolerance_hz: f32,
    pub frequencies_tested: usize,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.frequencies_tested > 0 && self.max_error_hz <= self.tolerance_hz
    }
}

/// Sweeps every bin in `start_bin..=end_bin` (capped below Nyquist) using
/// `signal` as the sample buffer.
pub fn self_test_bin_frequencies(
    state: &mut WindowState,
    signal: &mut [f32],
    interpolation: Interpolation,
    start_bin: usize,
    end_bin: usize,
) -> SelfTestReport {
    let resolution = state.bin_resolution();
    let last_bin = end_bin.min(state.bin_count() - 1);
    let mut report = SelfTestReport {
        max_error_hz: 0.0,
        worst_freq_hz: 0.0,
        tolerance_hz: resolution,
        frequencies_tested: 0,
    };

    for bin in start_bin..=last_bin {
        let centre = bin as f32 * resolution;
        let mut frequencies = [Some(centre), None];
        if bin < last_bin {
            frequencies[1] = Some(centre + resolution * 0.5);
        }
        for frequency in frequencies.into_iter().flatten() {
            let error = self_test(state, signal, interpolation, start_bin, frequency);
            report.frequencies_tested += 1;
            if !(error <= report.max_error_hz) {
                report.max_error_hz = error;
                report.worst_freq_hz = frequency;
            }
        }
    }
    report
}

/// Detects one injected frequency, returning the absolute error in Hz.
fn self_test(
    state: &mut WindowState,
    signal: &mut [f32],
    interpolation: Interpolation,
    start_bin: usize,
    frequency: f32,
) -> f32 {
    let sample_rate = state.sample_rate_hz();
    for (i, sample) in signal.iter_mut().enumerate() {
        *sample = (2.0 * PI * frequency * i as f32 / sample_rate).sin() * SELF_TEST_AMPLITUDE;
    }

    let mut peak = None;
    for step in 0..state.update_steps() {
        if let Some(bin) = state.analyse(step, signal, 0, start_bin) {
            peak = Some(bin);
        }
    }

    match peak {
        Some(bin) => {
            let detected = interpolation.center_freq_hz(state.spectrum(), bin, state.bin_resolution());
            (detected - frequency).abs()
        }
        None => f32::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;

    #[test]
    fn sweep_covers_centres_and_edges() {
        let mut state = WindowState::new(64, 1000.0, Backend::RustFft).unwrap();
        let mut signal = vec![0.0; 64];
        // bins 4..=10: 7 centres and 6 half-bin offsets
        let report = self_test_bin_frequencies(&mut state, &mut signal, Interpolation::Simple, 4, 10);
        assert_eq!(report.frequencies_tested, 13);
        assert!(report.passed(), "{report:?}");
    }

    #[test]
    fn sweep_stops_below_nyquist() {
        let mut state = WindowState::new(32, 1000.0, Backend::Radix2).unwrap();
        let mut signal = vec![0.0; 32];
        let report = self_test_bin_frequencies(&mut state, &mut signal, Interpolation::Jain, 14, 16);
        // only bins 14 and 15 are below the Nyquist bin
        assert_eq!(report.frequencies_tested, 3);
    }

    #[test]
    fn empty_sweep_does_not_pass() {
        let mut state = WindowState::new(32, 1000.0, Backend::RustFft).unwrap();
        let mut signal = vec![0.0; 32];
        let report = self_test_bin_frequencies(&mut state, &mut signal, Interpolation::Simple, 20, 16);
        assert!(!report.passed());
    }
}
