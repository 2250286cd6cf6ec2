//! # Configuration Module
//!
//! User-facing options for the spectral engine and the derived, validated
//! setup the engine actually runs with. Every option has a default so a
//! partial JSON document is enough to configure an engine.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::FftError;
use crate::window;

/// Reference time budget for a single engine step.
pub const FFT_UPDATE_BUDGET_MICROS: u32 = 175;

/// Upper bound on window overlap; a full overlap would never gather new samples.
const MAX_WINDOW_OVERLAP: f32 = 0.9;

/// Strategy used to place a peak between two FFT bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Shift towards the larger neighbour by its share of the neighbour+peak energy.
    #[default]
    Simple,
    /// Jain's two-point estimator.
    Jain,
}

/// Numerics backend driving the transform steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    #[default]
    RustFft,
    Radix2,
}

/// Where the samples fed to the engine come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum SampleMode {
    /// Every fed sample goes straight into the window.
    #[default]
    Raw,
    /// Groups of `divider` fed samples are averaged into one window sample.
    Decimated { divider: u16 },
}

impl SampleMode {
    pub fn divider(&self) -> u16 {
        match self {
            SampleMode::Raw => 1,
            SampleMode::Decimated { divider } => *divider,
        }
    }
}

/// Background noise tracking thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Terminal cycles averaged into the reference energy during calibration.
    pub calibration_cycles: u16,
    /// A peak counts as signal when its energy exceeds the reference by this factor.
    pub signal_ratio: f32,
    /// Consecutive noise-only cycles before an axis needs calibration again.
    pub max_missed_cycles: u16,
    /// Smoothing factor of the reference energy update on noise-only cycles.
    pub ref_energy_alpha: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            calibration_cycles: 32,
            signal_ratio: 2.0,
            max_missed_cycles: 100,
            ref_energy_alpha: 0.05,
        }
    }
}

/// Starting point and pace of hover learning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    pub freq_hover_hz: f32,
    pub throttle_ref: f32,
    /// Time constant of the learning filter in seconds.
    pub time_constant_s: f32,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            freq_hover_hz: 80.0,
            throttle_ref: 0.35,
            time_constant_s: 10.0,
        }
    }
}

/// All recognised engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    pub enabled: bool,
    /// Rate at which `feed` is called for each axis.
    pub sensor_rate_hz: f32,
    pub sample_mode: SampleMode,
    /// Unit conversion applied to every emitted window sample.
    pub sample_scale: f32,
    pub window_size: usize,
    /// Fraction of each window shared with the previous one.
    pub window_overlap: f32,
    pub min_hz: f32,
    pub max_hz: f32,
    pub interpolation: Interpolation,
    pub backend: Backend,
    pub budget_micros: u32,
    pub noise: NoiseConfig,
    pub hover: HoverConfig,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensor_rate_hz: 1000.0,
            sample_mode: SampleMode::Raw,
            sample_scale: 1.0,
            window_size: 128,
            window_overlap: 0.5,
            min_hz: 80.0,
            max_hz: 400.0,
            interpolation: Interpolation::Simple,
            backend: Backend::RustFft,
            budget_micros: FFT_UPDATE_BUDGET_MICROS,
            noise: NoiseConfig::default(),
            hover: HoverConfig::default(),
        }
    }
}

/// Values derived from an [`FftConfig`] that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FftSetup {
    /// Rate of the samples written into the window.
    pub sample_rate_hz: f32,
    /// Number of fed samples averaged into one window sample.
    pub oversample: u16,
    pub multiplier: f32,
    pub window_size: usize,
    pub bin_count: usize,
    pub resolution_hz: f32,
    pub update_steps: usize,
    pub samples_per_frame: usize,
    /// First bin considered by the peak search.
    pub start_bin: usize,
    /// Last bin inside the detection range.
    pub end_bin: usize,
    /// Rate at which each axis publishes a new peak.
    pub output_rate_hz: f32,
    pub filter_cutoff_hz: f32,
}

impl FftConfig {
    /// Checks the options and derives the engine setup, failing fast on any
    /// combination the engine cannot run.
    pub fn validate(&self) -> Result<FftSetup, FftError> {
        let update_steps = window::update_steps_for(self.window_size)
            .ok_or(FftError::UnsupportedWindowSize(self.window_size))?;

        if !(0.0..=MAX_WINDOW_OVERLAP).contains(&self.window_overlap) {
            return Err(FftError::InvalidOverlap(self.window_overlap));
        }

        let divider = self.sample_mode.divider();
        if divider == 0 || !self.sensor_rate_hz.is_finite() || self.sensor_rate_hz <= 0.0 {
            return Err(FftError::InvalidSampleRate {
                rate_hz: self.sensor_rate_hz,
                divider,
            });
        }

        if self.budget_micros == 0 {
            return Err(FftError::InvalidBudget);
        }

        let sample_rate_hz = self.sensor_rate_hz / divider as f32;
        let nyquist_hz = sample_rate_hz * 0.5;
        let range_error = FftError::InvalidFrequencyRange {
            min_hz: self.min_hz,
            max_hz: self.max_hz,
            nyquist_hz,
        };
        if !(self.min_hz > 0.0 && self.min_hz < self.max_hz && self.max_hz <= nyquist_hz) {
            return Err(range_error);
        }

        let window_size = self.window_size;
        let bin_count = window_size / 2;
        let resolution_hz = sample_rate_hz / window_size as f32;
        let start_bin = ((self.min_hz / resolution_hz).floor() as usize).max(1);
        let end_bin = ((self.max_hz / resolution_hz).ceil() as usize).min(bin_count);
        if start_bin >= end_bin {
            return Err(range_error);
        }

        let samples_per_frame =
            ((window_size as f32 * (1.0 - self.window_overlap)).round() as usize).max(1);

        // `advance` runs once per fed sample, three axes share the step machine
        let frame_rate_hz = sample_rate_hz / samples_per_frame as f32;
        let cycle_rate_hz = self.sensor_rate_hz / (3 * update_steps) as f32;
        let output_rate_hz = frame_rate_hz.min(cycle_rate_hz);

        Ok(FftSetup {
            sample_rate_hz,
            oversample: divider,
            multiplier: self.sample_scale / divider as f32,
            window_size,
            bin_count,
            resolution_hz,
            update_steps,
            samples_per_frame,
            start_bin,
            end_bin,
            output_rate_hz,
            filter_cutoff_hz: output_rate_hz / 3.0,
        })
    }

    /// Parses a JSON document, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing FFT config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let setup = FftConfig::default().validate().unwrap();
        assert_eq!(setup.bin_count, 64);
        assert_eq!(setup.update_steps, 3);
        assert_eq!(setup.samples_per_frame, 64);
        assert_eq!(setup.oversample, 1);
        // 1000 Hz / 128 = 7.8125 Hz per bin, 80 Hz lands in bin 10
        assert_eq!(setup.start_bin, 10);
        assert_eq!(setup.end_bin, 52);
    }

    #[test]
    fn rejects_unsupported_window_sizes() {
        for size in [0, 16, 100, 2048] {
            let config = FftConfig { window_size: size, ..FftConfig::default() };
            assert_eq!(config.validate(), Err(FftError::UnsupportedWindowSize(size)));
        }
    }

    #[test]
    fn rejects_bad_frequency_ranges() {
        let inverted = FftConfig { min_hz: 300.0, max_hz: 100.0, ..FftConfig::default() };
        assert!(matches!(inverted.validate(), Err(FftError::InvalidFrequencyRange { .. })));

        let above_nyquist = FftConfig { max_hz: 600.0, ..FftConfig::default() };
        assert!(matches!(above_nyquist.validate(), Err(FftError::InvalidFrequencyRange { .. })));
    }

    #[test]
    fn rejects_bad_overlap_and_divider() {
        let overlap = FftConfig { window_overlap: 0.95, ..FftConfig::default() };
        assert_eq!(overlap.validate(), Err(FftError::InvalidOverlap(0.95)));

        let divider = FftConfig {
            sample_mode: SampleMode::Decimated { divider: 0 },
            ..FftConfig::default()
        };
        assert!(matches!(divider.validate(), Err(FftError::InvalidSampleRate { .. })));
    }

    #[test]
    fn decimation_lowers_sample_rate() {
        let config = FftConfig {
            sensor_rate_hz: 8000.0,
            sample_mode: SampleMode::Decimated { divider: 4 },
            sample_scale: 2.0,
            ..FftConfig::default()
        };
        let setup = config.validate().unwrap();
        assert_eq!(setup.sample_rate_hz, 2000.0);
        assert_eq!(setup.oversample, 4);
        assert_eq!(setup.multiplier, 0.5);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = FftConfig::from_json(
            r#"{ "window_size": 256, "interpolation": "Jain", "sample_mode": { "mode": "Decimated", "divider": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 256);
        assert_eq!(config.interpolation, Interpolation::Jain);
        assert_eq!(config.sample_mode, SampleMode::Decimated { divider: 2 });
        assert_eq!(config.budget_micros, FFT_UPDATE_BUDGET_MICROS);
    }

    #[test]
    fn malformed_json_names_what_failed() {
        let err = FftConfig::from_json(r#"{ "window_size": "large" }"#).unwrap_err();
        assert_eq!(err.to_string(), "parsing FFT config");
        assert!(err.root_cause().is::<serde_json::Error>());
    }
}
