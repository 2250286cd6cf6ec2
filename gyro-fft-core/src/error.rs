//! Configuration errors reported by [`crate::GyroFft::new`].
//!
//! Once an engine has been constructed nothing on the real-time path can
//! fail, so this is the only error type the core exposes besides the
//! `anyhow` results of hover persistence.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FftError {
    #[error("unsupported FFT window size {0}, expected one of 32, 64, 128, 256, 512, 1024")]
    UnsupportedWindowSize(usize),

    #[error("invalid detection range {min_hz}..{max_hz} Hz (Nyquist is {nyquist_hz} Hz)")]
    InvalidFrequencyRange {
        min_hz: f32,
        max_hz: f32,
        nyquist_hz: f32,
    },

    #[error("window overlap {0} is outside 0.0..=0.9")]
    InvalidOverlap(f32),

    #[error("sensor rate {rate_hz} Hz with divider {divider} gives no usable sample rate")]
    InvalidSampleRate { rate_hz: f32, divider: u16 },

    #[error("update budget must be at least 1us")]
    InvalidBudget,
}
