//! # Noise Tracking Module
//!
//! Keeps a slowly adapting estimate of the background energy of one axis
//! and decides, per completed analysis, whether the peak found is a real
//! resonance or just the noise floor.

use crate::config::NoiseConfig;

/// Outcome of one completed analysis for an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detection {
    /// No analysis has completed yet.
    #[default]
    Idle,
    /// The reference energy is still being established.
    Calibrating,
    /// The peak did not stand out from the background.
    Noise,
    /// The peak is a real signal.
    Signal,
}

/// Calibration status of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// Averaging peak energies into the reference; `cycles` done so far.
    Calibrating { cycles: u16 },
    /// Reference established; `missed` consecutive noise-only cycles.
    Tracking { missed: u16 },
}

/// Calibration cycles folded in before the calibration gate applies to a
/// first reference.
const CALIBRATION_WARMUP: u16 = 4;

/// Smallest peak energy that can count as a signal, whatever the reference.
pub const SIGNAL_ENERGY_FLOOR: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct NoiseTracker {
    config: NoiseConfig,
    ref_energy: f32,
    /// Set once a calibration has completed. A recalibration starts from
    /// the existing reference rather than from nothing.
    has_reference: bool,
    state: CalibrationState,
}

impl NoiseTracker {
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            config,
            ref_energy: 0.0,
            has_reference: false,
            state: CalibrationState::Calibrating { cycles: 0 },
        }
    }

    /// Background energy estimate.
    pub fn ref_energy(&self) -> f32 {
        self.ref_energy
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn needs_calibration(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrating { .. })
    }

    /// Peak energy above which an analysis counts as a signal.
    pub fn signal_threshold(&self) -> f32 {
        (self.ref_energy * self.config.signal_ratio).max(SIGNAL_ENERGY_FLOOR)
    }

    /// Classifies the energy of the peak bin from one completed analysis and
    /// folds it into the reference when it is not a signal.
    ///
    /// Energy above the threshold never enters the reference. During a first
    /// calibration this gate applies once a few cycles have been averaged;
    /// during a recalibration it applies from the start, and a signal ends
    /// the recalibration.
    pub fn observe(&mut self, energy: f32) -> Detection {
        if !energy.is_finite() {
            return Detection::Noise;
        }
        match self.state {
            CalibrationState::Calibrating { cycles } => {
                let gated = self.has_reference || cycles >= CALIBRATION_WARMUP;
                if gated && energy > self.signal_threshold() {
                    if self.has_reference {
                        self.state = CalibrationState::Tracking { missed: 0 };
                    }
                    return Detection::Signal;
                }

                // running mean over the calibration cycles, the previous
                // reference counting as one of them
                let cycles = cycles + 1;
                let samples = cycles.saturating_add(u16::from(self.has_reference));
                self.ref_energy += (energy - self.ref_energy) / samples as f32;
                self.state = if cycles >= self.config.calibration_cycles {
                    log::debug!("FFT: noise reference calibrated at {:.4}", self.ref_energy);
                    self.has_reference = true;
                    CalibrationState::Tracking { missed: 0 }
                } else {
                    CalibrationState::Calibrating { cycles }
                };
                Detection::Calibrating
            }
            CalibrationState::Tracking { missed } => {
                if energy > self.signal_threshold() {
                    self.state = CalibrationState::Tracking { missed: 0 };
                    return Detection::Signal;
                }
                self.ref_energy += self.config.ref_energy_alpha * (energy - self.ref_energy);
                let missed = missed.saturating_add(1);
                self.state = if missed > self.config.max_missed_cycles {
                    CalibrationState::Calibrating { cycles: 0 }
                } else {
                    CalibrationState::Tracking { missed }
                };
                Detection::Noise
            }
        }
    }
}
