// gyro-fft-core/src/lib.rs

//! The core logic of the in-flight gyro noise analyser.
//! This crate is responsible for sample accumulation, the time-budgeted
//! step-wise FFT, peak detection and interpolation, background noise
//! tracking and hover learning. It is completely headless: samples are
//! pushed in by the caller and results are read back out.
//!
//! [`GyroFft`] is the single engine instance. It is built once by the
//! owner of the control loop and driven from one real-time context:
//! [`GyroFft::feed`] at sensor rate, [`GyroFft::advance`] once per tick and
//! [`GyroFft::update_hover`] at a low rate while hovering.

pub mod budget;
pub mod calibration;
pub mod config;
pub mod dsp;
pub mod error;
pub mod filter;
pub mod hover;
pub mod interpolate;
pub mod noise;
pub mod sampler;
pub mod window;

use std::fmt;
use std::time::Instant;

use log::{info, trace, warn};

use crate::budget::{BudgetMonitor, OverrunStats};
use crate::calibration::SelfTestReport;
use crate::config::{FftConfig, FftSetup};
use crate::error::FftError;
use crate::filter::LowPassFilter2p;
use crate::hover::{HoverLearner, HoverStore, LearnedHover};
use crate::noise::{Detection, NoiseTracker};
use crate::sampler::Sampler;
use crate::window::{StepCursor, WindowState};

pub const XYZ_AXIS_COUNT: usize = 3;

/// One of the three gyro axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; XYZ_AXIS_COUNT] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The axis analysed after this one.
    pub fn next(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        };
        f.write_str(name)
    }
}

/// The latest published peak of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPeak {
    /// FFT bin holding the peak.
    pub bin: usize,
    /// Interpolated peak frequency in Hz.
    pub freq_hz: f32,
    /// Peak frequency after output smoothing.
    pub filtered_freq_hz: f32,
    /// Magnitude of the peak bin.
    pub energy: f32,
    /// How the most recent analysis of this axis was classified.
    pub detection: Detection,
}

/// Gyro noise analyser.
pub struct GyroFft {
    config: FftConfig,
    setup: FftSetup,
    sampler: Sampler,
    state: WindowState,
    cursor: StepCursor,
    peaks: [AxisPeak; XYZ_AXIS_COUNT],
    noise: [NoiseTracker; XYZ_AXIS_COUNT],
    filters: [LowPassFilter2p; XYZ_AXIS_COUNT],
    budget: BudgetMonitor,
    hover: HoverLearner,
    self_test_signal: Vec<f32>,
}

impl GyroFft {
    /// Validates `config` and allocates every buffer the engine will use.
    pub fn new(config: FftConfig) -> Result<Self, FftError> {
        let setup = config.validate()?;
        let state = WindowState::new(setup.window_size, setup.sample_rate_hz, config.backend)
            .ok_or(FftError::UnsupportedWindowSize(setup.window_size))?;

        info!(
            "FFT: window {} at {:.0}Hz, {} steps, {:.2}Hz bins, detecting {:.0}-{:.0}Hz",
            setup.window_size,
            setup.sample_rate_hz,
            setup.update_steps,
            setup.resolution_hz,
            config.min_hz,
            config.max_hz
        );

        let initial_peak = AxisPeak {
            bin: 0,
            freq_hz: config.min_hz,
            filtered_freq_hz: config.min_hz,
            energy: 0.0,
            detection: Detection::Idle,
        };

        Ok(Self {
            sampler: Sampler::new(setup.window_size, setup.oversample, setup.multiplier),
            state,
            cursor: StepCursor::default(),
            peaks: [initial_peak; XYZ_AXIS_COUNT],
            noise: std::array::from_fn(|_| NoiseTracker::new(config.noise)),
            filters: std::array::from_fn(|_| {
                LowPassFilter2p::new(setup.output_rate_hz, setup.filter_cutoff_hz)
            }),
            budget: BudgetMonitor::new(config.budget_micros),
            hover: HoverLearner::new(&config.hover, config.min_hz, config.max_hz),
            self_test_signal: vec![0.0; setup.window_size],
            config,
            setup,
        })
    }

    /// Whether the engine was configured to run. A disabled engine accepts
    /// every call and does nothing.
    pub fn analysis_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The configuration the engine was built from.
    pub fn config(&self) -> &FftConfig {
        &self.config
    }

    /// Values derived from the configuration at construction: spectral
    /// sample rate, bin range, frame size and output rate.
    pub fn setup(&self) -> &FftSetup {
        &self.setup
    }

    /// Feeds one native-rate sample of `axis`.
    pub fn feed(&mut self, axis: Axis, value: f32) {
        if !self.analysis_enabled() {
            return;
        }
        self.sampler.feed(axis, value);
    }

    /// Feeds one native-rate sample of all three axes.
    pub fn feed_sample(&mut self, gyro: [f32; XYZ_AXIS_COUNT]) {
        for axis in Axis::ALL {
            self.feed(axis, gyro[axis.index()]);
        }
    }

    /// Runs the next step of the analysis. An axis only starts a new
    /// analysis once a full frame of new samples has arrived for it.
    pub fn advance(&mut self) {
        if !self.analysis_enabled() {
            return;
        }
        let axis = self.cursor.axis;
        if self.cursor.at_frame_start() {
            if !self.sampler.frame_ready(axis, self.setup.samples_per_frame) {
                return;
            }
            self.sampler.begin_frame(axis);
        }

        let now = Instant::now();
        let (samples, buffer_index) = self.sampler.window(axis);
        let peak = self
            .state
            .analyse(self.cursor.step, samples, buffer_index, self.setup.start_bin);
        if let Some(bin_max) = peak {
            self.calculate_noise(axis, bin_max);
        }
        if let Some(overrun) = self.budget.record(now.elapsed()) {
            trace!("FFT: step {} on {} over budget by {}us", self.cursor.step, axis, overrun);
        }

        self.cursor = self.cursor.advance(self.setup.update_steps);
    }

    /// Classifies the completed analysis of `axis` and publishes its peak
    /// if it stands out from the background noise.
    fn calculate_noise(&mut self, axis: Axis, bin_max: usize) {
        let i = axis.index();
        let energy = self.state.spectrum()[bin_max];
        let was_tracking = !self.noise[i].needs_calibration();
        let detection = self.noise[i].observe(energy);
        self.peaks[i].detection = detection;

        if was_tracking && self.noise[i].needs_calibration() {
            warn!("FFT: no signal on {} for too long, recalibrating noise reference", axis);
        }
        if detection != Detection::Signal {
            return;
        }

        let freq_hz = self
            .config
            .interpolation
            .center_freq_hz(self.state.spectrum(), bin_max, self.setup.resolution_hz)
            .clamp(self.config.min_hz, self.config.max_hz);

        let peak = &mut self.peaks[i];
        peak.bin = bin_max;
        peak.freq_hz = freq_hz;
        peak.energy = energy;
        peak.filtered_freq_hz = self.filters[i].apply(freq_hz);
    }

    /// Checks that tones across the detection range are found within one
    /// bin. A failure is logged and reported; the engine stays usable.
    ///
    /// Any analysis in progress is restarted afterwards.
    pub fn calibration_check(&mut self) -> SelfTestReport {
        let report = calibration::self_test_bin_frequencies(
            &mut self.state,
            &mut self.self_test_signal,
            self.config.interpolation,
            self.setup.start_bin,
            self.setup.end_bin,
        );
        self.cursor = StepCursor { axis: self.cursor.axis, step: 0 };

        if report.passed() {
            info!(
                "FFT: self-test passed over {} frequencies, max error {:.2}Hz",
                report.frequencies_tested, report.max_error_hz
            );
        } else {
            warn!(
                "FFT: self-test failed, max error {:.2}Hz at {:.1}Hz",
                report.max_error_hz, report.worst_freq_hz
            );
        }
        report
    }

    /// Learns the hover noise frequency and throttle. Only call while hovering.
    pub fn update_hover(&mut self, dt: f32, throttle_out: f32) {
        if !self.analysis_enabled() {
            return;
        }
        let observed = self.weighted_noise_center_freq_hz();
        self.hover.update(dt, observed, throttle_out);
    }

    /// Persists learned hover values. Call once on disarm; returns whether
    /// anything was written.
    pub fn commit_on_disarm(&mut self, store: &mut dyn HoverStore) -> anyhow::Result<bool> {
        if !self.analysis_enabled() {
            return Ok(false);
        }
        self.hover.commit(store)
    }

    /// Seeds hover learning from previously persisted values, if any.
    pub fn restore_hover(&mut self, store: &dyn HoverStore) -> anyhow::Result<()> {
        if let Some(learned) = store.load()? {
            self.hover.restore(learned);
        }
        Ok(())
    }

    /// Current hover estimate, including learning not yet committed.
    pub fn learned_hover(&self) -> LearnedHover {
        self.hover.learned()
    }

    /// The latest published peak of one axis.
    ///
    /// # Arguments
    /// * `axis` - The gyro axis to read.
    ///
    /// # Returns
    /// The peak from the last analysis classified as a signal, with the
    /// classification of the most recent analysis. Before any signal the
    /// frequency reads `min_hz` and the energy 0.
    pub fn peak(&self, axis: Axis) -> AxisPeak {
        self.peaks[axis.index()]
    }

    /// Detected peak frequency after smoothing, per axis.
    pub fn noise_center_freq_hz(&self) -> [f32; XYZ_AXIS_COUNT] {
        self.peaks.map(|p| p.filtered_freq_hz)
    }

    /// Detected peak frequency, per axis.
    pub fn raw_noise_center_freq_hz(&self) -> [f32; XYZ_AXIS_COUNT] {
        self.peaks.map(|p| p.freq_hz)
    }

    /// Energy of the detected peak, per axis.
    pub fn center_freq_energy(&self) -> [f32; XYZ_AXIS_COUNT] {
        self.peaks.map(|p| p.energy)
    }

    /// FFT bin of the detected peak, per axis.
    pub fn center_freq_bin(&self) -> [usize; XYZ_AXIS_COUNT] {
        self.peaks.map(|p| p.bin)
    }

    /// Background noise energy, per axis.
    pub fn noise_ref_energy(&self) -> [f32; XYZ_AXIS_COUNT] {
        std::array::from_fn(|i| self.noise[i].ref_energy())
    }

    /// Whether `axis` is (re)establishing its noise reference. Callers may
    /// choose not to rely on that axis until this clears.
    pub fn needs_calibration(&self, axis: Axis) -> bool {
        self.noise[axis.index()].needs_calibration()
    }

    /// Roll and pitch peak frequencies weighted by their energy.
    pub fn weighted_noise_center_freq_hz(&self) -> f32 {
        if !self.analysis_enabled() {
            return self.config.min_hz;
        }
        let [x, y, _] = self.peaks;
        let total = x.energy + y.energy;
        if x.energy > 0.0 && y.energy > 0.0 && total.is_finite() {
            (x.filtered_freq_hz * x.energy + y.filtered_freq_hz * y.energy) / total
        } else {
            (x.filtered_freq_hz + y.filtered_freq_hz) * 0.5
        }
    }

    pub fn overrun_stats(&self) -> OverrunStats {
        self.budget.stats()
    }

    /// Total number of steps where the time budget was not met.
    pub fn total_overrun_cycles(&self) -> u32 {
        self.budget.stats().cycles
    }

    /// Average time past the budget of the steps that overran, in microseconds.
    pub fn average_overrun_micros(&self) -> u32 {
        self.budget.stats().average_micros()
    }

    /// Largest single overrun, in microseconds.
    pub fn max_overrun_micros(&self) -> u32 {
        self.budget.stats().max_micros
    }

    /// Axis and step the step machine runs next.
    pub fn cursor(&self) -> StepCursor {
        self.cursor
    }

    /// Magnitude spectrum of the last completed analysis, whichever axis it
    /// belonged to.
    pub fn spectrum(&self) -> &[f32] {
        self.state.spectrum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_cycle_in_order() {
        assert_eq!(Axis::X.next(), Axis::Y);
        assert_eq!(Axis::Y.next(), Axis::Z);
        assert_eq!(Axis::Z.next(), Axis::X);
        assert_eq!(Axis::ALL.map(Axis::index), [0, 1, 2]);
        assert_eq!(Axis::Z.to_string(), "Z");
    }

    #[test]
    fn advance_waits_for_a_full_frame() {
        let mut fft = GyroFft::new(FftConfig::default()).unwrap();
        for _ in 0..63 {
            fft.feed_sample([0.0; 3]);
            fft.advance();
        }
        assert_eq!(fft.cursor(), StepCursor::default());
        fft.feed_sample([0.0; 3]);
        fft.advance();
        assert_eq!(fft.cursor(), StepCursor { axis: Axis::X, step: 1 });
    }

    #[test]
    fn peaks_start_at_min_frequency() {
        let fft = GyroFft::new(FftConfig::default()).unwrap();
        for axis in Axis::ALL {
            let peak = fft.peak(axis);
            assert_eq!(peak.freq_hz, fft.config().min_hz);
            assert_eq!(peak.energy, 0.0);
            assert_eq!(peak.detection, Detection::Idle);
            assert!(fft.needs_calibration(axis));
        }
        assert!(fft.analysis_enabled());
    }

    #[test]
    fn weighted_frequency_falls_back_to_mean() {
        let fft = GyroFft::new(FftConfig::default()).unwrap();
        assert_eq!(fft.weighted_noise_center_freq_hz(), 80.0);
    }
}
