//! # Step Engine
//!
//! An incremental version of a windowed real FFT. One analysis is split
//! into a fixed number of steps so that each call into the engine stays
//! inside the per-cycle time budget. Small windows merge adjacent stages
//! into one step; large windows run every stage on its own.
//!
//! The engine is shared by all three axes. Which axis and which step run
//! next is plain data held in a [`StepCursor`].

use rustfft::num_complex::Complex;

use crate::Axis;
use crate::config::Backend;
use crate::dsp::{self, FftBackend};

/// One stage of the windowed real FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Windowing,
    ComplexTransform,
    BitReversal,
    RealStaging,
    Magnitude,
    PeakSearch,
}

use Stage::*;

const TWO_STEPS: &[&[Stage]] = &[
    &[Windowing, ComplexTransform],
    &[BitReversal, RealStaging, Magnitude, PeakSearch],
];

const THREE_STEPS: &[&[Stage]] = &[
    &[Windowing, ComplexTransform],
    &[BitReversal, RealStaging],
    &[Magnitude, PeakSearch],
];

const SIX_STEPS: &[&[Stage]] = &[
    &[Windowing],
    &[ComplexTransform],
    &[BitReversal],
    &[RealStaging],
    &[Magnitude],
    &[PeakSearch],
];

/// Stages run by each step for a supported window size.
pub fn schedule_for(window_size: usize) -> Option<&'static [&'static [Stage]]> {
    match window_size {
        32 | 64 => Some(TWO_STEPS),
        128 => Some(THREE_STEPS),
        256 | 512 | 1024 => Some(SIX_STEPS),
        _ => None,
    }
}

/// Number of steps needed to complete one analysis, `None` for unsupported sizes.
pub fn update_steps_for(window_size: usize) -> Option<usize> {
    schedule_for(window_size).map(|schedule| schedule.len())
}

/// Position of the shared step machine: the axis being analysed and the
/// step it runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepCursor {
    pub axis: Axis,
    pub step: usize,
}

impl StepCursor {
    /// True when the next step would begin a fresh analysis.
    pub fn at_frame_start(&self) -> bool {
        self.step == 0
    }

    /// The single transition of the step machine. After the last step of an
    /// analysis the next axis starts again from step 0.
    pub fn advance(self, update_steps: usize) -> Self {
        let step = (self.step + 1) % update_steps;
        let axis = if step == 0 { self.axis.next() } else { self.axis };
        Self { axis, step }
    }
}

/// Working buffers of the windowed transform, shared by all axes.
pub struct WindowState {
    window_size: usize,
    sample_rate_hz: f32,
    bin_count: usize,
    schedule: &'static [&'static [Stage]],
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    rfft_data: Vec<Complex<f32>>,
    freq_bins: Vec<f32>,
    backend: Box<dyn FftBackend>,
}

impl WindowState {
    /// Returns `None` for window sizes the step machine has no schedule for.
    pub fn new(window_size: usize, sample_rate_hz: f32, backend: Backend) -> Option<Self> {
        let schedule = schedule_for(window_size)?;
        let bin_count = window_size / 2;
        Some(Self {
            window_size,
            sample_rate_hz,
            bin_count,
            schedule,
            window: dsp::hann_window(window_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); bin_count],
            rfft_data: vec![Complex::new(0.0, 0.0); bin_count],
            // one extra slot past Nyquist so neighbour reads stay in bounds
            freq_bins: vec![0.0; bin_count + 2],
            backend: dsp::backend_for(backend, window_size),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn update_steps(&self) -> usize {
        self.schedule.len()
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    pub fn bin_resolution(&self) -> f32 {
        self.sample_rate_hz / self.window_size as f32
    }

    /// Magnitudes of bins `0..=bin_count` from the last completed analysis.
    pub fn spectrum(&self) -> &[f32] {
        &self.freq_bins[..=self.bin_count]
    }

    /// Runs every stage of `step` against the circular buffer `samples`
    /// whose oldest sample sits at `buffer_index`.
    ///
    /// Returns the peak bin once the terminal step has run, `None` for every
    /// other step.
    pub fn analyse(
        &mut self,
        step: usize,
        samples: &[f32],
        buffer_index: usize,
        start_bin: usize,
    ) -> Option<usize> {
        let stages = self.schedule[step % self.schedule.len()];
        let mut peak = None;
        for &stage in stages {
            match stage {
                Windowing => self.apply_window(samples, buffer_index),
                ComplexTransform => self.backend.complex_transform(&mut self.fft_buffer),
                BitReversal => self.backend.bit_reversal_permute(&mut self.fft_buffer),
                RealStaging => self.backend.real_stage(&self.fft_buffer, &mut self.rfft_data),
                Magnitude => self.calc_magnitudes(),
                PeakSearch => peak = Some(self.find_peak(start_bin)),
            }
        }
        peak
    }

    fn apply_window(&mut self, samples: &[f32], buffer_index: usize) {
        debug_assert_eq!(samples.len(), self.window_size);
        // oldest samples run from buffer_index to the end of the ring
        let split = self.window_size - buffer_index;
        let (head, tail) = self.window.split_at(split);
        mult_interleaved(&mut self.fft_buffer, 0, &samples[buffer_index..], head);
        if buffer_index > 0 {
            mult_interleaved(&mut self.fft_buffer, split, &samples[..buffer_index], tail);
        }
    }

    fn calc_magnitudes(&mut self) {
        let bin_count = self.bin_count;
        self.backend
            .magnitude(&self.rfft_data[1..], &mut self.freq_bins[1..bin_count]);
        self.freq_bins[0] = self.rfft_data[0].re.abs(); // DC
        self.freq_bins[bin_count] = self.rfft_data[0].im.abs(); // Nyquist
        self.freq_bins[bin_count + 1] = 0.0;
    }

    fn find_peak(&self, start_bin: usize) -> usize {
        // Nyquist is excluded
        let start_bin = start_bin.min(self.bin_count - 1);
        let (offset, _) = self.backend.arg_max(&self.freq_bins[start_bin..self.bin_count]);
        offset + start_bin
    }
}

/// Multiplies `samples` by `coeffs` into the real window starting at sample
/// `offset`, stored as interleaved complex pairs.
fn mult_interleaved(buffer: &mut [Complex<f32>], offset: usize, samples: &[f32], coeffs: &[f32]) {
    for (i, (sample, coeff)) in samples.iter().zip(coeffs).enumerate() {
        let n = offset + i;
        let value = sample * coeff;
        if n % 2 == 0 {
            buffer[n / 2].re = value;
        } else {
            buffer[n / 2].im = value;
        }
    }
}
