//! # Sample Accumulator
//!
//! Averages native-rate samples down to the spectral sample rate and keeps
//! the most recent window of them in a circular buffer per axis.

use crate::{Axis, XYZ_AXIS_COUNT};

#[derive(Debug, Clone)]
struct AxisSampler {
    buffer: Vec<f32>,
    // next write position, which is also the oldest sample
    buffer_index: usize,
    accum: f32,
    accum_count: u16,
    // samples written since this axis last started an analysis
    fresh_samples: usize,
}

impl AxisSampler {
    fn new(window_size: usize) -> Self {
        Self {
            buffer: vec![0.0; window_size],
            buffer_index: 0,
            accum: 0.0,
            accum_count: 0,
            fresh_samples: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sampler {
    axes: [AxisSampler; XYZ_AXIS_COUNT],
    oversample: u16,
    multiplier: f32,
}

impl Sampler {
    /// `window_size` must be a power of two; the engine validates it before
    /// building a sampler.
    pub fn new(window_size: usize, oversample: u16, multiplier: f32) -> Self {
        debug_assert!(window_size.is_power_of_two());
        Self {
            axes: std::array::from_fn(|_| AxisSampler::new(window_size)),
            oversample: oversample.max(1),
            multiplier,
        }
    }

    /// Accumulates one native-rate sample, emitting a window sample every
    /// `oversample` calls.
    pub fn feed(&mut self, axis: Axis, raw_value: f32) {
        let multiplier = self.multiplier;
        let oversample = self.oversample;
        let a = &mut self.axes[axis.index()];
        a.accum += raw_value;
        a.accum_count += 1;
        if a.accum_count >= oversample {
            let mask = a.buffer.len() - 1;
            a.buffer[a.buffer_index] = a.accum * multiplier;
            a.buffer_index = (a.buffer_index + 1) & mask;
            a.accum = 0.0;
            a.accum_count = 0;
            a.fresh_samples = a.fresh_samples.saturating_add(1);
        }
    }

    /// The circular buffer of `axis` and the index of its oldest sample.
    pub fn window(&self, axis: Axis) -> (&[f32], usize) {
        let a = &self.axes[axis.index()];
        (&a.buffer, a.buffer_index)
    }

    pub fn buffer_index(&self, axis: Axis) -> usize {
        self.axes[axis.index()].buffer_index
    }

    /// True once `axis` has gathered `samples_per_frame` new samples.
    pub fn frame_ready(&self, axis: Axis, samples_per_frame: usize) -> bool {
        self.axes[axis.index()].fresh_samples >= samples_per_frame
    }

    /// Marks the current contents of `axis` as consumed by an analysis.
    pub fn begin_frame(&mut self, axis: Axis) {
        self.axes[axis.index()].fresh_samples = 0;
    }
}
