//! Second order Butterworth low-pass used to smooth the published peak
//! frequency of each axis.

use std::f32::consts::{FRAC_PI_4, PI};

#[derive(Debug, Clone)]
pub struct LowPassFilter2p {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    delay_element_1: f32,
    delay_element_2: f32,
    primed: bool,
}

impl LowPassFilter2p {
    /// A cutoff at or above Nyquist, or a non-positive one, gives a pass-through filter.
    pub fn new(sample_freq: f32, cutoff_freq: f32) -> Self {
        let mut filter = Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            delay_element_1: 0.0,
            delay_element_2: 0.0,
            primed: false,
        };
        if cutoff_freq > 0.0 && cutoff_freq < sample_freq * 0.5 {
            let fr = sample_freq / cutoff_freq;
            let ohm = (PI / fr).tan();
            let c = 1.0 + 2.0 * FRAC_PI_4.cos() * ohm + ohm * ohm;
            filter.b0 = ohm * ohm / c;
            filter.b1 = 2.0 * filter.b0;
            filter.b2 = filter.b0;
            filter.a1 = 2.0 * (ohm * ohm - 1.0) / c;
            filter.a2 = (1.0 - 2.0 * FRAC_PI_4.cos() * ohm + ohm * ohm) / c;
        }
        filter
    }

    /// Filters one sample. The first sample primes the delay line so the
    /// output starts at the input instead of ramping up from zero.
    pub fn apply(&mut self, sample: f32) -> f32 {
        if !self.primed {
            self.reset(sample);
        }
        let delay_element_0 = sample - self.delay_element_1 * self.a1 - self.delay_element_2 * self.a2;
        let output = delay_element_0 * self.b0 + self.delay_element_1 * self.b1 + self.delay_element_2 * self.b2;
        self.delay_element_2 = self.delay_element_1;
        self.delay_element_1 = delay_element_0;
        output
    }

    /// Sets the filter to a steady state at `value`.
    pub fn reset(&mut self, value: f32) {
        // unity DC gain, so the delay line settles at value / (1 + a1 + a2)
        let steady = value / (1.0 + self.a1 + self.a2);
        self.delay_element_1 = steady;
        self.delay_element_2 = steady;
        self.primed = true;
    }
}
