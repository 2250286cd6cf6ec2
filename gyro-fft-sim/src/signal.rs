//! Synthetic gyro signal: motor vibration whose frequency follows the
//! throttle, plus broadband sensor noise.

use std::f32::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Relative strength of the motor tone on each axis.
const AXIS_GAIN: [f32; 3] = [1.0, 0.8, 0.3];
const SECOND_HARMONIC_GAIN: f32 = 0.3;

/// One sample handed from the sensor thread to the engine thread.
#[derive(Debug, Clone, Copy)]
pub struct SensorFrame {
    pub gyro: [f32; 3],
    pub throttle: f32,
}

#[derive(Debug, Clone)]
pub struct FlightProfile {
    /// Time on the ground with motors stopped, in seconds.
    pub ground_s: f32,
    /// Time spent spooling up to hover throttle.
    pub spool_s: f32,
    pub hover_throttle: f32,
}

impl FlightProfile {
    pub fn throttle_at(&self, t: f32) -> f32 {
        if t < self.ground_s {
            0.0
        } else if t < self.ground_s + self.spool_s {
            self.hover_throttle * (t - self.ground_s) / self.spool_s
        } else {
            self.hover_throttle
        }
    }

    pub fn is_hovering(&self, t: f32) -> bool {
        t >= self.ground_s + self.spool_s
    }
}

pub struct GyroSimulator {
    rate_hz: f32,
    /// Motor tone frequency at hover throttle.
    hover_freq_hz: f32,
    hover_throttle: f32,
    amplitude: f32,
    noise: f32,
    phase: f32,
    rng: StdRng,
}

impl GyroSimulator {
    pub fn new(rate_hz: f32, hover_freq_hz: f32, hover_throttle: f32, amplitude: f32, noise: f32, seed: u64) -> Self {
        Self {
            rate_hz,
            hover_freq_hz,
            hover_throttle,
            amplitude,
            noise,
            phase: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next sample at the given throttle. Motor speed, and so the tone,
    /// scales with the square root of throttle.
    pub fn sample(&mut self, throttle: f32) -> [f32; 3] {
        let (tone, second) = if throttle > 0.0 {
            let freq = self.hover_freq_hz * (throttle / self.hover_throttle).sqrt();
            self.phase = (self.phase + TAU * freq / self.rate_hz) % TAU;
            (self.phase.sin(), (2.0 * self.phase + PI / 3.0).sin())
        } else {
            (0.0, 0.0)
        };
        let motor = self.amplitude * throttle.min(1.0) * (tone + SECOND_HARMONIC_GAIN * second);
        std::array::from_fn(|i| AXIS_GAIN[i] * motor + self.rng.gen_range(-self.noise..=self.noise))
    }
}
