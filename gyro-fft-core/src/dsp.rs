//! # Numeric Transform Primitives
//!
//! Stateless vector operations the step engine orchestrates: the half-length
//! complex FFT, its bit-reversal permutation, the real-FFT staging pass, the
//! complex magnitude and the arg-max search.
//!
//! A real window of `N` samples is transformed as `N / 2` complex values
//! (even samples in the real part, odd samples in the imaginary part). The
//! staging pass then splits that half-length transform into the real
//! spectrum. Every buffer and table is sized at construction so none of the
//! per-step operations allocate.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::Backend;

/// Capability interface of a numerics backend.
///
/// `complex_transform` may leave its output in bit-reversed order;
/// `bit_reversal_permute` always brings it back to natural order. A backend
/// whose transform is already ordered implements the permutation as a no-op.
pub trait FftBackend: Send {
    /// In-place forward transform of `bin_count` complex values.
    fn complex_transform(&mut self, buffer: &mut [Complex<f32>]);

    /// In-place reordering of the transform output into natural order.
    fn bit_reversal_permute(&self, buffer: &mut [Complex<f32>]);

    /// Splits the half-length transform in `input` into the real spectrum.
    /// `output` must be a distinct buffer; slot 0 packs DC (re) and Nyquist (im).
    fn real_stage(&self, input: &[Complex<f32>], output: &mut [Complex<f32>]);

    /// Writes `|input[i]|` into `output[i]`.
    fn magnitude(&self, input: &[Complex<f32>], output: &mut [f32]) {
        for (out, value) in output.iter_mut().zip(input) {
            *out = value.norm(); // .norm() is sqrt(re^2 + im^2)
        }
    }

    /// Index and value of the largest element, first one on ties.
    fn arg_max(&self, values: &[f32]) -> (usize, f32) {
        arg_max(values)
    }
}

/// Builds the backend selected in the configuration for a given window size.
pub fn backend_for(kind: Backend, window_size: usize) -> Box<dyn FftBackend> {
    match kind {
        Backend::RustFft => Box::new(RustFftBackend::new(window_size)),
        Backend::Radix2 => Box::new(Radix2Backend::new(window_size)),
    }
}

/// Hann window coefficients.
///
/// The first and last coefficients are zero; windowing them is wasted work
/// but keeps the multiply a single contiguous pass.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n_minus_1).cos())
        .collect()
}

pub fn arg_max(values: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &value) in values.iter().enumerate() {
        if value > best.1 {
            best = (i, value);
        }
    }
    if best.1 == f32::NEG_INFINITY {
        (0, 0.0)
    } else {
        best
    }
}

/// Twiddle factors for splitting a half-length complex FFT into a real FFT.
#[derive(Debug, Clone)]
struct RealStage {
    twiddles: Vec<Complex<f32>>,
}

impl RealStage {
    fn new(window_size: usize) -> Self {
        let bin_count = window_size / 2;
        let twiddles = (0..bin_count)
            .map(|k| Complex::from_polar(1.0, -2.0 * PI * k as f32 / window_size as f32))
            .collect();
        Self { twiddles }
    }

    fn apply(&self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        let bin_count = self.twiddles.len();
        debug_assert_eq!(input.len(), bin_count);
        debug_assert!(output.len() >= bin_count);

        let z0 = input[0];
        output[0] = Complex::new(z0.re + z0.im, z0.re - z0.im);

        for k in 1..bin_count {
            let z = input[k];
            let z_mirror = input[bin_count - k].conj();
            let even = (z + z_mirror) * 0.5;
            // (z - z_mirror) / 2i
            let diff = z - z_mirror;
            let odd = Complex::new(diff.im * 0.5, -diff.re * 0.5);
            output[k] = even + self.twiddles[k] * odd;
        }
    }
}

/// Backend running the complex transform through a `rustfft` plan.
pub struct RustFftBackend {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    stage: RealStage,
}

impl RustFftBackend {
    pub fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size / 2);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            scratch,
            stage: RealStage::new(window_size),
        }
    }
}

impl FftBackend for RustFftBackend {
    fn complex_transform(&mut self, buffer: &mut [Complex<f32>]) {
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }

    // rustfft output is already in natural order
    fn bit_reversal_permute(&self, _buffer: &mut [Complex<f32>]) {}

    fn real_stage(&self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        self.stage.apply(input, output);
    }
}

/// Portable in-place radix-2 backend.
///
/// Decimation-in-frequency butterflies take natural-order input and leave
/// the result bit-reversed, which the precomputed swap table undoes.
pub struct Radix2Backend {
    twiddles: Vec<Complex<f32>>,
    swaps: Vec<(usize, usize)>,
    stage: RealStage,
}

impl Radix2Backend {
    pub fn new(window_size: usize) -> Self {
        let len = window_size / 2;
        let twiddles = (0..len / 2)
            .map(|k| Complex::from_polar(1.0, -2.0 * PI * k as f32 / len as f32))
            .collect();

        let bits = len.trailing_zeros();
        let swaps = (0..len)
            .filter_map(|i| {
                let j = bit_reverse(i, bits);
                (i < j).then_some((i, j))
            })
            .collect();

        Self {
            twiddles,
            swaps,
            stage: RealStage::new(window_size),
        }
    }
}

fn bit_reverse(value: usize, bits: u32) -> usize {
    if bits == 0 {
        return value;
    }
    value.reverse_bits() >> (usize::BITS - bits)
}

impl FftBackend for Radix2Backend {
    fn complex_transform(&mut self, buffer: &mut [Complex<f32>]) {
        let len = buffer.len();
        let mut span = len / 2;
        let mut stride = 1;
        while span >= 1 {
            for start in (0..len).step_by(2 * span) {
                for j in 0..span {
                    let a = buffer[start + j];
                    let b = buffer[start + j + span];
                    buffer[start + j] = a + b;
                    buffer[start + j + span] = (a - b) * self.twiddles[j * stride];
                }
            }
            span /= 2;
            stride *= 2;
        }
    }

    fn bit_reversal_permute(&self, buffer: &mut [Complex<f32>]) {
        for &(i, j) in &self.swaps {
            buffer.swap(i, j);
        }
    }

    fn real_stage(&self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        self.stage.apply(input, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_signal(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32;
                (0.3 * t).sin() + 0.5 * (1.7 * t + 0.2).cos() + 0.1
            })
            .collect()
    }

    /// Real spectrum through the backend, DC..=Nyquist, as plain complex values.
    fn staged_spectrum(backend: &mut dyn FftBackend, signal: &[f32]) -> Vec<Complex<f32>> {
        let bin_count = signal.len() / 2;
        let mut buffer: Vec<Complex<f32>> = signal
            .chunks_exact(2)
            .map(|pair| Complex::new(pair[0], pair[1]))
            .collect();
        let mut staged = vec![Complex::new(0.0, 0.0); bin_count];

        backend.complex_transform(&mut buffer);
        backend.bit_reversal_permute(&mut buffer);
        backend.real_stage(&buffer, &mut staged);

        let mut spectrum = Vec::with_capacity(bin_count + 1);
        spectrum.push(Complex::new(staged[0].re, 0.0));
        spectrum.extend_from_slice(&staged[1..]);
        spectrum.push(Complex::new(staged[0].im, 0.0));
        spectrum
    }

    fn reference_spectrum(signal: &[f32]) -> Vec<Complex<f32>> {
        let n = signal.len();
        let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(n).process(&mut buffer);
        buffer.truncate(n / 2 + 1);
        buffer
    }

    #[test]
    fn backends_match_full_length_real_fft() {
        for window_size in [32, 64, 128, 256, 512, 1024] {
            let signal = test_signal(window_size);
            let expected = reference_spectrum(&signal);
            let backends: [Box<dyn FftBackend>; 2] = [
                Box::new(RustFftBackend::new(window_size)),
                Box::new(Radix2Backend::new(window_size)),
            ];
            for mut backend in backends {
                let actual = staged_spectrum(backend.as_mut(), &signal);
                let tolerance = 1e-3 * window_size as f32;
                for (a, e) in actual.iter().zip(&expected) {
                    assert_abs_diff_eq!(a.re, e.re, epsilon = tolerance);
                    assert_abs_diff_eq!(a.im, e.im, epsilon = tolerance);
                }
            }
        }
    }

    #[test]
    fn radix2_output_is_bit_reversed_before_permutation() {
        let mut backend = Radix2Backend::new(16);
        let mut impulse = vec![Complex::new(0.0, 0.0); 8];
        impulse[1] = Complex::new(1.0, 0.0);
        backend.complex_transform(&mut impulse);
        // DFT of a delayed impulse is e^{-2πik/8}; bin 1 sits at bit-reversed slot 4
        let expected = Complex::from_polar(1.0, -2.0 * PI / 8.0);
        assert_abs_diff_eq!(impulse[4].re, expected.re, epsilon = 1e-6);
        assert_abs_diff_eq!(impulse[4].im, expected.im, epsilon = 1e-6);

        backend.bit_reversal_permute(&mut impulse);
        assert_abs_diff_eq!(impulse[1].re, expected.re, epsilon = 1e-6);
        assert_abs_diff_eq!(impulse[1].im, expected.im, epsilon = 1e-6);
    }

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let window = hann_window(64);
        assert_abs_diff_eq!(window[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(window[63], 0.0, epsilon = 1e-6);
        for i in 0..32 {
            assert_abs_diff_eq!(window[i], window[63 - i], epsilon = 1e-6);
        }
    }

    #[test]
    fn arg_max_prefers_first_maximum() {
        assert_eq!(arg_max(&[1.0, 3.0, 2.0, 3.0]), (1, 3.0));
        assert_eq!(arg_max(&[]), (0, 0.0));
    }
}
