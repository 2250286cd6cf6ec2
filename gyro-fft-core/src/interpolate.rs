//! # Peak Interpolation Module
//!
//! Places a spectral peak between FFT bins using the magnitudes of the peak
//! bin and its two neighbours.
//!
//! Both estimators share one edge policy: a peak in bin 0 or in the last bin
//! of the spectrum has only one real neighbour and is returned unshifted, as
//! is any neighbourhood whose energy is all zero. The offset is always kept
//! inside half a bin of the peak.

use crate::config::Interpolation;

/// Relative difference below which two neighbours count as equal.
const SYMMETRY_EPSILON: f32 = 1e-6;

impl Interpolation {
    /// Fractional bin position of the peak at bin `k` of `spectrum`.
    pub fn center_bin(&self, spectrum: &[f32], k: usize) -> f32 {
        let Some((left, peak, right)) = neighbourhood(spectrum, k) else {
            return k as f32;
        };
        let offset = match self {
            Interpolation::Simple => simple_offset(left, peak, right),
            Interpolation::Jain => jains_offset(left, peak, right),
        };
        k as f32 + offset.clamp(-0.5, 0.5)
    }

    /// Interpolated peak frequency in Hz for bins `resolution_hz` wide.
    pub fn center_freq_hz(&self, spectrum: &[f32], k: usize, resolution_hz: f32) -> f32 {
        self.center_bin(spectrum, k) * resolution_hz
    }
}

fn neighbourhood(spectrum: &[f32], k: usize) -> Option<(f32, f32, f32)> {
    if k == 0 || k + 1 >= spectrum.len() {
        return None;
    }
    Some((spectrum[k - 1], spectrum[k], spectrum[k + 1]))
}

/// Shift towards the larger neighbour by `neighbour / (neighbour + peak)` of a bin.
fn simple_offset(left: f32, peak: f32, right: f32) -> f32 {
    let (neighbour, direction) = if right > left {
        (right, 1.0)
    } else if left > right {
        (left, -1.0)
    } else {
        return 0.0;
    };
    let total = neighbour + peak;
    if total <= f32::EPSILON {
        return 0.0;
    }
    direction * neighbour / total
}

/// Jain's estimator: the ratio of the two largest bins fixes the offset
/// towards the stronger neighbour.
fn jains_offset(left: f32, peak: f32, right: f32) -> f32 {
    if (right - left).abs() <= SYMMETRY_EPSILON * peak.max(f32::MIN_POSITIVE) {
        return 0.0;
    }
    if left > right {
        // left > 0 here since right >= 0
        let a = peak / left;
        a / (1.0 + a) - 1.0
    } else {
        if peak <= f32::EPSILON {
            return 0.0;
        }
        let a = right / peak;
        a / (1.0 + a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const METHODS: [Interpolation; 2] = [Interpolation::Simple, Interpolation::Jain];

    #[test]
    fn symmetric_neighbourhood_returns_bin_center() {
        let spectrum = [0.0, 1.0, 2.0, 8.0, 2.0, 1.0, 0.0];
        for method in METHODS {
            assert_eq!(method.center_bin(&spectrum, 3), 3.0);
            assert_eq!(method.center_freq_hz(&spectrum, 3, 7.8125), 3.0 * 7.8125);
        }
    }

    #[test]
    fn asymmetric_neighbourhood_moves_towards_stronger_neighbour() {
        let right_heavy = [0.0, 1.0, 2.0, 8.0, 5.0, 1.0, 0.0];
        let left_heavy = [0.0, 1.0, 5.0, 8.0, 2.0, 1.0, 0.0];
        for method in METHODS {
            let up = method.center_bin(&right_heavy, 3);
            assert!(up > 3.0 && up <= 3.5, "{method:?} gave {up}");
            let down = method.center_bin(&left_heavy, 3);
            assert!(down < 3.0 && down >= 2.5, "{method:?} gave {down}");
        }
    }

    #[test]
    fn equal_top_bins_meet_halfway() {
        let spectrum = [0.0, 1.0, 6.0, 6.0, 1.0, 0.0];
        for method in METHODS {
            assert_abs_diff_eq!(method.center_bin(&spectrum, 2), 2.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn simple_method_uses_neighbour_share() {
        let spectrum = [0.0, 2.0, 6.0, 1.0, 0.0];
        // left neighbour wins: 2 / (2 + 6) = 0.25 of a bin
        assert_abs_diff_eq!(Interpolation::Simple.center_bin(&spectrum, 2), 1.75, epsilon = 1e-6);
    }

    #[test]
    fn jains_method_uses_bin_ratio() {
        let spectrum = [0.0, 1.0, 6.0, 3.0, 0.0];
        // a = 3 / 6, d = a / (1 + a) = 1 / 3
        assert_abs_diff_eq!(Interpolation::Jain.center_bin(&spectrum, 2), 2.0 + 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_energy_returns_bin_center() {
        let spectrum = [0.0; 8];
        for method in METHODS {
            assert_eq!(method.center_bin(&spectrum, 4), 4.0);
        }
        let lonely_peak = [0.0, 0.0, 3.0, 0.0, 0.0];
        for method in METHODS {
            assert_eq!(method.center_bin(&lonely_peak, 2), 2.0);
        }
    }

    #[test]
    fn spectrum_edges_are_not_shifted() {
        let spectrum = [5.0, 4.0, 1.0, 2.0, 6.0];
        for method in METHODS {
            assert_eq!(method.center_bin(&spectrum, 0), 0.0);
            assert_eq!(method.center_bin(&spectrum, 4), 4.0);
        }
    }
}
