//! Meaningful modes of one-dimensional histograms.
//!
//! An interval of bins is meaningful when it holds far more mass than a
//! uniform distribution would put there. The number of false alarms (NFA) of
//! an interval is the number of intervals tested times an upper bound of the
//! probability that a uniform sample of the same size concentrates at least
//! as much mass in it. Intervals with an NFA below [`MEANINGFUL_NFA`] are
//! kept; modes are the most meaningful ones that neither overlap nor touch.

use float_ord::FloatOrd;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest expected number of false alarms for a meaningful interval.
pub const MEANINGFUL_NFA: f64 = 1.0;

/// A peak of a histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mode {
    /// Mass-weighted centre of the mode in turns of the histogram range,
    /// where bin `k` is centred on `k / n`.
    pub phase: f32,
    /// Share of the histogram mass inside the mode.
    pub norm: f32,
    /// First and last bin of the mode, inclusive. For circular histograms
    /// the interval may wrap, in which case `bins.0 > bins.1`.
    pub bins: (usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    log_nfa: f64,
    start: usize,
    len: usize,
}

/// Relative entropy of Bernoulli(r) against Bernoulli(p).
fn relative_entropy(r: f64, p: f64) -> f64 {
    let head = if r > 0.0 { r * (r / p).ln() } else { 0.0 };
    let tail = if r < 1.0 {
        (1.0 - r) * ((1.0 - r) / (1.0 - p)).ln()
    } else {
        0.0
    };
    head + tail
}

/// Extract the meaningful modes of `histogram`.
///
/// * `circular` - whether the last bin neighbours the first one.
/// * `min_support` - smallest mode width, in bins.
/// * `n_points` - number of samples accumulated into the histogram.
/// * `lambda` - mean weight of one sample.
/// * `lambda2` - mean squared weight of one sample.
///
/// Weighted samples count as `n_points * lambda^2 / lambda2` independent
/// draws. Modes are returned most meaningful first.
pub fn extract_modes(
    histogram: &[f32],
    circular: bool,
    min_support: usize,
    n_points: f32,
    lambda: f32,
    lambda2: f32,
) -> Vec<Mode> {
    let n = histogram.len();
    let total: f64 = histogram.iter().map(|&h| f64::from(h.max(0.0))).sum();
    if n < 2 || total <= 0.0 || n_points <= 0.0 {
        return vec![];
    }
    let effective_points = if lambda2 > 0.0 {
        f64::from(n_points) * f64::from(lambda).powi(2) / f64::from(lambda2)
    } else {
        f64::from(n_points)
    };
    let n_tests = if circular {
        (n * (n - 1)) as f64
    } else {
        (n * (n + 1) / 2) as f64
    };
    let log_tests = n_tests.ln();
    let threshold = MEANINGFUL_NFA.ln();

    // Prefix sums over two laps so wrapping intervals are plain differences.
    let mut prefix = vec![0f64; 2 * n + 1];
    for i in 0..2 * n {
        prefix[i + 1] = prefix[i] + f64::from(histogram[i % n].max(0.0));
    }

    let mut candidates = vec![];
    for start in 0..n {
        let max_len = if circular { n - 1 } else { n - start };
        for len in min_support.max(1)..=max_len {
            if len >= n {
                break;
            }
            let r = (prefix[start + len] - prefix[start]) / total;
            let p = len as f64 / n as f64;
            if r <= p {
                continue;
            }
            let log_nfa = log_tests - effective_points * relative_entropy(r.min(1.0), p);
            if log_nfa < threshold {
                candidates.push(Interval {
                    log_nfa,
                    start,
                    len,
                });
            }
        }
    }
    candidates.sort_by_key(|c| (FloatOrd(c.log_nfa), c.len));

    let mut occupied = vec![false; n];
    let mut modes = vec![];
    for candidate in candidates {
        // The interval grown by one bin on each side must be free, so
        // accepted modes are separated by at least one bin.
        let touches = (0..candidate.len + 2).any(|i| {
            let bin = candidate.start as isize + i as isize - 1;
            let bin = if circular {
                bin.rem_euclid(n as isize) as usize
            } else if bin < 0 || bin >= n as isize {
                return false;
            } else {
                bin as usize
            };
            occupied[bin]
        });
        if touches {
            continue;
        }
        let mut mass = 0f64;
        let mut moment = 0f64;
        for i in 0..candidate.len {
            let bin = (candidate.start + i) % n;
            let h = f64::from(histogram[bin].max(0.0));
            mass += h;
            moment += h * (candidate.start + i) as f64;
            occupied[bin] = true;
        }
        let centre = if mass > 0.0 {
            moment / mass
        } else {
            candidate.start as f64
        };
        let mut phase = (centre / n as f64) as f32;
        if circular {
            phase = phase.rem_euclid(1.0);
            if phase >= 1.0 {
                phase = 0.0;
            }
        }
        modes.push(Mode {
            phase,
            norm: (mass / total) as f32,
            bins: (candidate.start, (candidate.start + candidate.len - 1) % n),
        });
    }
    modes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_histogram_has_no_mode() {
        let histogram = vec![1.0; 36];
        assert!(extract_modes(&histogram, true, 1, 1000.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn empty_histogram_has_no_mode() {
        assert!(extract_modes(&[0.0; 12], true, 1, 100.0, 1.0, 1.0).is_empty());
        assert!(extract_modes(&[], true, 1, 100.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn single_peak_is_found() {
        let mut histogram = vec![0.1; 36];
        histogram[9] = 20.0;
        let modes = extract_modes(&histogram, true, 1, 200.0, 1.0, 1.0);
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].bins, (9, 9));
        assert!((modes[0].phase - 0.25).abs() < 1e-6);
        assert!(modes[0].norm > 0.8);
    }

    #[test]
    fn two_separated_peaks() {
        let mut histogram = vec![0.0; 24];
        histogram[3] = 10.0;
        histogram[15] = 6.0;
        let modes = extract_modes(&histogram, true, 1, 160.0, 1.0, 1.0);
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[0].bins, (3, 3));
        assert_eq!(modes[1].bins, (15, 15));
    }

    #[test]
    fn peak_wraps_around_circular_histogram() {
        let mut histogram = vec![0.0; 16];
        histogram[15] = 5.0;
        histogram[0] = 5.0;
        let modes = extract_modes(&histogram, true, 2, 100.0, 1.0, 1.0);
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].bins, (15, 0));
        // The centre sits half way between bin 15 and bin 0.
        assert!((modes[0].phase - 15.5 / 16.0).abs() < 1e-5);
    }

    #[test]
    fn heavy_weights_reduce_evidence() {
        let mut histogram = vec![1.0; 36];
        histogram[4] = 3.0;
        let confident = extract_modes(&histogram, true, 1, 2000.0, 1.0, 1.0);
        let spread = extract_modes(&histogram, true, 1, 2000.0, 1.0, 500.0);
        assert!(!confident.is_empty());
        assert!(spread.is_empty());
    }
}
