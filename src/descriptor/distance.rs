//! Distances between the sector histograms of two descriptors.
//!
//! Every function compares one sector. Histograms have the same length; the
//! caller checks shapes.

use crate::modes::Mode;
use float_ord::FloatOrd;
use ndarray::ArrayView1;

/// Mean absolute bin-wise difference.
pub fn l1(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f32>() / a.len() as f32
}

/// Mean squared bin-wise difference.
pub fn l2(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        / a.len() as f32
}

/// Circular earth mover's distance between two histograms given by their
/// cumulative sums.
///
/// On a circle the flow across the cut after bin `j` is `D[j] - D[k]` for
/// some constant `D[k]`, where `D` is the difference of the cumulative
/// histograms. The cost is the smallest mean absolute flow over every choice
/// of `k`.
pub fn cemd(cumulated_a: ArrayView1<f32>, cumulated_b: ArrayView1<f32>) -> f32 {
    let n = cumulated_a.len();
    if n == 0 {
        return 0.0;
    }
    let diff: Vec<f32> = cumulated_a
        .iter()
        .zip(cumulated_b.iter())
        .map(|(x, y)| x - y)
        .collect();
    diff.iter()
        .map(|&offset| diff.iter().map(|&d| (d - offset).abs()).sum::<f32>())
        .fold(f32::INFINITY, f32::min)
        / n as f32
}

/// Distance between two phases in turns.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(1.0);
    d.min(1.0 - d)
}

/// Optimal transport cost between the mode codes of two sectors.
///
/// Each side holds at most two modes; masses are renormalised to one per side
/// and the ground cost is [`circular_distance`]. An empty sector against a
/// non-empty one costs the largest circular distance, half a turn.
pub fn d2m(a: &[Mode], b: &[Mode]) -> f32 {
    let a = code(a);
    let b = code(b);
    match (a.as_slice(), b.as_slice()) {
        ([], []) => 0.0,
        ([], _) | (_, []) => 0.5,
        ([(pa, _)], modes) | (modes, [(pa, _)]) => modes
            .iter()
            .map(|&(p, w)| w * circular_distance(*pa, p))
            .sum(),
        ([(pa1, wa1), (pa2, _), ..], [(pb1, wb1), (pb2, wb2), ..]) => {
            // `t` is the mass sent from a1 to b1; the cost is linear in `t`
            // so the optimum sits at an end of its feasible range.
            let cost = |t: f32| {
                t * circular_distance(*pa1, *pb1)
                    + (wa1 - t) * circular_distance(*pa1, *pb2)
                    + (wb1 - t) * circular_distance(*pa2, *pb1)
                    + (1.0 - wa1 - wb1 + t) * circular_distance(*pa2, *pb2)
            };
            let low = (wa1 - wb2).max(0.0);
            let high = wa1.min(*wb1);
            cost(low).min(cost(high))
        }
    }
}

/// The two heaviest modes as `(phase, mass)` with unit total mass.
fn code(modes: &[Mode]) -> Vec<(f32, f32)> {
    let mut kept: Vec<(f32, f32)> = modes
        .iter()
        .filter(|m| m.norm > 0.0)
        .map(|m| (m.phase, m.norm))
        .collect();
    kept.sort_by_key(|&(_, w)| std::cmp::Reverse(FloatOrd(w)));
    kept.truncate(2);
    let total: f32 = kept.iter().map(|&(_, w)| w).sum();
    for (_, w) in kept.iter_mut() {
        *w /= total;
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array1};

    fn mode(phase: f32, norm: f32) -> Mode {
        Mode {
            phase,
            norm,
            bins: (0, 0),
        }
    }

    fn cumulate(h: &[f32]) -> Array1<f32> {
        let mut acc = 0.0;
        h.iter()
            .map(|v| {
                acc += v;
                acc
            })
            .collect()
    }

    #[test]
    fn l1_and_l2_are_bin_means() {
        let a = arr1(&[0.5, 0.5, 0.0, 0.0]);
        let b = arr1(&[0.0, 0.5, 0.5, 0.0]);
        assert!((l1(a.view(), b.view()) - 0.25).abs() < 1e-6);
        assert!((l2(a.view(), b.view()) - 0.125).abs() < 1e-6);
        assert_eq!(l1(a.view(), a.view()), 0.0);
    }

    #[test]
    fn cemd_moves_mass_around_the_circle() {
        // A unit of mass one bin away, either way round.
        let a = cumulate(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let b = cumulate(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let c = cumulate(&[0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let d_ab = cemd(a.view(), b.view());
        let d_ac = cemd(a.view(), c.view());
        assert!((d_ab - 1.0 / 6.0).abs() < 1e-6);
        assert!((d_ab - d_ac).abs() < 1e-6);
        assert_eq!(cemd(a.view(), a.view()), 0.0);
    }

    #[test]
    fn cemd_is_symmetric() {
        let a = cumulate(&[0.1, 0.3, 0.0, 0.2, 0.4]);
        let b = cumulate(&[0.25, 0.0, 0.5, 0.05, 0.2]);
        assert!((cemd(a.view(), b.view()) - cemd(b.view(), a.view())).abs() < 1e-6);
    }

    #[test]
    fn circular_distance_wraps() {
        assert!((circular_distance(0.9, 0.1) - 0.2).abs() < 1e-6);
        assert!((circular_distance(0.25, 0.75) - 0.5).abs() < 1e-6);
        assert_eq!(circular_distance(0.3, 0.3), 0.0);
    }

    #[test]
    fn d2m_edge_cases() {
        assert_eq!(d2m(&[], &[]), 0.0);
        assert_eq!(d2m(&[mode(0.2, 1.0)], &[]), 0.5);
        assert!((d2m(&[mode(0.1, 1.0)], &[mode(0.3, 1.0)]) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn d2m_one_against_two_splits_the_mass() {
        let one = [mode(0.0, 1.0)];
        let two = [mode(0.25, 0.5), mode(0.5, 0.5)];
        let expected = 0.5 * 0.25 + 0.5 * 0.5;
        assert!((d2m(&one, &two) - expected).abs() < 1e-6);
        assert!((d2m(&two, &one) - expected).abs() < 1e-6);
    }

    #[test]
    fn d2m_two_against_two_picks_the_cheap_plan() {
        let a = [mode(0.0, 0.75), mode(0.5, 0.25)];
        let b = [mode(0.5, 0.25), mode(0.0, 0.75)];
        assert!(d2m(&a, &b).abs() < 1e-6);
        let c = [mode(0.1, 0.75), mode(0.5, 0.25)];
        assert!((d2m(&a, &c) - 0.075).abs() < 1e-6);
        assert!((d2m(&a, &c) - d2m(&c, &a)).abs() < 1e-6);
    }
}
