use crate::config::OrientationAlgorithm;
use crate::descriptor::DescriptorData;
use crate::modes::{extract_modes, Mode};
use crate::patch::PatchView;
use crate::Result;
use std::collections::BTreeMap;
use std::f32::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A scale-space extremum and everything later stages attach to it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    /// Column of the extremum, `+x` faces right.
    pub x: usize,
    /// Row of the extremum, `+y` faces toward the bottom of the image.
    pub y: usize,
    /// Blur at which the keypoint was detected.
    pub sigma: f32,
    /// Scale-normalized Laplacian at detection.
    pub laplacian: f32,
    /// Index of the scale space level of detection.
    pub level: usize,
    /// Canonical orientation in radians, `[0, 2π)`, once assigned.
    pub orientation: Option<f32>,
    /// Orientation histogram the orientation was chosen from.
    pub histogram: Option<OrientationHistogram>,
    /// Extracted descriptors, by scheme name.
    pub descriptors: BTreeMap<String, DescriptorData>,
}

/// The geometric part of a keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeypointPosition {
    pub x: usize,
    pub y: usize,
    pub sigma: f32,
    pub orientation: Option<f32>,
}

impl Keypoint {
    pub fn new(x: usize, y: usize, sigma: f32, laplacian: f32, level: usize) -> Self {
        Self {
            x,
            y,
            sigma,
            laplacian,
            level,
            orientation: None,
            histogram: None,
            descriptors: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> KeypointPosition {
        KeypointPosition {
            x: self.x,
            y: self.y,
            sigma: self.sigma,
            orientation: self.orientation,
        }
    }

    /// Orientation in turns, zero when none was assigned.
    pub fn orientation_turns(&self) -> f32 {
        self.orientation.unwrap_or(0.0) / TAU
    }

    /// One copy of the keypoint per orientation selected by `algorithm`.
    ///
    /// The histogram is stored on every copy. With
    /// [`OrientationAlgorithm::AContrario`] its modes are filled in, and a
    /// histogram without meaningful mode yields no keypoint at all.
    pub fn extract_main_orientation(
        &self,
        mut histogram: OrientationHistogram,
        algorithm: OrientationAlgorithm,
    ) -> Vec<Keypoint> {
        let phases = match algorithm {
            OrientationAlgorithm::Max => histogram.argmax_phase().into_iter().collect(),
            OrientationAlgorithm::AContrario => {
                histogram.extract_modes();
                histogram.modes.iter().map(|mode| mode.phase).collect::<Vec<_>>()
            }
        };
        phases
            .into_iter()
            .map(|phase| {
                let mut keypoint = self.clone();
                keypoint.orientation = Some((phase * TAU).rem_euclid(TAU));
                keypoint.histogram = Some(histogram.clone());
                keypoint
            })
            .collect()
    }
}

/// Gradient orientations around a keypoint, weighted by gradient magnitude.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrientationHistogram {
    /// Accumulated weight per bin; bin `k` is centred on `k / bins.len()` turns.
    pub bins: Vec<f32>,
    /// Number of pixels accumulated.
    pub n_points: usize,
    /// Mean weight per pixel.
    pub lambda: f32,
    /// Mean squared weight per pixel.
    pub lambda2: f32,
    /// Meaningful modes, filled by [`OrientationHistogram::extract_modes`].
    pub modes: Vec<Mode>,
}

/// Bin of `phase` (turns) in a circular histogram of `n_bin` bins.
pub fn circular_bin(phase: f32, n_bin: usize) -> usize {
    let bin = (phase.rem_euclid(1.0) * n_bin as f32).round() as usize;
    bin % n_bin
}

impl OrientationHistogram {
    /// Accumulate every pixel of the view's disk.
    pub fn accumulate(view: &PatchView, n_bin: usize) -> Result<Self> {
        let radius = view.radius()?;
        let (phase, weight) = view.phase_and_weight();
        let r2 = (radius * radius) as isize;
        let mut bins = vec![0f32; n_bin.max(1)];
        let mut n_points = 0usize;
        let mut sum = 0f64;
        let mut sum_squares = 0f64;
        for ((row, col), &w) in weight.indexed_iter() {
            let dy = row as isize - radius as isize;
            let dx = col as isize - radius as isize;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let bin = circular_bin(phase[[row, col]], bins.len());
            bins[bin] += w;
            n_points += 1;
            sum += f64::from(w);
            sum_squares += f64::from(w) * f64::from(w);
        }
        let (lambda, lambda2) = if n_points > 0 {
            (
                (sum / n_points as f64) as f32,
                (sum_squares / n_points as f64) as f32,
            )
        } else {
            (0.0, 0.0)
        };
        Ok(Self {
            bins,
            n_points,
            lambda,
            lambda2,
            modes: vec![],
        })
    }

    /// Phase of the highest bin, `None` for an empty histogram.
    pub fn argmax_phase(&self) -> Option<f32> {
        let total: f32 = self.bins.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let (index, _) = self
            .bins
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        Some(index as f32 / self.bins.len() as f32)
    }

    pub fn extract_modes(&mut self) {
        self.modes = extract_modes(
            &self.bins,
            true,
            1,
            self.n_points as f32,
            self.lambda,
            self.lambda2,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn uniform_view(radius: usize, phase: f32) -> PatchView {
        let side = 2 * radius + 1;
        PatchView::Gradient {
            phase: Array2::from_elem((side, side), phase),
            norm: Array2::from_elem((side, side), 1.0),
        }
    }

    #[test]
    fn circular_bin_wraps() {
        assert_eq!(circular_bin(0.0, 8), 0);
        assert_eq!(circular_bin(0.99, 8), 0);
        assert_eq!(circular_bin(-0.125, 8), 7);
        assert_eq!(circular_bin(0.3, 10), 3);
    }

    #[test]
    fn histogram_counts_disk_pixels_only() {
        let histogram = OrientationHistogram::accumulate(&uniform_view(2, 0.5), 36).unwrap();
        // The 5x5 square minus the twelve pixels farther than 2 from the centre.
        assert_eq!(histogram.n_points, 13);
        assert_eq!(histogram.bins[18], 13.0);
        assert!((histogram.lambda - 1.0).abs() < 1e-6);
    }

    #[test]
    fn max_orientation_is_argmax() {
        let keypoint = Keypoint::new(10, 12, 2.0, 0.3, 1);
        let histogram = OrientationHistogram::accumulate(&uniform_view(3, 0.25), 36).unwrap();
        let oriented = keypoint.extract_main_orientation(histogram, OrientationAlgorithm::Max);
        assert_eq!(oriented.len(), 1);
        let orientation = oriented[0].orientation.unwrap();
        assert!((orientation - TAU / 4.0).abs() < 1e-5);
        assert_eq!(oriented[0].position().x, 10);
    }

    #[test]
    fn ac_orientation_duplicates_keypoint() {
        let side = 9;
        let mut phase = Array2::from_elem((side, side), 0.0);
        for ((_, col), p) in phase.indexed_iter_mut() {
            if col >= 5 {
                *p = 0.5;
            }
        }
        let view = PatchView::Gradient {
            phase,
            norm: Array2::from_elem((side, side), 1.0),
        };
        let histogram = OrientationHistogram::accumulate(&view, 36).unwrap();
        let keypoint = Keypoint::new(4, 4, 1.5, -0.2, 1);
        let oriented =
            keypoint.extract_main_orientation(histogram, OrientationAlgorithm::AContrario);
        assert_eq!(oriented.len(), 2);
        let mut orientations: Vec<f32> = oriented
            .iter()
            .map(|k| k.orientation.unwrap())
            .collect();
        orientations.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(orientations[0].abs() < 1e-5);
        assert!((orientations[1] - TAU / 2.0).abs() < 1e-5);
        assert_eq!(oriented[0].histogram.as_ref().unwrap().modes.len(), 2);
    }

    #[test]
    fn flat_histogram_yields_no_ac_orientation() {
        let side = 5;
        let view = PatchView::Gradient {
            phase: Array2::zeros((side, side)),
            norm: Array2::zeros((side, side)),
        };
        let histogram = OrientationHistogram::accumulate(&view, 36).unwrap();
        let keypoint = Keypoint::new(4, 4, 1.5, -0.2, 1);
        assert!(keypoint
            .extract_main_orientation(histogram.clone(), OrientationAlgorithm::AContrario)
            .is_empty());
        assert!(keypoint
            .extract_main_orientation(histogram, OrientationAlgorithm::Max)
            .is_empty());
    }
}
