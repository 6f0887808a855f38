use crate::descriptor::DescriptorScheme;
use crate::matching::Criterion;
use crate::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the canonical orientation(s) of a keypoint are chosen from its
/// orientation histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrientationAlgorithm {
    /// The single highest bin.
    Max,
    /// Every meaningful mode of the histogram; a keypoint may be duplicated.
    AContrario,
}

impl FromStr for OrientationAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(OrientationAlgorithm::Max),
            "ac" => Ok(OrientationAlgorithm::AContrario),
            _ => Err(Error::UnknownOrientationAlgorithm(s.to_owned())),
        }
    }
}

impl fmt::Display for OrientationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrientationAlgorithm::Max => "max",
            OrientationAlgorithm::AContrario => "ac",
        })
    }
}

/// Contains the parameters shared by every stage of the pipeline.
///
/// The most important parameters are the two detection thresholds.
/// [`SiftConfig::new`] sets the Laplacian threshold and leaves everything else
/// at its default; [`SiftConfig::sparse`] and [`SiftConfig::dense`] are
/// shortcuts for fewer or more keypoints.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SiftConfig {
    /// Number of levels in the scale space
    pub n_scale: usize,

    /// Blur of the first level (sigma units)
    pub sigma_init: f32,

    /// Ratio between the blurs of consecutive levels
    pub scale_ratio: f32,

    /// Minimum magnitude of the scale-normalized Laplacian
    pub laplacian_threshold: f32,

    /// Harris threshold, see [`crate::ScaleSpace::harris_threshold`]
    pub harris_threshold: f32,

    /// Orientation assignment rule
    pub orientation: OrientationAlgorithm,

    /// Number of bins of the orientation histogram
    pub orientation_bins: usize,

    /// Radius of the support region, in units of the keypoint sigma
    pub factor_size: f32,

    /// Descriptors extracted for every keypoint
    pub descriptors: Vec<DescriptorScheme>,

    /// Matching decision rule
    pub criterion: Criterion,

    /// Matches at or above this value are discarded. For probabilistic
    /// criteria it is divided by the number of keypoint pairs.
    pub match_threshold: f64,
}

impl SiftConfig {
    /// This convenience constructor is provided for the very common case
    /// that the Laplacian threshold needs to be modified.
    pub fn new(laplacian_threshold: f32) -> Self {
        Self {
            laplacian_threshold,
            ..Default::default()
        }
    }

    /// Uses a Laplacian threshold of `0.05` (default is `0.02`).
    pub fn sparse() -> Self {
        Self::new(0.05)
    }

    /// Uses a Laplacian threshold of `0.005` (default is `0.02`).
    pub fn dense() -> Self {
        Self::new(0.005)
    }

    /// Blur of level `i`.
    pub fn sigma(&self, i: usize) -> f32 {
        self.sigma_init * self.scale_ratio.powi(i as i32)
    }
}

impl Default for SiftConfig {
    fn default() -> SiftConfig {
        SiftConfig {
            n_scale: 10,
            sigma_init: 1.6,
            scale_ratio: 2f32.powf(1.0 / 3.0),
            laplacian_threshold: 0.02,
            harris_threshold: 1.0,
            orientation: OrientationAlgorithm::Max,
            orientation_bins: 36,
            factor_size: 6.0,
            descriptors: vec![DescriptorScheme::default()],
            criterion: Criterion::NnDr,
            match_threshold: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_sequence_is_geometric() {
        let config = SiftConfig::default();
        assert!((config.sigma(0) - 1.6).abs() < 1e-6);
        assert!((config.sigma(3) - 3.2).abs() < 1e-4);
    }

    #[test]
    fn parse_orientation_algorithm() {
        assert_eq!("max".parse::<OrientationAlgorithm>().unwrap(), OrientationAlgorithm::Max);
        assert_eq!(
            "ac".parse::<OrientationAlgorithm>().unwrap(),
            OrientationAlgorithm::AContrario
        );
        assert!("median".parse::<OrientationAlgorithm>().is_err());
    }

    #[test]
    fn default_descriptor_list_is_explicit() {
        let config = SiftConfig::sparse();
        assert_eq!(config.descriptors.len(), 1);
        assert_eq!(config.descriptors[0].n_sector(), 9);
        assert!(config.laplacian_threshold > SiftConfig::default().laplacian_threshold);
    }
}
