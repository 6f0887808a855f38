//! Scale-invariant keypoints with log-polar histogram descriptors and
//! a-contrario matching.
//!
//! The pipeline runs one way: an image is turned into a Gaussian
//! [`ScaleSpace`], the strict maxima of its scale-normalized Laplacian become
//! [`Keypoint`]s, weak and edge-like ones are thresholded away, each survivor
//! gets one or more orientations, then one descriptor per
//! [`DescriptorScheme`]. Keypoints of two images are compared sector by
//! sector and reduced to [`Match`]es by a [`Criterion`]. [`Sift`] drives the
//! stages with the parameters of a [`SiftConfig`].

mod colorspace;
mod config;
pub mod derivatives;
pub mod descriptor;
pub mod export;
pub mod image;
mod keypoint;
mod matching;
pub mod modes;
mod patch;
mod scale_space;
mod sift;

pub use crate::colorspace::Colorspace;
pub use crate::config::{OrientationAlgorithm, SiftConfig};
pub use crate::descriptor::{
    DescriptorData, DescriptorScheme, DescriptorType, Distance, SchemeOptions,
};
pub use crate::image::{GrayFloatImage, RgbFloatImage};
pub use crate::keypoint::{circular_bin, Keypoint, KeypointPosition, OrientationHistogram};
pub use crate::matching::{
    distance_ratio, false_alarm_scores, Criterion, Match, AC_SIGNIFICANCE,
};
pub use crate::patch::{PatchView, RgbPatch};
pub use crate::scale_space::{HarrisTensor, ScaleLevel, ScaleSpace};
pub use crate::sift::Sift;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("descriptor scheme requires a name")]
    MissingSchemeName,
    #[error("unknown distance {0:?}")]
    UnknownDistance(String),
    #[error("unknown descriptor type {0:?}")]
    UnknownDescriptorType(String),
    #[error("unknown colorspace {0:?}")]
    UnknownColorspace(String),
    #[error("unknown matching criterion {0:?}")]
    UnknownCriterion(String),
    #[error("unknown orientation algorithm {0:?}")]
    UnknownOrientationAlgorithm(String),
    #[error("descriptor {0:?} was not extracted")]
    UnknownDescriptor(String),
    #[error("sectors {0:?} must be a non-empty list of positive counts")]
    InvalidSectors(Vec<usize>),
    #[error("rings {rings:?} must increase strictly up to 1, one per ring of {sectors:?}")]
    InvalidRings { sectors: Vec<usize>, rings: Vec<f32> },
    #[error("histograms need at least one bin, got {0}")]
    InvalidBins(usize),
    #[error("expected {expected} channel(s) in 0..3, got {channels:?}")]
    InvalidChannels { channels: Vec<usize>, expected: usize },
    #[error("point at radius {radius} lies outside the rings of radius {r_max}")]
    OutsideRings { radius: f32, r_max: f32 },
    #[error("expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("tried to sample ({x},{y}) out of image bounds ({width}, {height})")]
    SampleOutOfBounds {
        x: isize,
        y: isize,
        width: usize,
        height: usize,
    },
    #[error("invalid scale space: {n_scale} levels, sigma {sigma_init}, ratio {scale_ratio}")]
    InvalidScaleSpace {
        n_scale: usize,
        sigma_init: f32,
        scale_ratio: f32,
    },
    #[error("scale space has not been computed")]
    ScaleSpaceNotComputed,
    #[error("keypoints have not been detected")]
    KeypointsNotDetected,
    #[error("Harris tensors have not been computed")]
    HarrisNotComputed,
    #[error("descriptor modes have not been extracted")]
    MissingModes,
    #[error("no scale space at index {0}")]
    InvalidScaleSpaceIndex(usize),
    #[error("image error: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
