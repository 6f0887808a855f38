use crate::config::OrientationAlgorithm;
use crate::derivatives::{gradient, Gradient};
use crate::descriptor::{DescriptorData, DescriptorScheme};
use crate::image::{gaussian_blur, GrayFloatImage, RgbFloatImage};
use crate::keypoint::{Keypoint, OrientationHistogram};
use crate::patch::{PatchView, RgbPatch};
use crate::{Error, Result};
use image::DynamicImage;
use log::*;
use ndarray::{azip, s, Array2};

/// Weight of the determinant term of the Harris cornerness.
const HARRIS_GAIN: f32 = 1e4;
/// Weight of the scale-dependent threshold term of the Harris cornerness.
const HARRIS_THRESHOLD_GAIN: f32 = 1.0;
/// Trace weight of the Harris cornerness.
const HARRIS_K: f32 = 0.04;
/// Integration scale of the structure tensor, relative to the level blur.
const HARRIS_INTEGRATION: f32 = 1.4;
/// Smallest corrective blur worth applying to a support patch.
const CORRECTIVE_BLUR_TOLERANCE: f32 = 0.05;

/// Smoothed structure tensor of one level.
#[derive(Debug, Clone)]
pub struct HarrisTensor {
    pub xx: GrayFloatImage,
    pub yy: GrayFloatImage,
    pub xy: GrayFloatImage,
}

/// One level of the scale space.
#[derive(Debug, Clone)]
pub struct ScaleLevel {
    pub sigma: f32,
    pub blur: RgbFloatImage,
    pub gray: GrayFloatImage,
    /// Gradient of `gray`. Its Laplacian is scale-normalized by `sigma²`.
    pub gradient: Gradient,
    /// Filled by [`ScaleSpace::precompute_harris`] on interior levels.
    pub harris: Option<HarrisTensor>,
}

/// The Gaussian scale space of one image and the keypoints detected in it.
#[derive(Debug, Clone)]
pub struct ScaleSpace {
    image: RgbFloatImage,
    n_scale: usize,
    sigma_init: f32,
    scale_ratio: f32,
    levels: Vec<ScaleLevel>,
    max_laplacian: Option<Vec<Keypoint>>,
    harris_computed: bool,
}

impl ScaleSpace {
    pub fn new(image: RgbFloatImage) -> Self {
        Self {
            image,
            n_scale: 0,
            sigma_init: 0.0,
            scale_ratio: 0.0,
            levels: vec![],
            max_laplacian: None,
            harris_computed: false,
        }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(RgbFloatImage::from_dynamic(image))
    }

    pub fn image(&self) -> &RgbFloatImage {
        &self.image
    }

    pub fn levels(&self) -> &[ScaleLevel] {
        &self.levels
    }

    pub fn n_scale(&self) -> usize {
        self.n_scale
    }

    /// Blur of level `i`.
    pub fn sigma(&self, i: usize) -> f32 {
        self.sigma_init * self.scale_ratio.powi(i as i32)
    }

    /// Build `n_scale` levels, level `i` blurred from the input image with a
    /// Gaussian of std `sigma_init * scale_ratio^i`.
    pub fn compute_scale_space(
        &mut self,
        n_scale: usize,
        sigma_init: f32,
        scale_ratio: f32,
    ) -> Result<()> {
        if n_scale == 0 || !(sigma_init > 0.0) || !(scale_ratio > 1.0) {
            return Err(Error::InvalidScaleSpace {
                n_scale,
                sigma_init,
                scale_ratio,
            });
        }
        self.n_scale = n_scale;
        self.sigma_init = sigma_init;
        self.scale_ratio = scale_ratio;
        self.max_laplacian = None;
        self.harris_computed = false;
        self.levels = Vec::with_capacity(n_scale);
        for i in 0..n_scale {
            let sigma = self.sigma(i);
            trace!("Creating level {} with sigma={}.", i, sigma);
            let blur = self.image.gaussian_blur(sigma);
            trace!("Gaussian blur finished.");
            let gray = blur.grayscale();
            let mut gradient = gradient(&gray);
            let normalization = sigma * sigma;
            gradient
                .laplacian
                .mut_array2()
                .mapv_inplace(|v| v * normalization);
            trace!("Computing gradient and Laplacian done.");
            self.levels.push(ScaleLevel {
                sigma,
                blur,
                gray,
                gradient,
                harris: None,
            });
        }
        debug!(
            "Scale space of {} levels, sigma from {} to {}",
            n_scale,
            sigma_init,
            self.sigma(n_scale - 1)
        );
        Ok(())
    }

    /// Find the strict maxima of the absolute scale-normalized Laplacian over
    /// the 26 neighbours of every interior pixel of levels `1..n_scale - 1`.
    pub fn precompute_max_laplacian(&mut self) -> Result<&[Keypoint]> {
        if self.levels.is_empty() {
            return Err(Error::ScaleSpaceNotComputed);
        }
        let magnitudes: Vec<Array2<f32>> = self
            .levels
            .iter()
            .map(|level| level.gradient.laplacian.ref_array2().mapv(f32::abs))
            .collect();
        let mut keypoints = vec![];
        for k in 1..self.levels.len().saturating_sub(1) {
            let (height, width) = magnitudes[k].dim();
            for y in 1..height.saturating_sub(1) {
                for x in 1..width.saturating_sub(1) {
                    let value = magnitudes[k][[y, x]];
                    let is_maximum = magnitudes[k - 1..=k + 1].iter().enumerate().all(
                        |(dk, level)| {
                            level
                                .slice(s![y - 1..=y + 1, x - 1..=x + 1])
                                .indexed_iter()
                                .all(|((dy, dx), &other)| {
                                    (dk == 1 && dy == 1 && dx == 1) || value > other
                                })
                        },
                    );
                    if is_maximum {
                        let laplacian = self.levels[k].gradient.laplacian.get(x, y);
                        keypoints.push(Keypoint::new(x, y, self.levels[k].sigma, laplacian, k));
                    }
                }
            }
        }
        debug!("Found {} Laplacian maxima.", keypoints.len());
        let detected: &[Keypoint] = self.max_laplacian.insert(keypoints);
        Ok(detected)
    }

    /// The detection output of [`ScaleSpace::precompute_max_laplacian`].
    pub fn max_laplacian(&self) -> Result<&[Keypoint]> {
        self.max_laplacian
            .as_deref()
            .ok_or(Error::KeypointsNotDetected)
    }

    /// Smooth the structure tensor of every interior level with a Gaussian of
    /// std `1.4 * sigma`.
    pub fn precompute_harris(&mut self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(Error::ScaleSpaceNotComputed);
        }
        let n = self.levels.len();
        for level in self.levels.iter_mut().take(n.saturating_sub(1)).skip(1) {
            let gx = level.gradient.x.ref_array2();
            let gy = level.gradient.y.ref_array2();
            let mut xx = Array2::zeros(gx.dim());
            let mut yy = Array2::zeros(gx.dim());
            let mut xy = Array2::zeros(gx.dim());
            azip!((
                xx in &mut xx,
                yy in &mut yy,
                xy in &mut xy,
                &x in &gx,
                &y in &gy,
            ) {
                *xx = x * x;
                *yy = y * y;
                *xy = x * y;
            });
            let integration = HARRIS_INTEGRATION * level.sigma;
            level.harris = Some(HarrisTensor {
                xx: gaussian_blur(&GrayFloatImage::from_array2(xx), integration),
                yy: gaussian_blur(&GrayFloatImage::from_array2(yy), integration),
                xy: gaussian_blur(&GrayFloatImage::from_array2(xy), integration),
            });
            trace!("Harris tensor at sigma={} done.", level.sigma);
        }
        self.harris_computed = true;
        Ok(())
    }

    /// Keep the keypoints whose scale-normalized Laplacian magnitude exceeds
    /// `threshold`.
    pub fn laplacian_threshold(&self, keypoints: &[Keypoint], threshold: f32) -> Vec<Keypoint> {
        let kept: Vec<Keypoint> = keypoints
            .iter()
            .filter(|keypoint| keypoint.laplacian.abs() > threshold)
            .cloned()
            .collect();
        debug!(
            "{}/{} remain after Laplacian threshold {}.",
            kept.len(),
            keypoints.len(),
            threshold
        );
        kept
    }

    /// Harris cornerness of a keypoint, `None` when its level carries no
    /// tensor or the keypoint lies outside the level.
    pub fn cornerness(&self, keypoint: &Keypoint, threshold: f32) -> Option<f32> {
        let level = self.levels.get(keypoint.level)?;
        let harris = level.harris.as_ref()?;
        if keypoint.x >= harris.xx.width() || keypoint.y >= harris.xx.height() {
            return None;
        }
        let xx = harris.xx.get(keypoint.x, keypoint.y);
        let yy = harris.yy.get(keypoint.x, keypoint.y);
        let xy = harris.xy.get(keypoint.x, keypoint.y);
        let trace = xx + yy;
        let response = xx * yy - xy * xy - HARRIS_K * trace * trace;
        Some(
            HARRIS_GAIN * response
                - HARRIS_THRESHOLD_GAIN * threshold / keypoint.sigma.powi(4),
        )
    }

    /// Keep the keypoints with positive Harris cornerness. Keypoints on levels
    /// without a tensor (the boundary levels) are dropped.
    pub fn harris_threshold(
        &self,
        keypoints: &[Keypoint],
        threshold: f32,
    ) -> Result<Vec<Keypoint>> {
        if !self.harris_computed {
            return Err(Error::HarrisNotComputed);
        }
        let kept: Vec<Keypoint> = keypoints
            .iter()
            .filter(|keypoint| {
                self.cornerness(keypoint, threshold)
                    .map_or(false, |cornerness| cornerness > 0.0)
            })
            .cloned()
            .collect();
        debug!(
            "{}/{} remain after Harris threshold {}.",
            kept.len(),
            keypoints.len(),
            threshold
        );
        Ok(kept)
    }

    /// Index of the finest level that is not blurrier than `sigma`.
    fn level_below(&self, sigma: f32) -> usize {
        self.levels
            .iter()
            .rposition(|level| level.sigma <= sigma * (1.0 + f32::EPSILON))
            .unwrap_or(0)
    }

    /// The RGB neighbourhood of a keypoint at its own blur, with a one pixel
    /// margin around the disk of radius `radius`.
    ///
    /// The patch is cut from the finest level not blurrier than the keypoint,
    /// and blurred by the missing amount when it is noticeable.
    pub fn support_patch(&self, keypoint: &Keypoint, radius: usize) -> Result<RgbPatch> {
        if self.levels.is_empty() {
            return Err(Error::ScaleSpaceNotComputed);
        }
        let level = &self.levels[self.level_below(keypoint.sigma)];
        let gap = keypoint.sigma * keypoint.sigma - level.sigma * level.sigma;
        let correction = if gap > 0.0 { gap.sqrt() } else { 0.0 };
        let blurred = correction > CORRECTIVE_BLUR_TOLERANCE;
        let pad = if blurred {
            (3.0 * correction).ceil() as usize
        } else {
            0
        };
        let half = (radius + 1 + pad) as isize;
        let (width, height) = (level.blur.width(), level.blur.height());
        let (x0, y0) = (keypoint.x as isize - half, keypoint.y as isize - half);
        let (x1, y1) = (keypoint.x as isize + half, keypoint.y as isize + half);
        for &(x, y) in &[(x0, y0), (x1, y1)] {
            if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
                return Err(Error::SampleOutOfBounds {
                    x,
                    y,
                    width,
                    height,
                });
            }
        }
        let side = 2 * half as usize + 1;
        let crop = |channel: usize| {
            let samples = level
                .blur
                .plane(channel)
                .crop(x0 as usize, y0 as usize, side, side);
            if blurred {
                let smoothed = gaussian_blur(&GrayFloatImage::from_array2(samples), correction);
                smoothed
                    .ref_array2()
                    .slice(s![pad..side - pad, pad..side - pad])
                    .to_owned()
            } else {
                samples
            }
        };
        RgbPatch::new([crop(0), crop(1), crop(2)])
    }

    /// Support radius of a keypoint in pixels.
    fn support_radius(keypoint: &Keypoint, factor_size: f32) -> usize {
        (factor_size * keypoint.sigma).ceil().max(1.0) as usize
    }

    /// Assign orientations to `keypoints`, duplicating the keypoints that get
    /// several and dropping those with none or whose support leaves the image.
    pub fn extract_main_orientations(
        &self,
        keypoints: &[Keypoint],
        algorithm: OrientationAlgorithm,
        n_bin: usize,
        factor_size: f32,
    ) -> Result<Vec<Keypoint>> {
        let mut oriented = Vec::with_capacity(keypoints.len());
        for keypoint in keypoints {
            let radius = Self::support_radius(keypoint, factor_size);
            let patch = match self.support_patch(keypoint, radius) {
                Ok(patch) => patch,
                Err(Error::SampleOutOfBounds { .. }) => {
                    trace!("Dropping keypoint at ({}, {}).", keypoint.x, keypoint.y);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let view = PatchView::gradient_of(&patch.gray());
            let histogram = OrientationHistogram::accumulate(&view, n_bin)?;
            oriented.extend(keypoint.extract_main_orientation(histogram, algorithm));
        }
        debug!(
            "{} oriented keypoints from {} keypoints.",
            oriented.len(),
            keypoints.len()
        );
        Ok(oriented)
    }

    /// Extract every descriptor of `schemes` for each keypoint. Keypoints
    /// whose support leaves the image are dropped.
    pub fn extract_descriptors(
        &self,
        keypoints: &[Keypoint],
        schemes: &[DescriptorScheme],
        factor_size: f32,
    ) -> Result<Vec<Keypoint>> {
        let mut described = Vec::with_capacity(keypoints.len());
        for keypoint in keypoints {
            let radius = Self::support_radius(keypoint, factor_size);
            let patch = match self.support_patch(keypoint, radius) {
                Ok(patch) => patch,
                Err(Error::SampleOutOfBounds { .. }) => {
                    trace!("Dropping keypoint at ({}, {}).", keypoint.x, keypoint.y);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut keypoint = keypoint.clone();
            let orientation = keypoint.orientation_turns();
            for scheme in schemes {
                let view = scheme.get_patch(&patch);
                let mut data = keypoint
                    .descriptors
                    .remove(scheme.name())
                    .unwrap_or_else(|| DescriptorData::new(scheme.n_sector(), scheme.n_bin()));
                scheme.extract_into(orientation, &view, &mut data)?;
                keypoint.descriptors.insert(scheme.name().to_owned(), data);
            }
            described.push(keypoint);
        }
        info!(
            "Extracted {} descriptors for {} keypoints",
            schemes.len(),
            described.len()
        );
        Ok(described)
    }
}
