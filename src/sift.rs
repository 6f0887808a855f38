use crate::config::SiftConfig;
use crate::image::RgbFloatImage;
use crate::keypoint::Keypoint;
use crate::matching::Match;
use crate::scale_space::ScaleSpace;
use crate::{Error, Result};
use float_ord::FloatOrd;
use image::DynamicImage;
use log::*;
use std::path::Path;

/// One input image and the keypoints of its latest pipeline stage.
#[derive(Debug, Clone)]
struct Entry {
    scale_space: ScaleSpace,
    keypoints: Option<Vec<Keypoint>>,
}

/// Runs the detection, orientation, description and matching stages over a
/// set of images with shared parameters.
///
/// Every stage takes the keypoints of the previous one and replaces them.
///
/// # Example
/// ```no_run
/// let mut sift = acsift::Sift::new(acsift::SiftConfig::default());
/// let first = sift.add_path("first.png").unwrap();
/// let second = sift.add_path("second.png").unwrap();
/// sift.run().unwrap();
/// for m in sift.match_images(first, second).unwrap() {
///     println!("{}", m);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Sift {
    pub config: SiftConfig,
    entries: Vec<Entry>,
}

impl Sift {
    pub fn new(config: SiftConfig) -> Self {
        Self {
            config,
            entries: vec![],
        }
    }

    /// Add an image and return its index.
    pub fn add_image(&mut self, image: RgbFloatImage) -> usize {
        self.entries.push(Entry {
            scale_space: ScaleSpace::new(image),
            keypoints: None,
        });
        self.entries.len() - 1
    }

    pub fn add_dynamic(&mut self, image: &DynamicImage) -> usize {
        self.add_image(RgbFloatImage::from_dynamic(image))
    }

    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        Ok(self.add_image(RgbFloatImage::open(path)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries
            .get(index)
            .ok_or(Error::InvalidScaleSpaceIndex(index))
    }

    pub fn scale_space(&self, index: usize) -> Result<&ScaleSpace> {
        Ok(&self.entry(index)?.scale_space)
    }

    /// Keypoints of the latest stage run on image `index`.
    pub fn keypoints(&self, index: usize) -> Result<&[Keypoint]> {
        self.entry(index)?
            .keypoints
            .as_deref()
            .ok_or(Error::KeypointsNotDetected)
    }

    /// Build every scale space, detect the Laplacian maxima and prepare the
    /// Harris tensors.
    pub fn compute_scale_space(&mut self) -> Result<()> {
        let config = &self.config;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            trace!("Computing scale space {}.", i);
            entry.scale_space.compute_scale_space(
                config.n_scale,
                config.sigma_init,
                config.scale_ratio,
            )?;
            entry.scale_space.precompute_max_laplacian()?;
            entry.scale_space.precompute_harris()?;
            entry.keypoints = None;
        }
        Ok(())
    }

    /// Laplacian then Harris thresholds over the detected maxima.
    pub fn apply_scale_space_threshold(&mut self) -> Result<()> {
        let config = &self.config;
        for entry in &mut self.entries {
            let scale_space = &entry.scale_space;
            let detected = scale_space.max_laplacian()?;
            let contrasted = scale_space.laplacian_threshold(detected, config.laplacian_threshold);
            let cornered = scale_space.harris_threshold(&contrasted, config.harris_threshold)?;
            entry.keypoints = Some(cornered);
        }
        Ok(())
    }

    pub fn compute_main_orientations(&mut self) -> Result<()> {
        let config = &self.config;
        for entry in &mut self.entries {
            let keypoints = entry.keypoints.as_deref().ok_or(Error::KeypointsNotDetected)?;
            let oriented = entry.scale_space.extract_main_orientations(
                keypoints,
                config.orientation,
                config.orientation_bins,
                config.factor_size,
            )?;
            entry.keypoints = Some(oriented);
        }
        Ok(())
    }

    pub fn compute_descriptors(&mut self) -> Result<()> {
        let config = &self.config;
        for entry in &mut self.entries {
            let keypoints = entry.keypoints.as_deref().ok_or(Error::KeypointsNotDetected)?;
            let described = entry.scale_space.extract_descriptors(
                keypoints,
                &config.descriptors,
                config.factor_size,
            )?;
            entry.keypoints = Some(described);
        }
        Ok(())
    }

    /// Run every stage up to descriptor extraction.
    pub fn run(&mut self) -> Result<()> {
        self.compute_scale_space()?;
        self.apply_scale_space_threshold()?;
        self.compute_main_orientations()?;
        self.compute_descriptors()?;
        for i in 0..self.len() {
            info!("Extracted {} features from image {}", self.keypoints(i)?.len(), i);
        }
        Ok(())
    }

    /// Match every keypoint of image `query` against all keypoints of image
    /// `candidates`, best matches first.
    pub fn compute_matches(&self, query: usize, candidates: usize) -> Result<Vec<Match>> {
        let queries = self.keypoints(query)?;
        let others = self.keypoints(candidates)?;
        let names: Vec<&str> = self.config.descriptors.iter().map(|d| d.name()).collect();
        let mut matches = vec![];
        for (i, keypoint) in queries.iter().enumerate() {
            matches.extend(keypoint.match_candidates(
                i,
                others,
                self.config.criterion,
                &self.config.descriptors,
                &names,
            )?);
        }
        matches.sort_by_key(|m| FloatOrd(m.distance));
        debug!(
            "{} matches between images {} and {}.",
            matches.len(),
            query,
            candidates
        );
        Ok(matches)
    }

    /// Keep the matches below the configured threshold. For probabilistic
    /// criteria the threshold is shared among all keypoint pairs.
    pub fn threshold_matches(
        &self,
        matches: Vec<Match>,
        query: usize,
        candidates: usize,
    ) -> Result<Vec<Match>> {
        let mut threshold = self.config.match_threshold;
        if self.config.criterion.is_probabilistic() {
            let pairs = self.keypoints(query)?.len() * self.keypoints(candidates)?.len();
            threshold /= pairs.max(1) as f64;
        }
        let total = matches.len();
        let kept: Vec<Match> = matches
            .into_iter()
            .filter(|m| m.distance < threshold)
            .collect();
        debug!("{}/{} matches below {}.", kept.len(), total, threshold);
        Ok(kept)
    }

    /// [`Sift::compute_matches`] followed by [`Sift::threshold_matches`].
    pub fn match_images(&self, query: usize, candidates: usize) -> Result<Vec<Match>> {
        let matches = self.compute_matches(query, candidates)?;
        self.threshold_matches(matches, query, candidates)
    }
}
