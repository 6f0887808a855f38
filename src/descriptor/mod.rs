//! Log-polar histogram descriptors.
//!
//! A [`DescriptorScheme`] splits the support disk of a keypoint into rings,
//! and every ring into angular sectors. Each sector gets a circular histogram
//! of `n_bin` bins, filled with gradient orientations weighted by gradient
//! magnitude, or with one colour channel weighted by another.

mod data;
pub mod distance;

pub use data::DescriptorData;

use crate::colorspace::Colorspace;
use crate::derivatives::phase_turns;
use crate::keypoint::circular_bin;
use crate::patch::{PatchView, RgbPatch};
use crate::{Error, Result};
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sector histogram dissimilarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Distance {
    L1,
    L2,
    /// Circular earth mover's distance over cumulative histograms.
    Cemd,
    /// Transport distance between quantised mode codes.
    D2m,
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L1" => Ok(Distance::L1),
            "L2" => Ok(Distance::L2),
            "CEMD" => Ok(Distance::Cemd),
            "D2M" => Ok(Distance::D2m),
            _ => Err(Error::UnknownDistance(s.to_owned())),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Distance::L1 => "L1",
            Distance::L2 => "L2",
            Distance::Cemd => "CEMD",
            Distance::D2m => "D2M",
        })
    }
}

/// What a descriptor accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DescriptorType {
    /// Gradient orientation of one channel, weighted by its magnitude.
    Gradient,
    /// The second channel read as a phase, weighted by the first channel.
    WeightedHistograms,
}

impl DescriptorType {
    fn n_channels(self) -> usize {
        match self {
            DescriptorType::Gradient => 1,
            DescriptorType::WeightedHistograms => 2,
        }
    }
}

impl FromStr for DescriptorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GRADIENT" => Ok(DescriptorType::Gradient),
            "WEIGHTED-HISTOGRAMS" => Ok(DescriptorType::WeightedHistograms),
            _ => Err(Error::UnknownDescriptorType(s.to_owned())),
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DescriptorType::Gradient => "GRADIENT",
            DescriptorType::WeightedHistograms => "WEIGHTED-HISTOGRAMS",
        })
    }
}

/// Construction options of a [`DescriptorScheme`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SchemeOptions {
    /// Sectors per ring. Defaults to `[1, 4, 4]`.
    pub sectors: Option<Vec<usize>>,
    /// Outer radius of each ring relative to the support radius. When only
    /// `sectors` is given, rings are chosen so every sector has the same area.
    pub rings: Option<Vec<f32>>,
    pub n_bin: usize,
    /// Measure angles from the keypoint orientation instead of the image axes.
    pub relative_orientation: bool,
    /// Keep the meaningful modes of every sector histogram.
    pub extract_modes: bool,
    /// Grey-world colour normalisation of the patch before conversion.
    pub normalize: bool,
    pub distance: Distance,
    pub kind: DescriptorType,
    pub colorspace: Colorspace,
    /// One channel for [`DescriptorType::Gradient`], `[weight, phase]` for
    /// [`DescriptorType::WeightedHistograms`].
    pub channels: Vec<usize>,
}

impl Default for SchemeOptions {
    fn default() -> Self {
        Self {
            sectors: None,
            rings: None,
            n_bin: 12,
            relative_orientation: true,
            extract_modes: false,
            normalize: false,
            distance: Distance::L1,
            kind: DescriptorType::Gradient,
            colorspace: Colorspace::Ohta,
            channels: vec![0],
        }
    }
}

const DEFAULT_SECTORS: [usize; 3] = [1, 4, 4];
const DEFAULT_RINGS: [f32; 3] = [0.25, 0.75, 1.0];

/// Rings giving every sector the same area.
fn equal_area_rings(sectors: &[usize]) -> Vec<f32> {
    let total: usize = sectors.iter().sum();
    sectors
        .iter()
        .scan(0, |cumul, &s| {
            *cumul += s;
            Some(*cumul)
        })
        .map(|cumul| (cumul as f32 / total as f32).sqrt())
        .collect()
}

/// An immutable, validated description of how to extract one named descriptor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DescriptorScheme {
    name: String,
    sectors: Vec<usize>,
    rings: Vec<f32>,
    /// First sector index of every ring.
    offsets: Vec<usize>,
    n_bin: usize,
    relative_orientation: bool,
    extract_modes: bool,
    normalize: bool,
    distance: Distance,
    kind: DescriptorType,
    colorspace: Colorspace,
    channels: Vec<usize>,
}

impl DescriptorScheme {
    pub fn new(name: &str, options: SchemeOptions) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::MissingSchemeName);
        }
        let (sectors, rings) = match (options.sectors, options.rings) {
            (None, None) => (DEFAULT_SECTORS.to_vec(), DEFAULT_RINGS.to_vec()),
            (Some(sectors), None) => {
                let rings = equal_area_rings(&sectors);
                (sectors, rings)
            }
            (None, Some(rings)) => (DEFAULT_SECTORS.to_vec(), rings),
            (Some(sectors), Some(rings)) => (sectors, rings),
        };
        if sectors.is_empty() || sectors.contains(&0) {
            return Err(Error::InvalidSectors(sectors));
        }
        let increasing = rings.windows(2).all(|w| w[0] < w[1]);
        if rings.len() != sectors.len()
            || !increasing
            || rings[0] <= 0.0
            || rings.last() != Some(&1.0)
        {
            return Err(Error::InvalidRings { sectors, rings });
        }
        if options.n_bin == 0 {
            return Err(Error::InvalidBins(options.n_bin));
        }
        let expected = options.kind.n_channels();
        if options.channels.len() != expected || options.channels.iter().any(|&c| c > 2) {
            return Err(Error::InvalidChannels {
                channels: options.channels,
                expected,
            });
        }
        let offsets = sectors
            .iter()
            .scan(0, |offset, &s| {
                let first = *offset;
                *offset += s;
                Some(first)
            })
            .collect();
        Ok(Self {
            name: name.to_owned(),
            sectors,
            rings,
            offsets,
            n_bin: options.n_bin,
            relative_orientation: options.relative_orientation,
            extract_modes: options.extract_modes,
            normalize: options.normalize,
            distance: options.distance,
            kind: options.kind,
            colorspace: options.colorspace,
            channels: options.channels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sectors(&self) -> &[usize] {
        &self.sectors
    }

    pub fn rings(&self) -> &[f32] {
        &self.rings
    }

    pub fn n_sector(&self) -> usize {
        self.sectors.iter().sum()
    }

    pub fn n_bin(&self) -> usize {
        self.n_bin
    }

    pub fn relative_orientation(&self) -> bool {
        self.relative_orientation
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn kind(&self) -> DescriptorType {
        self.kind
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    /// Sector holding the point `(x, y)`, given relative to the patch centre.
    ///
    /// The ring is the first one whose outer radius reaches the point; the
    /// sector within it is the nearest angular slot, measured from the
    /// keypoint orientation (turns) when the scheme is relative.
    pub fn get_histogram_number(
        &self,
        x: f32,
        y: f32,
        orientation: f32,
        r_max: f32,
    ) -> Result<usize> {
        let radius = x.hypot(y);
        if radius > r_max {
            return Err(Error::OutsideRings { radius, r_max });
        }
        let ring = self
            .rings
            .iter()
            .position(|&r| r * r_max >= radius)
            .unwrap_or(self.rings.len() - 1);
        let mut phase = phase_turns(x, y);
        if self.relative_orientation {
            phase -= orientation;
        }
        let sectors = self.sectors[ring];
        let sector = (phase.rem_euclid(1.0) * sectors as f32).round() as usize % sectors;
        Ok(self.offsets[ring] + sector)
    }

    /// Colour-normalise, convert and select the channels this scheme reads.
    pub fn get_patch(&self, patch: &RgbPatch) -> PatchView {
        let planes = if self.normalize {
            let mut normalized = patch.clone();
            normalized.normalize();
            normalized.convert(self.colorspace)
        } else {
            patch.convert(self.colorspace)
        };
        match self.kind {
            DescriptorType::Gradient => PatchView::gradient_of(&planes[self.channels[0]]),
            DescriptorType::WeightedHistograms => {
                PatchView::weighted_of(&planes[self.channels[0]], &planes[self.channels[1]])
            }
        }
    }

    /// Extract and finalize the descriptor of a view. `orientation` is in turns.
    pub fn extract(&self, orientation: f32, view: &PatchView) -> Result<DescriptorData> {
        let mut data = DescriptorData::new(self.n_sector(), self.n_bin);
        self.extract_into(orientation, view, &mut data)?;
        Ok(data)
    }

    /// Like [`DescriptorScheme::extract`], writing into caller storage.
    pub fn extract_into(
        &self,
        orientation: f32,
        view: &PatchView,
        data: &mut DescriptorData,
    ) -> Result<()> {
        data.reset(self.n_sector(), self.n_bin);
        self.extract_weighted_histograms(orientation, view, data)?;
        self.finalize(data);
        Ok(())
    }

    /// Accumulate every pixel of the view's disk into its sector histogram.
    pub fn extract_weighted_histograms(
        &self,
        orientation: f32,
        view: &PatchView,
        data: &mut DescriptorData,
    ) -> Result<()> {
        if data.n_sector() != self.n_sector() || data.n_bin() != self.n_bin {
            return Err(Error::ShapeMismatch {
                expected: vec![self.n_sector(), self.n_bin],
                found: vec![data.n_sector(), data.n_bin()],
            });
        }
        let radius = view.radius()?;
        let r_max = radius as f32;
        let r2 = (radius * radius) as isize;
        let offset = if self.relative_orientation {
            orientation
        } else {
            0.0
        };
        let (phase, weight) = view.phase_and_weight();
        for ((row, col), &w) in weight.indexed_iter() {
            let dy = row as isize - radius as isize;
            let dx = col as isize - radius as isize;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let sector = self.get_histogram_number(dx as f32, dy as f32, orientation, r_max)?;
            let bin = circular_bin(phase[[row, col]] - offset, self.n_bin);
            data.accumulate(sector, bin, w);
        }
        Ok(())
    }

    /// Normalise the histograms and derive what the distance needs.
    pub fn finalize(&self, data: &mut DescriptorData) {
        data.normalize_histograms();
        if self.extract_modes || self.distance == Distance::D2m {
            data.extract_modes();
            data.normalize_modes();
            if self.distance == Distance::D2m {
                data.process_modes();
            }
        }
        if self.distance == Distance::Cemd {
            data.cumul_histograms();
        }
    }

    /// Sector-by-candidate table of distances between `request` and every
    /// candidate.
    pub fn compute_distances(
        &self,
        request: &DescriptorData,
        candidates: &[&DescriptorData],
    ) -> Result<Array2<f32>> {
        let shape = (self.n_sector(), self.n_bin);
        for data in std::iter::once(&request).chain(candidates) {
            if (data.n_sector(), data.n_bin()) != shape {
                return Err(Error::ShapeMismatch {
                    expected: vec![shape.0, shape.1],
                    found: vec![data.n_sector(), data.n_bin()],
                });
            }
        }
        let mut table = Array2::zeros((shape.0, candidates.len()));
        match self.distance {
            Distance::L1 | Distance::L2 => {
                let f = if self.distance == Distance::L1 {
                    distance::l1
                } else {
                    distance::l2
                };
                for (j, candidate) in candidates.iter().enumerate() {
                    for sector in 0..shape.0 {
                        table[[sector, j]] =
                            f(request.histogram(sector), candidate.histogram(sector));
                    }
                }
            }
            Distance::Cemd => {
                let cumulated = request.cumulative();
                for (j, candidate) in candidates.iter().enumerate() {
                    let other = candidate.cumulative();
                    for sector in 0..shape.0 {
                        table[[sector, j]] =
                            distance::cemd(cumulated.row(sector), other.row(sector));
                    }
                }
            }
            Distance::D2m => {
                let modes = request.modes.as_ref().ok_or(Error::MissingModes)?;
                for (j, candidate) in candidates.iter().enumerate() {
                    let other = candidate.modes.as_ref().ok_or(Error::MissingModes)?;
                    for sector in 0..shape.0 {
                        table[[sector, j]] = distance::d2m(&modes[sector], &other[sector]);
                    }
                }
            }
        }
        Ok(table)
    }
}

impl Default for DescriptorScheme {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            sectors: DEFAULT_SECTORS.to_vec(),
            rings: DEFAULT_RINGS.to_vec(),
            offsets: vec![0, 1, 5],
            n_bin: 12,
            relative_orientation: true,
            extract_modes: false,
            normalize: false,
            distance: Distance::L1,
            kind: DescriptorType::Gradient,
            colorspace: Colorspace::Ohta,
            channels: vec![0],
        }
    }
}
