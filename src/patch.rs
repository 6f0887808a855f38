use crate::colorspace::Colorspace;
use crate::derivatives::{interior_gradient, polar};
use crate::{Error, Result};
use ndarray::{azip, s, Array2};

/// A square RGB neighbourhood of a keypoint.
///
/// The planes are `2 * (radius + 1) + 1` pixels wide: the support disk of
/// radius `radius` plus a one pixel margin so central differences are defined
/// over the whole disk.
#[derive(Debug, Clone)]
pub struct RgbPatch {
    planes: [Array2<f32>; 3],
}

impl RgbPatch {
    pub fn new(planes: [Array2<f32>; 3]) -> Result<Self> {
        let dim = planes[0].dim();
        if dim.0 != dim.1 || dim.0 < 3 || dim.0 % 2 == 0 {
            return Err(Error::ShapeMismatch {
                expected: vec![2 * (dim.0 / 2) + 1; 2],
                found: vec![dim.0, dim.1],
            });
        }
        for plane in &planes[1..] {
            if plane.dim() != dim {
                return Err(Error::ShapeMismatch {
                    expected: vec![dim.0, dim.1],
                    found: vec![plane.dim().0, plane.dim().1],
                });
            }
        }
        Ok(Self { planes })
    }

    /// Radius of the support disk, excluding the margin.
    pub fn radius(&self) -> usize {
        self.planes[0].nrows() / 2 - 1
    }

    pub fn plane(&self, channel: usize) -> &Array2<f32> {
        &self.planes[channel]
    }

    /// Grey-world normalisation: rescale each channel so its mean equals the
    /// mean over all three channels. Channels with zero mean are left as is.
    pub fn normalize(&mut self) {
        let means = [
            self.planes[0].mean().unwrap_or(0.0),
            self.planes[1].mean().unwrap_or(0.0),
            self.planes[2].mean().unwrap_or(0.0),
        ];
        let grey = means.iter().sum::<f32>() / 3.0;
        for (plane, &mean) in self.planes.iter_mut().zip(means.iter()) {
            if mean > 0.0 {
                plane.mapv_inplace(|v| v * grey / mean);
            }
        }
    }

    /// Convert every pixel of the patch (margin included) to `colorspace`.
    pub fn convert(&self, colorspace: Colorspace) -> [Array2<f32>; 3] {
        let dim = self.planes[0].dim();
        let mut out = [Array2::zeros(dim), Array2::zeros(dim), Array2::zeros(dim)];
        let [c0, c1, c2] = &mut out;
        azip!((
            a in c0,
            b in c1,
            c in c2,
            &r in &self.planes[0],
            &g in &self.planes[1],
            &bl in &self.planes[2],
        ) {
            let [x, y, z] = colorspace.convert([r, g, bl]);
            *a = x;
            *b = y;
            *c = z;
        });
        out
    }

    pub fn gray(&self) -> Array2<f32> {
        let mut gray = Array2::zeros(self.planes[0].dim());
        azip!((
            out in &mut gray,
            &r in &self.planes[0],
            &g in &self.planes[1],
            &b in &self.planes[2],
        ) {
            *out = 0.299 * r + 0.587 * g + 0.114 * b;
        });
        gray
    }
}

/// The per-pixel quantities a histogram descriptor accumulates over a disk.
///
/// Both arrays of a variant share the same odd square shape; the disk is
/// centred in it. Phases are in turns.
#[derive(Debug, Clone)]
pub enum PatchView {
    /// Gradient direction weighted by gradient magnitude.
    Gradient {
        phase: Array2<f32>,
        norm: Array2<f32>,
    },
    /// One channel supplies the weight, another the (circular) value.
    WeightedChannel {
        weight: Array2<f32>,
        phase: Array2<f32>,
    },
}

impl PatchView {
    /// Gradient view of the disk part of a plane cropped with a one pixel margin.
    pub fn gradient_of(samples: &Array2<f32>) -> Self {
        let (gx, gy) = interior_gradient(samples.view());
        let (norm, phase) = polar(gx.view(), gy.view());
        PatchView::Gradient { phase, norm }
    }

    /// Weighted view of the disk part of two planes cropped with a one pixel margin.
    pub fn weighted_of(weight: &Array2<f32>, phase: &Array2<f32>) -> Self {
        PatchView::WeightedChannel {
            weight: weight.slice(s![1..-1, 1..-1]).to_owned(),
            phase: phase.slice(s![1..-1, 1..-1]).to_owned(),
        }
    }

    /// `(phase, weight)` arrays, whatever the variant.
    pub fn phase_and_weight(&self) -> (&Array2<f32>, &Array2<f32>) {
        match self {
            PatchView::Gradient { phase, norm } => (phase, norm),
            PatchView::WeightedChannel { weight, phase } => (phase, weight),
        }
    }

    /// Radius of the disk the view covers.
    pub fn radius(&self) -> Result<usize> {
        let (phase, weight) = self.phase_and_weight();
        let dim = phase.dim();
        if weight.dim() != dim || dim.0 != dim.1 || dim.0 % 2 == 0 {
            return Err(Error::ShapeMismatch {
                expected: vec![dim.0, dim.0],
                found: vec![weight.dim().0, weight.dim().1],
            });
        }
        Ok(dim.0 / 2)
    }
}
