use crate::descriptor::distance::circular_distance;
use crate::modes::{extract_modes, Mode};
use float_ord::FloatOrd;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::borrow::Cow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of mass levels of the D2M code.
const MODE_MASS_LEVELS: f32 = 4.0;
/// Modes kept per sector by the D2M code.
const MODES_PER_SECTOR: usize = 2;

/// The numeric payload of one descriptor for one keypoint.
///
/// All sector histograms live in one `n_sector x n_bin` array; each sector is
/// a row view into it. The bookkeeping vectors are indexed by sector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DescriptorData {
    histograms: Array2<f32>,
    /// Pixels accumulated per sector.
    pub pps: Vec<usize>,
    /// Weight accumulated per sector.
    pub sum: Vec<f32>,
    /// Squared weight accumulated per sector.
    pub sum_squares: Vec<f32>,
    /// Meaningful modes per sector.
    pub modes: Option<Vec<Vec<Mode>>>,
    /// Running sums of each sector histogram.
    pub cumulated: Option<Array2<f32>>,
}

impl DescriptorData {
    pub fn new(n_sector: usize, n_bin: usize) -> Self {
        Self {
            histograms: Array2::zeros((n_sector, n_bin)),
            pps: vec![0; n_sector],
            sum: vec![0.0; n_sector],
            sum_squares: vec![0.0; n_sector],
            modes: None,
            cumulated: None,
        }
    }

    /// Clear the data for a new extraction, keeping the allocation when the
    /// shape is unchanged.
    pub fn reset(&mut self, n_sector: usize, n_bin: usize) {
        if self.histograms.dim() == (n_sector, n_bin) {
            self.histograms.fill(0.0);
        } else {
            self.histograms = Array2::zeros((n_sector, n_bin));
        }
        for v in [&mut self.sum, &mut self.sum_squares] {
            v.clear();
            v.resize(n_sector, 0.0);
        }
        self.pps.clear();
        self.pps.resize(n_sector, 0);
        self.modes = None;
        self.cumulated = None;
    }

    pub fn n_sector(&self) -> usize {
        self.histograms.nrows()
    }

    pub fn n_bin(&self) -> usize {
        self.histograms.ncols()
    }

    pub fn histograms(&self) -> ArrayView2<f32> {
        self.histograms.view()
    }

    pub fn histogram(&self, sector: usize) -> ArrayView1<f32> {
        self.histograms.row(sector)
    }

    pub fn total(&self) -> f32 {
        self.histograms.sum()
    }

    pub fn accumulate(&mut self, sector: usize, bin: usize, weight: f32) {
        self.histograms[[sector, bin]] += weight;
        self.sum[sector] += weight;
        self.sum_squares[sector] += weight * weight;
        self.pps[sector] += 1;
    }

    /// Divide every sector by its pixel count, then scale the whole
    /// descriptor to unit mass. Empty sectors and empty descriptors stay zero.
    pub fn normalize_histograms(&mut self) {
        for (mut row, &pps) in self.histograms.axis_iter_mut(Axis(0)).zip(&self.pps) {
            if pps > 0 {
                row /= pps as f32;
            }
        }
        let total = self.total();
        if total > 0.0 {
            self.histograms /= total;
        }
    }

    /// Meaningful modes of every sector histogram.
    pub fn extract_modes(&mut self) {
        let modes = self
            .histograms
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(sector, row)| {
                let pps = self.pps[sector];
                if pps == 0 {
                    return vec![];
                }
                let n = pps as f32;
                extract_modes(
                    &row.to_vec(),
                    true,
                    1,
                    n,
                    self.sum[sector] / n,
                    self.sum_squares[sector] / n,
                )
            })
            .collect();
        self.modes = Some(modes);
    }

    /// Turn each mode's share of its sector into a share of the whole descriptor.
    pub fn normalize_modes(&mut self) {
        let total = self.total();
        let masses: Vec<f32> = self.histograms.axis_iter(Axis(0)).map(|r| r.sum()).collect();
        if let Some(modes) = self.modes.as_mut() {
            for (sector_modes, &mass) in modes.iter_mut().zip(&masses) {
                let share = if total > 0.0 { mass / total } else { 0.0 };
                for mode in sector_modes.iter_mut() {
                    mode.norm *= share;
                }
            }
        }
    }

    /// Reduce the modes to the compact code compared by the D2M distance:
    /// at most two modes per sector, heaviest first, with masses quantised to
    /// quarters of the kept mass and phases snapped to bin centres.
    pub fn process_modes(&mut self) {
        let n_bin = self.n_bin().max(1) as f32;
        if let Some(modes) = self.modes.as_mut() {
            for sector_modes in modes.iter_mut() {
                sector_modes.sort_by_key(|m| std::cmp::Reverse(FloatOrd(m.norm)));
                sector_modes.truncate(MODES_PER_SECTOR);
                let kept: f32 = sector_modes.iter().map(|m| m.norm).sum();
                if kept <= 0.0 {
                    sector_modes.clear();
                    continue;
                }
                let mut remaining = 1.0;
                for (i, mode) in sector_modes.iter_mut().enumerate() {
                    let level = if i + 1 == MODES_PER_SECTOR {
                        remaining
                    } else {
                        ((mode.norm / kept * MODE_MASS_LEVELS).round() / MODE_MASS_LEVELS)
                            .clamp(1.0 / MODE_MASS_LEVELS, 1.0)
                    };
                    remaining -= level;
                    mode.norm = level;
                    mode.phase = ((mode.phase * n_bin).round() / n_bin).rem_euclid(1.0);
                    if mode.phase >= 1.0 {
                        mode.phase = 0.0;
                    }
                }
                sector_modes.retain(|m| m.norm > 0.0);
                if let [a, b] = sector_modes.as_slice() {
                    // Two modes snapped onto the same bin are one mode.
                    if circular_distance(a.phase, b.phase) == 0.0 {
                        sector_modes.truncate(1);
                        sector_modes[0].norm = 1.0;
                    }
                }
            }
        }
    }

    pub fn cumul_histograms(&mut self) {
        self.cumulated = Some(cumulate(&self.histograms));
    }

    /// Cumulative histograms, computed on the fly when not stored.
    pub fn cumulative(&self) -> Cow<'_, Array2<f32>> {
        match &self.cumulated {
            Some(cumulated) => Cow::Borrowed(cumulated),
            None => Cow::Owned(cumulate(&self.histograms)),
        }
    }
}

fn cumulate(histograms: &Array2<f32>) -> Array2<f32> {
    let mut cumulated = histograms.clone();
    cumulated.accumulate_axis_inplace(Axis(1), |&prev, cur| *cur += prev);
    cumulated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_gives_unit_mass() {
        let mut data = DescriptorData::new(3, 4);
        data.accumulate(0, 1, 2.0);
        data.accumulate(0, 1, 2.0);
        data.accumulate(0, 3, 1.0);
        data.accumulate(2, 0, 0.5);
        data.normalize_histograms();
        assert!((data.total() - 1.0).abs() < 1e-6);
        assert!(data.histograms().iter().all(|&v| v >= 0.0));
        // Sector 1 is empty and stays empty.
        assert_eq!(data.histogram(1).sum(), 0.0);
        // Per-sector averages 5/3 and 1/2 before the global rescale.
        let ratio = data.histogram(0).sum() / data.histogram(2).sum();
        assert!((ratio - (5.0 / 3.0) / 0.5).abs() < 1e-5);
    }

    #[test]
    fn normalization_of_empty_descriptor_stays_zero() {
        let mut data = DescriptorData::new(2, 5);
        data.normalize_histograms();
        assert_eq!(data.total(), 0.0);
    }

    #[test]
    fn reset_reuses_storage() {
        let mut data = DescriptorData::new(2, 3);
        data.accumulate(1, 2, 4.0);
        data.cumul_histograms();
        data.reset(2, 3);
        assert_eq!(data, DescriptorData::new(2, 3));
        data.reset(4, 3);
        assert_eq!(data.n_sector(), 4);
        assert_eq!(data.pps.len(), 4);
    }

    #[test]
    fn cumulative_histograms_are_running_sums() {
        let mut data = DescriptorData::new(1, 4);
        for (bin, w) in [1.0, 0.0, 2.0, 1.0].iter().enumerate() {
            data.accumulate(0, bin, *w);
        }
        assert!(data.cumulated.is_none());
        let on_the_fly = data.cumulative().into_owned();
        data.cumul_histograms();
        let stored = data.cumulated.clone().unwrap();
        assert_eq!(stored, on_the_fly);
        assert_eq!(stored.row(0).to_vec(), vec![1.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn mode_code_keeps_two_quantised_modes() {
        let mut data = DescriptorData::new(1, 8);
        data.modes = Some(vec![vec![
            Mode {
                phase: 0.26,
                norm: 0.2,
                bins: (2, 2),
            },
            Mode {
                phase: 0.74,
                norm: 0.55,
                bins: (6, 6),
            },
            Mode {
                phase: 0.5,
                norm: 0.05,
                bins: (4, 4),
            },
        ]]);
        data.process_modes();
        let modes = &data.modes.as_ref().unwrap()[0];
        assert_eq!(modes.len(), 2);
        assert!((modes[0].phase - 0.75).abs() < 1e-6);
        assert!((modes[0].norm - 0.75).abs() < 1e-6);
        assert!((modes[1].phase - 0.25).abs() < 1e-6);
        assert!((modes[1].norm - 0.25).abs() < 1e-6);
    }

    #[test]
    fn dominant_mode_absorbs_the_code() {
        let mut data = DescriptorData::new(1, 8);
        data.modes = Some(vec![vec![
            Mode {
                phase: 0.0,
                norm: 0.9,
                bins: (0, 0),
            },
            Mode {
                phase: 0.5,
                norm: 0.05,
                bins: (4, 4),
            },
        ]]);
        data.process_modes();
        let modes = &data.modes.as_ref().unwrap()[0];
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].norm, 1.0);
    }
}
