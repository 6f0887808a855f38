use crate::descriptor::{DescriptorData, DescriptorScheme};
use crate::keypoint::{Keypoint, KeypointPosition};
use crate::{Error, Result};
use derive_more::Constructor;
use float_ord::FloatOrd;
use log::*;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Resolution of the empirical distance distributions of the a-contrario criteria.
const BACKGROUND_BINS: usize = 100;
/// Largest false-alarm score of a match accepted by [`Criterion::Ac`].
pub const AC_SIGNIFICANCE: f64 = 1.0;

/// How the distances to all candidates are reduced to matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Criterion {
    /// Nearest neighbour, scored by its summed distance.
    NnDt,
    /// Nearest neighbour, scored by the ratio of the nearest to the second
    /// nearest summed distance.
    NnDr,
    /// Nearest neighbour, scored by its expected number of false alarms.
    NnAc,
    /// Every candidate whose expected number of false alarms is below
    /// [`AC_SIGNIFICANCE`].
    Ac,
}

impl Criterion {
    /// Whether match distances are false-alarm scores.
    pub fn is_probabilistic(self) -> bool {
        matches!(self, Criterion::NnAc | Criterion::Ac)
    }
}

impl FromStr for Criterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NN-DT" => Ok(Criterion::NnDt),
            "NN-DR" => Ok(Criterion::NnDr),
            "NN-AC" => Ok(Criterion::NnAc),
            "AC" => Ok(Criterion::Ac),
            _ => Err(Error::UnknownCriterion(s.to_owned())),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Criterion::NnDt => "NN-DT",
            Criterion::NnDr => "NN-DR",
            Criterion::NnAc => "NN-AC",
            Criterion::Ac => "AC",
        })
    }
}

/// A correspondence between a query keypoint and a candidate keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    /// Index of the query keypoint in its list.
    pub query_index: usize,
    pub query: KeypointPosition,
    /// Index of the candidate keypoint in its list.
    pub candidate_index: usize,
    pub candidate: KeypointPosition,
    /// Ranking value; lower is better. Its meaning depends on `criterion`.
    pub distance: f64,
    /// Sum of all sector distances to the candidate.
    pub total_distance: f64,
    pub criterion: Criterion,
}

impl fmt::Display for Match {
    /// `qx qy qsigma cx cy csigma distance`, followed by the summed distance
    /// when the distance is a ratio or a score.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.query.x,
            self.query.y,
            self.query.sigma,
            self.candidate.x,
            self.candidate.y,
            self.candidate.sigma,
            self.distance
        )?;
        if self.criterion != Criterion::NnDt {
            write!(f, " {}", self.total_distance)?;
        }
        Ok(())
    }
}

/// Expected number of false alarms of every candidate.
///
/// Each row of `distances` holds one sector's distances to all candidates and
/// gives an empirical distribution of that sector's distance. Sectors are
/// taken as independent, so the probability of a candidate being at least as
/// close by chance is the product of the per-row cumulative frequencies, and
/// its score is that product times the number of candidates.
///
/// A single distribution of summed distances would not do: the nearest
/// candidate has a cumulative frequency of at least `1 / N`, so its score
/// could never drop below one.
pub fn false_alarm_scores(distances: ArrayView2<f32>) -> Vec<f64> {
    let n_candidates = distances.ncols();
    if n_candidates == 0 {
        return vec![];
    }
    let mut log_scores = vec![(n_candidates as f64).ln(); n_candidates];
    for row in distances.axis_iter(Axis(0)) {
        let max = row.iter().copied().fold(0f32, f32::max);
        if max <= 0.0 {
            continue;
        }
        let bin = |d: f32| {
            ((d / max * BACKGROUND_BINS as f32) as usize).min(BACKGROUND_BINS - 1)
        };
        let mut cumulative = [0usize; BACKGROUND_BINS];
        for &d in row {
            cumulative[bin(d)] += 1;
        }
        for b in 1..BACKGROUND_BINS {
            cumulative[b] += cumulative[b - 1];
        }
        for (score, &d) in log_scores.iter_mut().zip(row) {
            let frequency = cumulative[bin(d)] as f64 / n_candidates as f64;
            *score += frequency.ln();
        }
    }
    log_scores.into_iter().map(f64::exp).collect()
}

/// Index of the smallest total, the first one on ties, and its ratio to the
/// second smallest total.
///
/// The ratio is 0 with a single candidate and 1 when the two smallest totals
/// are both zero. `None` without candidates.
pub fn distance_ratio(totals: &[f64]) -> Option<(usize, f64)> {
    let best = (0..totals.len()).min_by_key(|&j| (FloatOrd(totals[j]), j))?;
    let second = totals
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != best)
        .map(|(_, &d)| d)
        .min_by_key(|&d| FloatOrd(d));
    let ratio = match second {
        None => 0.0,
        Some(second) if second > 0.0 => totals[best] / second,
        Some(_) => 1.0,
    };
    Some((best, ratio))
}

impl Keypoint {
    /// Sector distances from this keypoint to every candidate, one row per
    /// sector of every named descriptor.
    pub fn distance_rows(
        &self,
        candidates: &[Keypoint],
        schemes: &[DescriptorScheme],
        names: &[&str],
    ) -> Result<Array2<f32>> {
        let mut tables = Vec::with_capacity(names.len());
        for &name in names {
            let scheme = schemes
                .iter()
                .find(|scheme| scheme.name() == name)
                .ok_or_else(|| Error::UnknownDescriptor(name.to_owned()))?;
            let request = self
                .descriptors
                .get(name)
                .ok_or_else(|| Error::UnknownDescriptor(name.to_owned()))?;
            let others = candidates
                .iter()
                .map(|candidate| {
                    candidate
                        .descriptors
                        .get(name)
                        .ok_or_else(|| Error::UnknownDescriptor(name.to_owned()))
                })
                .collect::<Result<Vec<&DescriptorData>>>()?;
            tables.push(scheme.compute_distances(request, &others)?);
        }
        if tables.is_empty() {
            return Ok(Array2::zeros((0, candidates.len())));
        }
        let views: Vec<ArrayView2<f32>> = tables.iter().map(|t| t.view()).collect();
        concatenate(Axis(0), &views).map_err(|_| Error::ShapeMismatch {
            expected: vec![candidates.len()],
            found: tables.iter().map(|t| t.ncols()).collect(),
        })
    }

    /// Match this keypoint against `candidates` using the descriptors `names`.
    ///
    /// Nearest-neighbour criteria yield at most one match, [`Criterion::Ac`]
    /// yields every significant candidate.
    pub fn match_candidates(
        &self,
        query_index: usize,
        candidates: &[Keypoint],
        criterion: Criterion,
        schemes: &[DescriptorScheme],
        names: &[&str],
    ) -> Result<Vec<Match>> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }
        let rows = self.distance_rows(candidates, schemes, names)?;
        let totals: Vec<f64> = rows
            .axis_iter(Axis(1))
            .map(|column| column.iter().map(|&d| f64::from(d)).sum())
            .collect();
        let (best, ratio) = distance_ratio(&totals).unwrap_or((0, 0.0));
        let make = |j: usize, distance: f64| {
            Match::new(
                query_index,
                self.position(),
                j,
                candidates[j].position(),
                distance,
                totals[j],
                criterion,
            )
        };
        let matches = match criterion {
            Criterion::NnDt => vec![make(best, totals[best])],
            Criterion::NnDr => vec![make(best, ratio)],
            Criterion::NnAc => {
                let scores = false_alarm_scores(rows.view());
                vec![make(best, scores[best])]
            }
            Criterion::Ac => false_alarm_scores(rows.view())
                .into_iter()
                .enumerate()
                .filter(|&(_, score)| score < AC_SIGNIFICANCE)
                .map(|(j, score)| make(j, score))
                .collect(),
        };
        trace!(
            "Keypoint {} has {} {} matches.",
            query_index,
            matches.len(),
            criterion
        );
        Ok(matches)
    }
}
