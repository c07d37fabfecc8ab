use crate::point_sequence::*;
use log::warn;
use serde::{Deserialize, Serialize};

/// How sequences are fitted to the model's fixed number of positions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthPolicy {
    /// interpolate every sequence to exactly `max_len` points
    Resample,
    /// pad shorter sequences and mask the padding; skip longer ones
    Pad,
}

///
/// Resample `points` to `n_out` points by linear interpolation along
/// the point index. The first and last points are kept.
///
pub fn resample_points(points: &[Point], n_out: usize) -> Vec<Point> {
    match (points.len(), n_out) {
        (_, 0) | (0, _) => vec![],
        (1, _) => vec![points[0]; n_out],
        (_, 1) => vec![points[0]],
        (n_in, _) => {
            let step = (n_in - 1) as f32 / (n_out - 1) as f32;
            (0..n_out)
                .map(|j| {
                    let t = j as f32 * step;
                    let lb = (t.floor() as usize).min(n_in - 1);
                    let ub = (lb + 1).min(n_in - 1);
                    points[lb].lerp(&points[ub], t - lb as f32)
                })
                .collect()
        }
    }
}

/// Fixed-length view of sequences: `points` is (n x max_len x 2) and
/// `mask` is (n x max_len), both row-major
#[derive(Clone, Debug)]
pub struct PaddedSequences {
    pub names: Vec<Box<str>>,
    pub lengths: Vec<usize>,
    pub max_len: usize,
    pub points: Vec<f32>,
    pub mask: Vec<f32>,
}

impl PaddedSequences {
    pub fn num_sequences(&self) -> usize {
        self.names.len()
    }

    ///
    /// Fit sequences to `max_len` positions
    ///
    /// * `seqs` - input sequences
    /// * `max_len` - number of positions
    /// * `policy` - what to do with lengths other than `max_len`
    ///
    /// Empty sequences, and sequences longer than `max_len` under
    /// `LengthPolicy::Pad`, are skipped with a warning.
    pub fn from_sequences(
        seqs: &[PointSequence],
        max_len: usize,
        policy: LengthPolicy,
    ) -> anyhow::Result<Self> {
        if max_len == 0 {
            return Err(anyhow::anyhow!("max_len must be positive"));
        }

        let mut ret = PaddedSequences {
            names: vec![],
            lengths: vec![],
            max_len,
            points: vec![],
            mask: vec![],
        };

        for seq in seqs {
            if seq.is_empty() {
                warn!("{}: empty sequence, skipped", seq.name);
                continue;
            }

            let fitted = match policy {
                LengthPolicy::Resample => resample_points(&seq.points, max_len),
                LengthPolicy::Pad if seq.len() > max_len => {
                    warn!(
                        "{}: {} points > max_len {}, skipped",
                        seq.name,
                        seq.len(),
                        max_len
                    );
                    continue;
                }
                LengthPolicy::Pad => seq.points.clone(),
            };

            let n_valid = fitted.len();
            for p in fitted.iter() {
                ret.points.push(p.x);
                ret.points.push(p.y);
            }
            ret.points.resize(ret.points.len() + 2 * (max_len - n_valid), 0.);
            ret.mask.resize(ret.mask.len() + n_valid, 1.);
            ret.mask.resize(ret.mask.len() + max_len - n_valid, 0.);
            ret.names.push(seq.name.clone());
            ret.lengths.push(n_valid);
        }

        if ret.names.is_empty() {
            return Err(anyhow::anyhow!("no usable sequences"));
        }
        Ok(ret)
    }
}
