use crate::point_sequence::*;
use serde::{Deserialize, Serialize};

/// p' = (p - center) / scale
///
/// Map coordinates span thousands of units; the model works on the
/// unit box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointScaler {
    pub center: Point,
    pub scale: f32,
}

impl Default for PointScaler {
    fn default() -> Self {
        Self {
            center: Point::default(),
            scale: 1.,
        }
    }
}

impl PointScaler {
    /// center = mean of all points, scale = largest |coordinate - center|
    pub fn fit(seqs: &[PointSequence]) -> anyhow::Result<Self> {
        let n_points: usize = seqs.iter().map(|s| s.len()).sum();
        if n_points == 0 {
            return Err(anyhow::anyhow!("cannot fit a scaler without points"));
        }

        let (sx, sy) = seqs
            .iter()
            .flat_map(|s| s.points.iter())
            .fold((0_f64, 0_f64), |(sx, sy), p| {
                (sx + p.x as f64, sy + p.y as f64)
            });
        let center = Point::new((sx / n_points as f64) as f32, (sy / n_points as f64) as f32);

        let max_abs = seqs
            .iter()
            .flat_map(|s| s.points.iter())
            .map(|p| (p.x - center.x).abs().max((p.y - center.y).abs()))
            .fold(0_f32, f32::max);

        let scale = if max_abs > 0. && max_abs.is_finite() {
            max_abs
        } else {
            1.
        };

        Ok(Self { center, scale })
    }

    pub fn transform_point(&self, p: &Point) -> Point {
        Point::new((p.x - self.center.x) / self.scale, (p.y - self.center.y) / self.scale)
    }

    pub fn inverse_point(&self, p: &Point) -> Point {
        Point::new(p.x * self.scale + self.center.x, p.y * self.scale + self.center.y)
    }

    pub fn transform(&self, seq: &PointSequence) -> PointSequence {
        PointSequence {
            name: seq.name.clone(),
            points: seq.points.iter().map(|p| self.transform_point(p)).collect(),
        }
    }

    pub fn inverse(&self, seq: &PointSequence) -> PointSequence {
        PointSequence {
            name: seq.name.clone(),
            points: seq.points.iter().map(|p| self.inverse_point(p)).collect(),
        }
    }
}
