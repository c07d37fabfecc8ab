use crate::padding::PaddedSequences;
use crate::point_sequence::*;
use candle_util::candle_core::{Device, Tensor};
use candle_util::candle_data_loader::{SequenceTensor, SequencesToTensorVec};

impl PaddedSequences {
    /// points (n x max_len x 2) and mask (n x max_len)
    pub fn to_tensors(&self, device: &Device) -> anyhow::Result<(Tensor, Tensor)> {
        let n = self.num_sequences();
        let points = Tensor::from_slice(&self.points, (n, self.max_len, 2), device)?;
        let mask = Tensor::from_slice(&self.mask, (n, self.max_len), device)?;
        Ok((points, mask))
    }
}

impl SequencesToTensorVec for PaddedSequences {
    fn sequences_to_tensor_vec(&self) -> anyhow::Result<Vec<SequenceTensor>> {
        let l = self.max_len;
        (0..self.num_sequences())
            .map(|i| {
                let points = &self.points[(i * l * 2)..((i + 1) * l * 2)];
                let mask = &self.mask[(i * l)..((i + 1) * l)];
                Ok(SequenceTensor {
                    points: Tensor::from_slice(points, (1, l, 2), &Device::Cpu)?,
                    mask: Tensor::from_slice(mask, (1, l), &Device::Cpu)?,
                })
            })
            .collect()
    }
}

///
/// Turn decoded sequences (n x l x 2) back into point sequences
///
/// * `x_nlc` - decoder output
/// * `names` - one name per row
///
pub fn sequences_from_tensor(x_nlc: &Tensor, names: &[Box<str>]) -> anyhow::Result<Vec<PointSequence>> {
    let rows = x_nlc.to_device(&Device::Cpu)?.to_vec3::<f32>()?;
    if rows.len() != names.len() {
        return Err(anyhow::anyhow!(
            "{} sequences vs. {} names",
            rows.len(),
            names.len()
        ));
    }

    rows.into_iter()
        .zip(names.iter())
        .map(|(row, name)| {
            let points = row
                .into_iter()
                .map(|xy| match xy.as_slice() {
                    [x, y] => Ok(Point::new(*x, *y)),
                    _ => Err(anyhow::anyhow!("expected 2 coordinates, got {}", xy.len())),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(PointSequence::new(name, points))
        })
        .collect()
}
