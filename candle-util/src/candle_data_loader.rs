use candle_core::{Device, Tensor};
use rand::prelude::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

pub struct MinibatchData {
    /// padded point sequences (n x l x 2)
    pub input: Tensor,
    /// 1 for valid positions, 0 for padding (n x l)
    pub mask: Tensor,
    /// original sample indexes of the rows
    pub samples: Vec<usize>,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData>;

    fn num_minibatch(&self) -> usize;

    /// shuffle samples with `rng` and partition them into chunks
    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()>;

    /// partition samples into consecutive chunks without shuffling
    fn order_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;

    fn num_samples(&self) -> usize;
}

/// One padded sequence: points (1 x l x 2) and mask (1 x l)
#[derive(Clone, Debug)]
pub struct SequenceTensor {
    pub points: Tensor,
    pub mask: Tensor,
}

///
/// Convert sequences to a vector of `SequenceTensor`
///
pub trait SequencesToTensorVec {
    fn sequences_to_tensor_vec(&self) -> anyhow::Result<Vec<SequenceTensor>>;
}

/// a batch of points (n x l x 2) with its mask (n x l)
impl SequencesToTensorVec for (Tensor, Tensor) {
    fn sequences_to_tensor_vec(&self) -> anyhow::Result<Vec<SequenceTensor>> {
        let (points, mask) = self;
        let (n, l, _) = points.dims3()?;
        let (n_mask, l_mask) = mask.dims2()?;
        if n != n_mask || l != l_mask {
            return Err(anyhow::anyhow!(
                "points {:?} vs. mask {:?}",
                points.dims(),
                mask.dims()
            ));
        }
        (0..n)
            .map(|i| {
                Ok(SequenceTensor {
                    points: points.narrow(0, i, 1)?,
                    mask: mask.narrow(0, i, 1)?,
                })
            })
            .collect()
    }
}

///
/// A simple data loader for in-memory padded sequences. All
/// sequences share the same number of positions.
///
pub struct InMemoryData {
    data: Vec<SequenceTensor>,
    shuffled_data: Option<Vec<SequenceTensor>>,
    minibatches: Minibatches,
}

impl InMemoryData {
    ///
    /// Create a data loader with the main data `data`
    ///
    pub fn new<D>(data: &D) -> anyhow::Result<Self>
    where
        D: SequencesToTensorVec,
    {
        let data = data.sequences_to_tensor_vec()?;

        if data.is_empty() {
            return Err(anyhow::anyhow!("no sequences to load"));
        }

        let len = data[0].points.dims3()?.1;
        for x in data.iter() {
            if x.points.dims3()?.1 != len {
                return Err(anyhow::anyhow!(
                    "sequences must share the same length: {} vs. {}",
                    x.points.dims3()?.1,
                    len
                ));
            }
        }

        let samples = (0..data.len()).collect();

        Ok(InMemoryData {
            data,
            shuffled_data: None,
            minibatches: Minibatches {
                samples,
                chunks: vec![],
            },
        })
    }

    fn preload_chunks(&mut self) -> anyhow::Result<()> {
        let data = &self.data;
        let preloaded = self
            .minibatches
            .chunks
            .par_iter()
            .map(|samples| -> anyhow::Result<SequenceTensor> {
                let points: Vec<&Tensor> = samples.iter().map(|&i| &data[i].points).collect();
                let mask: Vec<&Tensor> = samples.iter().map(|&i| &data[i].mask).collect();
                Ok(SequenceTensor {
                    points: Tensor::cat(&points, 0)?,
                    mask: Tensor::cat(&mask, 0)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        self.shuffled_data = Some(preloaded);
        Ok(())
    }
}

impl DataLoader for InMemoryData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData> {
        let shuffled = self
            .shuffled_data
            .as_ref()
            .ok_or(anyhow::anyhow!("need to shuffle data"))?;

        match (shuffled.get(batch_idx), self.minibatches.chunks.get(batch_idx)) {
            (Some(x), Some(samples)) => Ok(MinibatchData {
                input: x.points.to_device(target_device)?,
                mask: x.mask.to_device(target_device)?,
                samples: samples.clone(),
            }),
            _ => Err(anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            )),
        }
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        self.minibatches.shuffle_minibatch(batch_size, rng)?;
        self.preload_chunks()
    }

    fn order_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.order_minibatch(batch_size)?;
        self.preload_chunks()
    }

    fn num_samples(&self) -> usize {
        self.data.len()
    }
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn new(size: usize) -> Self {
        Self {
            samples: (0..size).collect(),
            chunks: vec![],
        }
    }

    pub fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        self.samples.shuffle(rng);
        self.partition(batch_size)
    }

    pub fn order_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.samples.sort_unstable();
        self.partition(batch_size)
    }

    fn partition(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}
