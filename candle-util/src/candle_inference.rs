use rand::rngs::StdRng;
use rand::SeedableRng;

pub const DEFAULT_LEARNING_RATE: f32 = 1e-4;

pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    /// KL weight = 1 - exp(-epoch / warmup); 0 disables annealing
    pub kl_warmup_epochs: f64,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
    /// seeds latent noise and minibatch order; dropout masks still come
    /// from the device generator
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: 32,
            num_epochs: 100,
            kl_warmup_epochs: 0.,
            device: candle_core::Device::Cpu,
            verbose: false,
            show_progress: true,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// A generator for the stochastic steps of training
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    pub fn kl_weight(&self, epoch: usize) -> f64 {
        if self.kl_warmup_epochs > 0. {
            1. - (-(epoch as f64) / self.kl_warmup_epochs).exp()
        } else {
            1.
        }
    }
}

/// per-epoch averages over minibatches
#[derive(Default, Debug, Clone)]
pub struct TrainScores {
    pub total: Vec<f32>,
    pub recon: Vec<f32>,
    pub kl: Vec<f32>,
}

impl TrainScores {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            total: Vec::with_capacity(n),
            recon: Vec::with_capacity(n),
            kl: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.total.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    /// tab-separated lines: epoch, total, recon, kl
    pub fn to_lines(&self) -> Vec<Box<str>> {
        std::iter::once("epoch\tloss\treconstruction\tkl_divergence".into())
            .chain((0..self.len()).map(|e| {
                format!(
                    "{}\t{}\t{}\t{}",
                    e + 1,
                    self.total[e],
                    self.recon[e],
                    self.kl[e]
                )
                .into_boxed_str()
            }))
            .collect()
    }
}
