pub use clap::{Args, Parser, Subcommand, ValueEnum};
pub use log::{info, warn};

pub use candle_util::candle_core::{DType, Device, Tensor};
pub use candle_util::candle_data_loader::InMemoryData;
pub use candle_util::candle_decoder_transformer::TransformerDecoder;
pub use candle_util::candle_encoder_transformer::TransformerEncoder;
pub use candle_util::candle_inference::{TrainConfig, DEFAULT_LEARNING_RATE};
pub use candle_util::candle_transformer::TransformerArgs;
pub use candle_util::candle_vae_inference::{Vae, VaeT};
pub use candle_util::candle_nn;

pub use point_seq::common_io::*;
pub use point_seq::tensor_io::sequences_from_tensor;
pub use point_seq::*;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Everything needed to rebuild a trained model besides its weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub max_len: usize,
    pub n_latent: usize,
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub d_ff: usize,
    pub dropout: f32,
    pub length_policy: LengthPolicy,
    pub scaler: PointScaler,
}

impl ModelConfig {
    pub fn transformer_args(&self) -> TransformerArgs {
        TransformerArgs {
            d_model: self.d_model,
            n_heads: self.n_heads,
            n_layers: self.n_layers,
            d_ff: self.d_ff,
            dropout: self.dropout,
        }
    }

    pub fn to_json_file(&self, file: &str) -> anyhow::Result<()> {
        mkdir(file)?;
        let writer = open_buf_writer(file)?;
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn from_json_file(file: &str) -> anyhow::Result<Self> {
        let reader = open_buf_reader(file)?;
        serde_json::from_reader(reader).map_err(|e| anyhow::anyhow!("{}: {}", file, e))
    }
}

/// `{out}.config.json`
pub fn config_file(out: &str) -> String {
    out.to_string() + ".config.json"
}

/// `{out}.safetensors`
pub fn weights_file(out: &str) -> String {
    out.to_string() + ".safetensors"
}

/// Encoder and decoder sharing one variable map
pub struct MapVaeModel {
    pub config: ModelConfig,
    pub parameters: candle_nn::VarMap,
    pub encoder: TransformerEncoder,
    pub decoder: TransformerDecoder,
}

impl MapVaeModel {
    /// Freshly initialized model
    pub fn new(config: ModelConfig, dev: &Device) -> anyhow::Result<Self> {
        let parameters = candle_nn::VarMap::new();
        let param_builder = candle_nn::VarBuilder::from_varmap(&parameters, DType::F32, dev);
        let args = config.transformer_args();

        let encoder =
            TransformerEncoder::new(config.max_len, config.n_latent, &args, param_builder.clone())?;
        let decoder =
            TransformerDecoder::new(config.max_len, config.n_latent, &args, param_builder.clone())?;

        info!(
            "model: max_len {}, latent {}, d_model {}, {} layers, {} heads",
            config.max_len, config.n_latent, config.d_model, config.n_layers, config.n_heads
        );

        Ok(Self {
            config,
            parameters,
            encoder,
            decoder,
        })
    }

    /// Rebuild from `{out}.config.json` and `{out}.safetensors`
    pub fn load(out: &str, dev: &Device) -> anyhow::Result<Self> {
        let config = ModelConfig::from_json_file(&config_file(out))?;
        let mut model = Self::new(config, dev)?;
        let weights = weights_file(out);
        model
            .parameters
            .load(&weights)
            .map_err(|e| anyhow::anyhow!("{}: {}", weights, e))?;
        info!("loaded model parameters from {}", weights);
        Ok(model)
    }

    pub fn save(&self, out: &str) -> anyhow::Result<()> {
        let weights = weights_file(out);
        mkdir(&weights)?;
        self.parameters.save(&weights)?;
        self.config.to_json_file(&config_file(out))?;
        info!("saved {} and {}", weights, config_file(out));
        Ok(())
    }

    pub fn vae(&self) -> anyhow::Result<Vae<'_, TransformerEncoder, TransformerDecoder>> {
        Vae::build(&self.encoder, &self.decoder, &self.parameters)
    }

    /// Scale and fit sequences to this model's positions
    pub fn prepare_sequences(&self, seqs: &[PointSequence]) -> anyhow::Result<PaddedSequences> {
        let scaled: Vec<PointSequence> = seqs
            .iter()
            .map(|s| self.config.scaler.transform(s))
            .collect();
        PaddedSequences::from_sequences(&scaled, self.config.max_len, self.config.length_policy)
    }

    ///
    /// Decode `n` draws from the prior into map coordinates
    ///
    /// Only models trained with `LengthPolicy::Resample` can generate:
    /// under `Pad` the positions past each training sequence's length
    /// never receive a gradient, so every output position beyond the
    /// shortest input is unsupervised.
    ///
    pub fn sample_sequences<R>(&self, n: usize, rng: &mut R) -> anyhow::Result<Vec<PointSequence>>
    where
        R: Rng + ?Sized,
    {
        if self.config.length_policy == LengthPolicy::Pad {
            return Err(anyhow::anyhow!(
                "cannot generate from a model trained with the pad length policy; \
                 retrain with `--length-policy resample`"
            ));
        }
        if n == 0 {
            return Err(anyhow::anyhow!("nothing to generate"));
        }

        let dev = self.device()?;
        let x_nlc = self.vae()?.generate(n, rng, &dev)?;
        let names: Vec<Box<str>> = (0..n)
            .map(|i| format!("generated_{}", i).into_boxed_str())
            .collect();
        self.restore_sequences(&x_nlc, &names)
    }

    fn device(&self) -> anyhow::Result<Device> {
        let vars = self.parameters.all_vars();
        let var = vars
            .first()
            .ok_or_else(|| anyhow::anyhow!("model has no parameters"))?;
        Ok(var.device().clone())
    }

    /// Decoder output (n x l x 2) in original map coordinates
    pub fn restore_sequences(
        &self,
        x_nlc: &Tensor,
        names: &[Box<str>],
    ) -> anyhow::Result<Vec<PointSequence>> {
        Ok(sequences_from_tensor(x_nlc, names)?
            .iter()
            .map(|s| self.config.scaler.inverse(s))
            .collect())
    }
}

///
/// Write latent states with one row per sequence
///
/// * `z_nk` - latent means (n x k)
/// * `names` - sequence names
/// * `file` - output file
///
pub fn write_latent(z_nk: &Tensor, names: &[Box<str>], file: &str) -> anyhow::Result<()> {
    let rows = z_nk.to_device(&Device::Cpu)?.to_vec2::<f32>()?;
    if rows.len() != names.len() {
        return Err(anyhow::anyhow!(
            "{} latent rows vs. {} names",
            rows.len(),
            names.len()
        ));
    }

    let k = z_nk.dims2()?.1;
    let header = std::iter::once("name".to_string())
        .chain((0..k).map(|j| format!("z{}", j)))
        .collect::<Vec<_>>()
        .join("\t");

    let lines: Vec<Box<str>> = std::iter::once(header.into_boxed_str())
        .chain(rows.iter().zip(names.iter()).map(|(z, name)| {
            std::iter::once(name.to_string())
                .chain(z.iter().map(|v| v.to_string()))
                .collect::<Vec<_>>()
                .join("\t")
                .into_boxed_str()
        }))
        .collect();

    mkdir(file)?;
    write_lines(&lines, file)
}
