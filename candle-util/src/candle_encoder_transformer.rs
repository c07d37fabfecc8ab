use crate::candle_latent_gaussian::LatentGaussian;
use crate::candle_model_traits::*;
use crate::candle_transformer::*;
use candle_core::{Result, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};

pub const POINT_DIM: usize = 2;

pub struct TransformerEncoder {
    max_len: usize,
    n_latent: usize,
    d_model: usize,
    input_proj: Linear,
    pos_emb: Embedding,
    stack: TransformerStack,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl SequenceEncoderT for TransformerEncoder {
    ///
    /// Evaluate latent Gaussian parameters: mu and log_var
    /// z ~ (mu(x), log_var(x))
    fn latent_gaussian_params(
        &self,
        x_nlc: &Tensor,
        mask_nl: Option<&Tensor>,
        train: bool,
    ) -> Result<LatentGaussian> {
        let min_mean = -(self.d_model as f64).sqrt(); // stabilize
        let max_mean = (self.d_model as f64).sqrt(); // mean
        let min_lv = -8.; // and log variance
        let max_lv = 8.; //

        let (_, l, c) = x_nlc.dims3()?;
        if c != POINT_DIM || l > self.max_len {
            candle_core::bail!(
                "encoder expects (n, <= {}, {}), got {:?}",
                self.max_len,
                POINT_DIM,
                x_nlc.dims()
            );
        }

        let h_nld = add_positional(&self.input_proj.forward(x_nlc)?, &self.pos_emb)?;
        let h_nld = self.stack.forward_t(&h_nld, mask_nl, train)?;
        let h_nd = masked_mean_pool(&h_nld, mask_nl)?;

        let z_mean_nk = self.z_mean.forward(&h_nd)?.clamp(min_mean, max_mean)?;
        let z_lnvar_nk = self.z_lnvar.forward(&h_nd)?.clamp(min_lv, max_lv)?;
        LatentGaussian::new(z_mean_nk, z_lnvar_nk)
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl TransformerEncoder {
    /// Will create a new encoder module with these variables:
    ///
    /// * `nn.enc.input.{weight,bias}` point projection
    /// * `nn.enc.pos` positional embedding
    /// * `nn.enc.tf.block.{}.*` where {} is the layer index
    /// * `nn.enc.z.mean.weight`
    /// * `nn.enc.z.lnvar.weight`
    ///
    /// # Arguments
    /// * `max_len` - the number of positions per sequence
    /// * `n_latent` - latent dimension
    /// * `args` - transformer hyperparameters
    /// * `vs` - variable builder
    pub fn new(
        max_len: usize,
        n_latent: usize,
        args: &TransformerArgs,
        vs: VarBuilder,
    ) -> Result<Self> {
        if max_len == 0 || n_latent == 0 {
            candle_core::bail!("encoder needs max_len > 0 and n_latent > 0");
        }

        let input_proj = candle_nn::linear(POINT_DIM, args.d_model, vs.pp("nn.enc.input"))?;
        let pos_emb = candle_nn::embedding(max_len, args.d_model, vs.pp("nn.enc.pos"))?;
        let stack = TransformerStack::new(args, vs.pp("nn.enc.tf"))?;

        let z_mean = candle_nn::linear(args.d_model, n_latent, vs.pp("nn.enc.z.mean"))?;
        let z_lnvar = candle_nn::linear(args.d_model, n_latent, vs.pp("nn.enc.z.lnvar"))?;

        Ok(Self {
            max_len,
            n_latent,
            d_model: args.d_model,
            input_proj,
            pos_emb,
            stack,
            z_mean,
            z_lnvar,
        })
    }
}

/// average over valid positions: (n x l x d) -> (n x d)
pub fn masked_mean_pool(h_nld: &Tensor, mask_nl: Option<&Tensor>) -> Result<Tensor> {
    match mask_nl {
        None => h_nld.mean(1),
        Some(mask_nl) => {
            let mask_nl1 = mask_nl.unsqueeze(2)?;
            let sum_nd = h_nld.broadcast_mul(&mask_nl1)?.sum(1)?;
            let count_n1 = mask_nl1.sum(1)?.clamp(1.0, f64::INFINITY)?;
            sum_nd.broadcast_div(&count_n1)
        }
    }
}
