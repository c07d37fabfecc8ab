use crate::candle_encoder_transformer::POINT_DIM;
use crate::candle_model_traits::*;
use crate::candle_transformer::*;
use candle_core::{Result, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};

/// Non-autoregressive decoder: every output position attends to the
/// same projected latent plus its own positional embedding.
pub struct TransformerDecoder {
    max_len: usize,
    n_latent: usize,
    d_model: usize,
    latent_proj: Linear,
    pos_emb: Embedding,
    stack: TransformerStack,
    point_out: Linear,
}

impl SequenceDecoderT for TransformerDecoder {
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor> {
        let (n, k) = z_nk.dims2()?;
        if k != self.n_latent {
            candle_core::bail!("decoder expects {} latent dims, got {}", self.n_latent, k);
        }

        let h_nd = self.latent_proj.forward(z_nk)?;
        let h_nld = h_nd
            .unsqueeze(1)?
            .broadcast_as((n, self.max_len, self.d_model))?
            .contiguous()?;
        let h_nld = add_positional(&h_nld, &self.pos_emb)?;
        let h_nld = self.stack.forward_t(&h_nld, None, train)?;
        self.point_out.forward(&h_nld)
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl TransformerDecoder {
    /// Will create a new decoder module with these variables:
    ///
    /// * `nn.dec.latent.{weight,bias}`
    /// * `nn.dec.pos` positional embedding
    /// * `nn.dec.tf.block.{}.*` where {} is the layer index
    /// * `nn.dec.out.{weight,bias}`
    pub fn new(
        max_len: usize,
        n_latent: usize,
        args: &TransformerArgs,
        vs: VarBuilder,
    ) -> Result<Self> {
        if max_len == 0 || n_latent == 0 {
            candle_core::bail!("decoder needs max_len > 0 and n_latent > 0");
        }

        Ok(Self {
            max_len,
            n_latent,
            d_model: args.d_model,
            latent_proj: candle_nn::linear(n_latent, args.d_model, vs.pp("nn.dec.latent"))?,
            pos_emb: candle_nn::embedding(max_len, args.d_model, vs.pp("nn.dec.pos"))?,
            stack: TransformerStack::new(args, vs.pp("nn.dec.tf"))?,
            point_out: candle_nn::linear(args.d_model, POINT_DIM, vs.pp("nn.dec.out"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_loss_functions::sequence_mse_loss;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_decoder_shapes() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let args = TransformerArgs {
            d_model: 8,
            n_heads: 2,
            n_layers: 1,
            d_ff: 16,
            dropout: 0.0,
        };
        let dec = TransformerDecoder::new(10, 4, &args, vb)?;

        let z = Tensor::randn(0f32, 1f32, (3, 4), &dev)?;
        let x_hat = dec.forward_t(&z, false)?;
        assert_eq!(x_hat.dims(), &[3, 10, 2]);

        let x = Tensor::randn(0f32, 1f32, (3, 10, 2), &dev)?;
        let (_, err) = dec.forward_with_recon(&z, &x, None, &sequence_mse_loss, false)?;
        assert_eq!(err.dims(), &[3]);

        let z_bad = Tensor::randn(0f32, 1f32, (3, 5), &dev)?;
        assert!(dec.forward_t(&z_bad, false).is_err());
        Ok(())
    }
}
