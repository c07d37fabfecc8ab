use candle_core::{Result, Tensor};
use candle_nn::{ops, Dropout, Linear, Module, ModuleT, VarBuilder};

/// Large negative logit for padded keys
const MASK_FILL: f64 = 1e9;

/// Multi-head self-attention over (n x l x d_model) sequences
pub struct MultiHeadSelfAttention {
    n_heads: usize,
    d_head: usize,
    query: Linear,
    key: Linear,
    value: Linear,
    out: Linear,
    attn_dropout: Option<Dropout>,
}

impl MultiHeadSelfAttention {
    /// Will create these variables:
    /// * `{q,k,v,o}.weight` and `{q,k,v,o}.bias`
    ///
    /// # Arguments
    /// * `d_model` - model width, divisible by `n_heads`
    /// * `n_heads` - number of attention heads
    /// * `dropout_rate` - dropout on attention weights (0 to disable)
    /// * `vs` - variable builder
    pub fn new(d_model: usize, n_heads: usize, dropout_rate: f32, vs: VarBuilder) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            candle_core::bail!(
                "d_model ({}) must be divisible by n_heads ({})",
                d_model,
                n_heads
            );
        }

        Ok(Self {
            n_heads,
            d_head: d_model / n_heads,
            query: candle_nn::linear(d_model, d_model, vs.pp("q"))?,
            key: candle_nn::linear(d_model, d_model, vs.pp("k"))?,
            value: candle_nn::linear(d_model, d_model, vs.pp("v"))?,
            out: candle_nn::linear(d_model, d_model, vs.pp("o"))?,
            attn_dropout: (dropout_rate > 0.).then(|| Dropout::new(dropout_rate)),
        })
    }

    /// (n, l, d) -> (n, h, l, d / h)
    fn split_heads(&self, x_nld: &Tensor) -> Result<Tensor> {
        let (n, l, _) = x_nld.dims3()?;
        x_nld
            .reshape((n, l, self.n_heads, self.d_head))?
            .transpose(1, 2)?
            .contiguous()
    }

    ///
    /// softmax(Q K' / sqrt(d_head) + bias) V
    ///
    /// * `x_nld` - input sequence (n x l x d_model)
    /// * `key_mask_nl` - 1 for valid positions, 0 for padding
    /// * `train` - apply dropout or not
    pub fn forward_t(
        &self,
        x_nld: &Tensor,
        key_mask_nl: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let (n, l, d) = x_nld.dims3()?;

        let q = self.split_heads(&self.query.forward(x_nld)?)?;
        let k = self.split_heads(&self.key.forward(x_nld)?)?;
        let v = self.split_heads(&self.value.forward(x_nld)?)?;

        let scale = 1. / (self.d_head as f64).sqrt();
        let mut logits = (q.matmul(&k.t()?.contiguous()?)? * scale)?;

        if let Some(mask_nl) = key_mask_nl {
            // 0 where valid, -MASK_FILL where padded
            let bias = mask_nl
                .affine(MASK_FILL, -MASK_FILL)?
                .reshape((n, 1, 1, l))?;
            logits = logits.broadcast_add(&bias)?;
        }

        let mut attn = ops::softmax_last_dim(&logits)?;
        if let Some(dropout) = &self.attn_dropout {
            attn = dropout.forward_t(&attn, train)?;
        }

        let h_nld = attn
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((n, l, d))?;

        self.out.forward(&h_nld)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, IndexOp};
    use candle_nn::VarMap;

    #[test]
    fn test_attention_shape() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let mha = MultiHeadSelfAttention::new(16, 4, 0.0, vb.pp("attn"))?;

        let x = Tensor::randn(0f32, 1f32, (3, 7, 16), &dev)?;
        let y = mha.forward_t(&x, None, false)?;
        assert_eq!(y.dims(), &[3, 7, 16]);
        Ok(())
    }

    #[test]
    fn test_bad_head_count() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(MultiHeadSelfAttention::new(10, 3, 0.0, vb.pp("a")).is_err());
        assert!(MultiHeadSelfAttention::new(10, 0, 0.0, vb.pp("b")).is_err());
    }

    #[test]
    fn test_padded_keys_are_ignored() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let mha = MultiHeadSelfAttention::new(8, 2, 0.0, vb.pp("attn"))?;

        let x = Tensor::randn(0f32, 1f32, (1, 5, 8), &dev)?;
        let mask = Tensor::new(&[[1f32, 1.0, 1.0, 0.0, 0.0]], &dev)?;

        // changing padded positions must not change valid outputs
        let noise = Tensor::randn(0f32, 5f32, (1, 2, 8), &dev)?;
        let x_alt = Tensor::cat(&[x.i((.., 0..3, ..))?, noise], 1)?;

        let y = mha.forward_t(&x, Some(&mask), false)?.i((.., 0..3, ..))?;
        let y_alt = mha.forward_t(&x_alt, Some(&mask), false)?.i((.., 0..3, ..))?;

        let diff = y.sub(&y_alt)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-5, "max diff {}", diff);
        Ok(())
    }
}
