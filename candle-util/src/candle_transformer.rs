use crate::candle_aux_layers::*;
use crate::candle_attention::MultiHeadSelfAttention;
use candle_core::{Result, Tensor};
use candle_nn::{Dropout, LayerNorm, Linear, Module, ModuleT, VarBuilder};

/// Hyperparameters shared by the transformer encoder and decoder
#[derive(Clone, Debug)]
pub struct TransformerArgs {
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub d_ff: usize,
    pub dropout: f32,
}

impl Default for TransformerArgs {
    fn default() -> Self {
        Self {
            d_model: 64,
            n_heads: 4,
            n_layers: 2,
            d_ff: 128,
            dropout: 0.1,
        }
    }
}

/// Pre-norm residual block
///
/// x = x + attn(ln_1(x))
/// x = x + ff(ln_2(x))
pub struct TransformerBlock {
    ln_attn: LayerNorm,
    attn: MultiHeadSelfAttention,
    ln_ff: LayerNorm,
    ff: StackLayers<Linear>,
    dropout: Option<Dropout>,
}

impl TransformerBlock {
    pub fn new(args: &TransformerArgs, vs: VarBuilder) -> Result<Self> {
        let ln_attn = candle_nn::layer_norm(args.d_model, 1e-5, vs.pp("ln.attn"))?;
        let attn = MultiHeadSelfAttention::new(
            args.d_model,
            args.n_heads,
            args.dropout,
            vs.pp("attn"),
        )?;
        let ln_ff = candle_nn::layer_norm(args.d_model, 1e-5, vs.pp("ln.ff"))?;
        let ff = feed_forward(args.d_model, args.d_ff, args.dropout, vs.pp("ff"))?;

        Ok(Self {
            ln_attn,
            attn,
            ln_ff,
            ff,
            dropout: (args.dropout > 0.).then(|| Dropout::new(args.dropout)),
        })
    }

    fn residual_dropout(&self, h: Tensor, train: bool) -> Result<Tensor> {
        match &self.dropout {
            Some(dropout) => dropout.forward_t(&h, train),
            None => Ok(h),
        }
    }

    /// * `x_nld` - (n x l x d_model)
    /// * `mask_nl` - optional key padding mask
    pub fn forward_t(&self, x_nld: &Tensor, mask_nl: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let h = self
            .attn
            .forward_t(&self.ln_attn.forward(x_nld)?, mask_nl, train)?;
        let x_nld = x_nld.add(&self.residual_dropout(h, train)?)?;

        let h = self.ff.forward_t(&self.ln_ff.forward(&x_nld)?, train)?;
        x_nld.add(&self.residual_dropout(h, train)?)
    }
}

/// `n_layers` blocks followed by a final layer norm
pub struct TransformerStack {
    blocks: Vec<TransformerBlock>,
    ln_out: LayerNorm,
}

impl TransformerStack {
    /// Will create these variables:
    ///
    /// * `block.{}.*` where {} is the layer index
    /// * `ln.out.*`
    pub fn new(args: &TransformerArgs, vs: VarBuilder) -> Result<Self> {
        let blocks = (0..args.n_layers)
            .map(|j| TransformerBlock::new(args, vs.pp(format!("block.{}", j))))
            .collect::<Result<Vec<_>>>()?;
        let ln_out = candle_nn::layer_norm(args.d_model, 1e-5, vs.pp("ln.out"))?;
        Ok(Self { blocks, ln_out })
    }

    pub fn forward_t(&self, x_nld: &Tensor, mask_nl: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let mut h = x_nld.clone();
        for block in self.blocks.iter() {
            h = block.forward_t(&h, mask_nl, train)?;
        }
        self.ln_out.forward(&h)
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }
}

/// Add learned positional embeddings `pos_emb` (max_len x d) to the
/// first `l` positions of `x_nld`
pub fn add_positional(x_nld: &Tensor, pos_emb: &candle_nn::Embedding) -> Result<Tensor> {
    let (_, l, _) = x_nld.dims3()?;
    let table = pos_emb.embeddings();
    if l > table.dim(0)? {
        candle_core::bail!(
            "sequence length {} exceeds positional table {}",
            l,
            table.dim(0)?
        );
    }
    x_nld.broadcast_add(&table.narrow(0, 0, l)?.unsqueeze(0)?)
}
