use candle_core::{Result, Tensor};
use candle_nn::{Activation, Dropout, Module, ModuleT};

/// build a stack of alternating `M` and `A` layers, with dropout
/// after each activation while training
pub struct StackLayers<M>
where
    M: Module,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
    dropout: Option<Dropout>,
}

impl<M> ModuleT for StackLayers<M>
where
    M: Module,
{
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
                if let Some(dropout) = &self.dropout {
                    x = dropout.forward_t(&x, train)?;
                }
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
            dropout: None,
        }
    }

    pub fn with_dropout(dropout_rate: f32) -> Self {
        let dropout = (dropout_rate > 0.).then(|| Dropout::new(dropout_rate));
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
            dropout,
        }
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// position-wise feed-forward: d_model -> d_ff -> (act) -> d_model
pub fn feed_forward(
    d_model: usize,
    d_ff: usize,
    dropout_rate: f32,
    vs: candle_nn::VarBuilder,
) -> Result<StackLayers<candle_nn::Linear>> {
    let mut ff = StackLayers::with_dropout(dropout_rate);
    ff.push_with_act(
        candle_nn::linear(d_model, d_ff, vs.pp("fc.0"))?,
        Activation::Gelu,
    );
    ff.push(candle_nn::linear(d_ff, d_model, vs.pp("fc.1"))?);
    Ok(ff)
}
