use crate::candle_data_loader::*;
use crate::candle_inference::{TrainConfig, TrainScores};
use crate::candle_latent_gaussian::standard_normal;
use crate::candle_loss_functions::{sequence_mse_loss, vae_loss};
use crate::candle_model_traits::{SequenceDecoderT, SequenceEncoderT};

use candle_core::{Device, Result, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use rand::Rng;

pub struct Vae<'a, Enc, Dec>
where
    Enc: SequenceEncoderT,
    Dec: SequenceDecoderT,
{
    pub encoder: &'a Enc,
    pub decoder: &'a Dec,
    pub variable_map: &'a candle_nn::VarMap,
}

pub trait VaeT<'a, Enc, Dec>
where
    Enc: SequenceEncoderT,
    Dec: SequenceDecoderT,
{
    /// Train the VAE model with Adam
    /// * `data` - data loader should have `minibatch_data`
    /// * `train_config` - training configuration
    fn train_encoder_decoder<DataL>(
        &mut self,
        data: &mut DataL,
        train_config: &TrainConfig,
    ) -> anyhow::Result<TrainScores>
    where
        DataL: DataLoader;

    /// Latent means of all the samples in `data`, in sample order (n x k)
    fn encode_latent<DataL>(
        &self,
        data: &mut DataL,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Tensor>
    where
        DataL: DataLoader;

    /// Decode the latent means of `x_nlc` without sampling
    fn reconstruct(&self, x_nlc: &Tensor, mask_nl: Option<&Tensor>) -> Result<Tensor>;

    /// Decode given latent vectors (n x k) into sequences (n x l x 2)
    fn decode(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// Draw `n` latent vectors from N(0, I) and decode them (n x l x 2)
    fn generate<R>(&self, n: usize, rng: &mut R, device: &Device) -> Result<Tensor>
    where
        R: Rng + ?Sized;

    /// Build a VAE model
    /// * `encoder` - encoder module
    /// * `decoder` - decoder module
    fn build(
        encoder: &'a Enc,
        decoder: &'a Dec,
        variable_map: &'a candle_nn::VarMap,
    ) -> anyhow::Result<Self>
    where
        Self: Sized;
}

impl<'a, Enc, Dec> VaeT<'a, Enc, Dec> for Vae<'a, Enc, Dec>
where
    Enc: SequenceEncoderT,
    Dec: SequenceDecoderT,
{
    fn train_encoder_decoder<DataL>(
        &mut self,
        data: &mut DataL,
        train_config: &TrainConfig,
    ) -> anyhow::Result<TrainScores>
    where
        DataL: DataLoader,
    {
        let device = &train_config.device;
        let mut adam = AdamW::new(
            self.variable_map.all_vars(),
            ParamsAdamW {
                lr: train_config.learning_rate.into(),
                weight_decay: 0.,
                ..Default::default()
            },
        )?;

        let pb = ProgressBar::new(train_config.num_epochs as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut scores = TrainScores::with_capacity(train_config.num_epochs);
        let mut rng = train_config.rng();

        info!(
            "Start training VAE: {} samples, {} epochs",
            data.num_samples(),
            train_config.num_epochs
        );

        for epoch in 0..train_config.num_epochs {
            data.shuffle_minibatch(train_config.batch_size, &mut rng)?;
            let kl_weight = train_config.kl_weight(epoch);

            let mut total_tot = 0f32;
            let mut recon_tot = 0f32;
            let mut kl_tot = 0f32;

            for b in 0..data.num_minibatch() {
                let mb = data.minibatch_data(b, device)?;

                let (z_nk, kl_n) =
                    self.encoder
                        .forward_sample(&mb.input, Some(&mb.mask), &mut rng)?;
                let (_, recon_n) = self.decoder.forward_with_recon(
                    &z_nk,
                    &mb.input,
                    Some(&mb.mask),
                    &sequence_mse_loss,
                    true,
                )?;

                let loss = vae_loss(&recon_n, &kl_n, kl_weight)?;
                let total_val = loss.total.to_scalar::<f32>()?;
                if !total_val.is_finite() {
                    return Err(anyhow::anyhow!(
                        "non-finite loss at epoch {}, minibatch {}",
                        epoch + 1,
                        b
                    ));
                }
                adam.backward_step(&loss.total)?;

                total_tot += total_val;
                recon_tot += loss.recon.to_scalar::<f32>()?;
                kl_tot += loss.kl.to_scalar::<f32>()?;
            }

            let nb = data.num_minibatch().max(1) as f32;
            scores.total.push(total_tot / nb);
            scores.recon.push(recon_tot / nb);
            scores.kl.push(kl_tot / nb);
            pb.inc(1);

            if train_config.verbose {
                info!(
                    "[{}] loss: {}, reconstruction: {}, kl: {}",
                    epoch + 1,
                    total_tot / nb,
                    recon_tot / nb,
                    kl_tot / nb
                );
            }
        } // each epoch

        pb.finish_and_clear();
        info!("done model training");
        Ok(scores)
    }

    fn encode_latent<DataL>(
        &self,
        data: &mut DataL,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Tensor>
    where
        DataL: DataLoader,
    {
        let device = &train_config.device;
        data.order_minibatch(train_config.batch_size)?;

        let mut z_vec = Vec::with_capacity(data.num_minibatch());
        for b in 0..data.num_minibatch() {
            let mb = data.minibatch_data(b, device)?;
            let latent = self
                .encoder
                .latent_gaussian_params(&mb.input, Some(&mb.mask), false)?;
            z_vec.push(latent.mean);
        }
        Ok(Tensor::cat(&z_vec, 0)?)
    }

    fn reconstruct(&self, x_nlc: &Tensor, mask_nl: Option<&Tensor>) -> Result<Tensor> {
        let (z_nk, _) = self.encoder.forward_t(x_nlc, mask_nl, false)?;
        self.decoder.forward_t(&z_nk, false)
    }

    fn decode(&self, z_nk: &Tensor) -> Result<Tensor> {
        self.decoder.forward_t(z_nk, false)
    }

    fn generate<R>(&self, n: usize, rng: &mut R, device: &Device) -> Result<Tensor>
    where
        R: Rng + ?Sized,
    {
        let z_nk = standard_normal((n, self.decoder.dim_latent()), rng, device)?;
        self.decode(&z_nk)
    }

    fn build(
        encoder: &'a Enc,
        decoder: &'a Dec,
        variable_map: &'a candle_nn::VarMap,
    ) -> anyhow::Result<Self> {
        if encoder.dim_latent() != decoder.dim_latent() {
            return Err(anyhow::anyhow!(
                "latent dimensions differ: encoder {} vs. decoder {}",
                encoder.dim_latent(),
                decoder.dim_latent()
            ));
        }

        if encoder.max_len() != decoder.max_len() {
            return Err(anyhow::anyhow!(
                "sequence lengths differ: encoder {} vs. decoder {}",
                encoder.max_len(),
                decoder.max_len()
            ));
        }

        Ok(Self {
            encoder,
            decoder,
            variable_map,
        })
    }
}
