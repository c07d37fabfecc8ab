use crate::candle_latent_gaussian::LatentGaussian;
use candle_core::{Result, Tensor};
use rand::Rng;

pub trait SequenceEncoderT {
    /// Evaluate latent Gaussian parameters: mu and log_var
    ///
    /// # Arguments
    /// * `x_nlc` - padded point sequences (n x l x 2)
    /// * `mask_nl` - 1 for valid positions, 0 for padding (n x l)
    /// * `train` - whether to use dropout or not
    fn latent_gaussian_params(
        &self,
        x_nlc: &Tensor,
        mask_nl: Option<&Tensor>,
        train: bool,
    ) -> Result<LatentGaussian>;

    /// An encoder that spits out two results (latent mean, KL loss)
    ///
    /// # Returns `(z_nk, kl_loss_n)`
    /// * `z_nk` - mean of the latent Gaussian (n x k)
    /// * `kl_loss_n` - KL loss (n)
    fn forward_t(
        &self,
        x_nlc: &Tensor,
        mask_nl: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let latent = self.latent_gaussian_params(x_nlc, mask_nl, train)?;
        Ok((latent.mean.clone(), latent.kl_divergence()?))
    }

    /// Training pass with a reparameterized draw whose noise comes
    /// from `rng`
    ///
    /// # Returns `(z_nk, kl_loss_n)`
    /// * `z_nk` - z = mu + sigma * eps (n x k)
    /// * `kl_loss_n` - KL loss (n)
    fn forward_sample<R>(
        &self,
        x_nlc: &Tensor,
        mask_nl: Option<&Tensor>,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor)>
    where
        R: Rng + ?Sized,
    {
        let latent = self.latent_gaussian_params(x_nlc, mask_nl, true)?;
        Ok((latent.sample_from(rng)?, latent.kl_divergence()?))
    }

    fn max_len(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait SequenceDecoderT {
    /// A decoder that spits out reconstructed sequences (n x l x 2)
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and its error
    /// * `z_nk` - latent states
    /// * `x_nlc` - observed sequences to validate with
    /// * `mask_nl` - valid positions of `x_nlc`
    /// * `recon_err` - fn (observed, reconstruction, mask) -> error (n)
    fn forward_with_recon<ReconFn>(
        &self,
        z_nk: &Tensor,
        x_nlc: &Tensor,
        mask_nl: Option<&Tensor>,
        recon_err: &ReconFn,
        train: bool,
    ) -> Result<(Tensor, Tensor)>
    where
        ReconFn: Fn(&Tensor, &Tensor, Option<&Tensor>) -> Result<Tensor>,
    {
        let hat_nlc = self.forward_t(z_nk, train)?;
        let err_n = recon_err(x_nlc, &hat_nlc, mask_nl)?;
        Ok((hat_nlc, err_n))
    }

    fn max_len(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
