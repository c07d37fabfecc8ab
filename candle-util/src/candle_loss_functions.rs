use crate::candle_latent_gaussian::check_same_shape;
use candle_core::{Result, Tensor};

/// KL divergence loss between N(mu, sigma^2) and N(0, 1)
///
/// -0.5 * sum_k (1 + log(sigma^2) - mu^2 - sigma^2)
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
///
/// Returns one value per row (summed over the last dimension).
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    check_same_shape(z_mean, z_lnvar, "gaussian kl")?;
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// Mean squared error between point sequences
///
/// recon(i) = mean_{l,c} [ x(i,l,c) - xhat(i,l,c) ]^2
///
/// With a mask, only positions `l` with `mask(i,l) = 1` count and the
/// average is taken over those positions.
///
/// * `x_nlc` - observed sequences (..., L, C)
/// * `hat_nlc` - reconstruction of the same shape
/// * `mask_nl` - optional 0/1 mask (..., L)
///
pub fn sequence_mse_loss(
    x_nlc: &Tensor,
    hat_nlc: &Tensor,
    mask_nl: Option<&Tensor>,
) -> Result<Tensor> {
    check_same_shape(x_nlc, hat_nlc, "sequence mse")?;

    let rank = x_nlc.rank();
    if rank < 2 {
        candle_core::bail!("sequence mse: expected (..., L, C), got {:?}", x_nlc.dims());
    }

    let sq_nlc = x_nlc.sub(hat_nlc)?.sqr()?;

    match mask_nl {
        None => sq_nlc.mean(rank - 1)?.mean(rank - 2),
        Some(mask_nl) => {
            if mask_nl.dims() != &x_nlc.dims()[..rank - 1] {
                candle_core::bail!(
                    "sequence mse: mask {:?} vs. data {:?}",
                    mask_nl.dims(),
                    x_nlc.dims()
                );
            }
            let n_coord = x_nlc.dims()[rank - 1] as f64;
            let masked = sq_nlc
                .broadcast_mul(&mask_nl.unsqueeze(rank - 1)?)?
                .sum(rank - 1)?
                .sum(rank - 2)?;
            let denom = (mask_nl.sum(rank - 2)? * n_coord)?.clamp(1.0, f64::INFINITY)?;
            masked.div(&denom)
        }
    }
}

/// Per-batch summary of the VAE objective
pub struct VaeLoss {
    /// scalar to minimize
    pub total: Tensor,
    /// batch mean of the reconstruction error
    pub recon: Tensor,
    /// batch mean of the KL divergence
    pub kl: Tensor,
}

///
/// loss = mean_i [ recon(i) + kl_weight * kl(i) ]
///
/// * `recon_n` - reconstruction error per sequence
/// * `kl_n` - KL divergence per sequence
/// * `kl_weight` - 1.0 unless warming up
///
pub fn vae_loss(recon_n: &Tensor, kl_n: &Tensor, kl_weight: f64) -> Result<VaeLoss> {
    check_same_shape(recon_n, kl_n, "vae loss")?;
    let total = recon_n.add(&(kl_n * kl_weight)?)?.mean_all()?;
    Ok(VaeLoss {
        total,
        recon: recon_n.mean_all()?,
        kl: kl_n.mean_all()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_kl_zero_at_prior() -> Result<()> {
        let dev = Device::Cpu;
        let z0 = Tensor::zeros((4, 6), DType::F32, &dev)?;
        let kl = gaussian_kl_loss(&z0, &z0)?.to_vec1::<f32>()?;
        assert_eq!(kl.len(), 4);
        for v in kl {
            assert_eq!(v, 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_kl_non_negative() -> Result<()> {
        let dev = Device::Cpu;
        let mean = (Tensor::randn(0f32, 1f32, (64, 5), &dev)? * 3.0)?;
        let lnvar = (Tensor::randn(0f32, 1f32, (64, 5), &dev)? * 3.0)?;
        for v in gaussian_kl_loss(&mean, &lnvar)?.to_vec1::<f32>()? {
            assert!(v >= -1e-5, "negative kl {}", v);
        }
        Ok(())
    }

    #[test]
    fn test_kl_closed_form() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::new(&[[1f32, -2.0]], &dev)?;
        let lnvar = Tensor::new(&[[0f32, 1.0]], &dev)?;
        // 0.5 * [ (1 - 1 + 1 - 0) + (e - 1 + 4 - 1) ]
        let expected = 0.5 * (1.0 + 1f32.exp() + 2.0);
        let kl = gaussian_kl_loss(&mean, &lnvar)?.to_vec1::<f32>()?;
        approx::assert_abs_diff_eq!(kl[0], expected, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_mse_zero_for_identical() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::randn(0f32, 10f32, (3, 7, 2), &dev)?;
        let mse = sequence_mse_loss(&x, &x, None)?.to_vec1::<f32>()?;
        assert_eq!(mse, vec![0.0; 3]);

        let single = Tensor::randn(0f32, 1f32, (5, 2), &dev)?;
        let mse = sequence_mse_loss(&single, &single, None)?.to_scalar::<f32>()?;
        assert_eq!(mse, 0.0);
        Ok(())
    }

    #[test]
    fn test_mse_ignores_masked_positions() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[[[1f32, 1.0], [2.0, 2.0], [0.0, 0.0]]], &dev)?;
        let hat = Tensor::new(&[[[1f32, 3.0], [2.0, 2.0], [100.0, -100.0]]], &dev)?;
        let mask = Tensor::new(&[[1f32, 1.0, 0.0]], &dev)?;

        // one squared error of 4 over 2 positions x 2 coordinates
        let mse = sequence_mse_loss(&x, &hat, Some(&mask))?.to_vec1::<f32>()?;
        approx::assert_abs_diff_eq!(mse[0], 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_mse_length_mismatch_is_error() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::zeros((2, 5, 2), DType::F32, &dev)?;
        let hat = Tensor::zeros((2, 6, 2), DType::F32, &dev)?;
        assert!(sequence_mse_loss(&x, &hat, None).is_err());

        let bad_mask = Tensor::ones((2, 6), DType::F32, &dev)?;
        assert!(sequence_mse_loss(&x, &x, Some(&bad_mask)).is_err());
        Ok(())
    }

    #[test]
    fn test_vae_loss_non_negative() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::randn(0f32, 1f32, (8, 4, 2), &dev)?;
        let hat = Tensor::randn(0f32, 1f32, (8, 4, 2), &dev)?;
        let mean = Tensor::randn(0f32, 1f32, (8, 3), &dev)?;
        let lnvar = Tensor::randn(0f32, 1f32, (8, 3), &dev)?;

        let recon = sequence_mse_loss(&x, &hat, None)?;
        let kl = gaussian_kl_loss(&mean, &lnvar)?;
        let loss = vae_loss(&recon, &kl, 1.0)?;

        let total = loss.total.to_scalar::<f32>()?;
        let parts = loss.recon.to_scalar::<f32>()? + loss.kl.to_scalar::<f32>()?;
        assert!(total >= 0.0);
        approx::assert_abs_diff_eq!(total, parts, epsilon = 1e-4);
        Ok(())
    }
}
