use crate::candle_loss_functions::gaussian_kl_loss;
use candle_core::{Device, Result, Shape, Tensor};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Diagonal Gaussian over the latent space, one row per sequence
///
/// * `mean` - mean μ (n x k)
/// * `lnvar` - log variance log σ² (n x k)
///
#[derive(Clone, Debug)]
pub struct LatentGaussian {
    pub mean: Tensor,
    pub lnvar: Tensor,
}

impl LatentGaussian {
    pub fn new(mean: Tensor, lnvar: Tensor) -> Result<Self> {
        check_same_shape(&mean, &lnvar, "latent gaussian")?;
        Ok(Self { mean, lnvar })
    }

    pub fn dim_latent(&self) -> usize {
        self.mean.dims().last().copied().unwrap_or(0)
    }

    /// z = μ + σ * ε with ε ~ N(0, 1) drawn from `rng`
    pub fn sample_from<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Tensor> {
        let eps = standard_normal_like(&self.mean, rng)?;
        self.sample_with(&eps)
    }

    /// z = μ + σ * ε with the caller's ε
    pub fn sample_with(&self, eps: &Tensor) -> Result<Tensor> {
        reparameterize(&self.mean, &self.lnvar, eps)
    }

    /// KL(q || N(0, I)) for each row
    pub fn kl_divergence(&self) -> Result<Tensor> {
        gaussian_kl_loss(&self.mean, &self.lnvar)
    }
}

///
/// z = mu + exp(0.5 * lnvar) * eps
///
/// The noise is an argument so that gradients flow to `z_mean` and
/// `z_lnvar` only, and so that the draw is reproducible.
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
/// * `eps` - standard normal noise of the same shape
///
pub fn reparameterize(z_mean: &Tensor, z_lnvar: &Tensor, eps: &Tensor) -> Result<Tensor> {
    check_same_shape(z_mean, z_lnvar, "reparameterize")?;
    check_same_shape(z_mean, eps, "reparameterize")?;
    let z_std = (z_lnvar * 0.5)?.exp()?;
    z_mean.add(&z_std.mul(eps)?)
}

/// ε ~ N(0, 1) of the given shape, drawn from `rng`
pub fn standard_normal<S, R>(shape: S, rng: &mut R, device: &Device) -> Result<Tensor>
where
    S: Into<Shape>,
    R: Rng + ?Sized,
{
    let shape = shape.into();
    let eps: Vec<f32> = (0..shape.elem_count())
        .map(|_| StandardNormal.sample(rng))
        .collect();
    Tensor::from_vec(eps, shape, device)
}

/// ε ~ N(0, 1) shaped like `x`, on the same device and dtype
pub fn standard_normal_like<R: Rng + ?Sized>(x: &Tensor, rng: &mut R) -> Result<Tensor> {
    standard_normal(x.dims(), rng, x.device())?.to_dtype(x.dtype())
}

pub(crate) fn check_same_shape(lhs: &Tensor, rhs: &Tensor, op: &'static str) -> Result<()> {
    if lhs.shape() != rhs.shape() {
        candle_core::bail!(
            "{}: shape mismatch {:?} vs. {:?}",
            op,
            lhs.dims(),
            rhs.dims()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Var;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_keeps_dimension() -> Result<()> {
        let dev = Device::Cpu;
        let mut rng = StdRng::seed_from_u64(17);
        for (n, k) in [(1, 1), (3, 8), (16, 2)] {
            let mean = Tensor::randn(0f32, 1f32, (n, k), &dev)?;
            let lnvar = Tensor::randn(0f32, 1f32, (n, k), &dev)?;
            let gauss = LatentGaussian::new(mean, lnvar)?;
            let z = gauss.sample_from(&mut rng)?;
            assert_eq!(z.dims(), &[n, k]);
            assert_eq!(gauss.dim_latent(), k);
        }
        Ok(())
    }

    #[test]
    fn test_seeded_noise_is_reproducible() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::new(&[[0.5f32, -1.0, 2.0], [0.0, 1.0, -3.0]], &dev)?;
        let lnvar = Tensor::new(&[[0f32, -1.0, 1.0], [0.5, 0.0, -0.5]], &dev)?;
        let gauss = LatentGaussian::new(mean, lnvar)?;

        let a = gauss.sample_from(&mut StdRng::seed_from_u64(5))?;
        let b = gauss.sample_from(&mut StdRng::seed_from_u64(5))?;
        let c = gauss.sample_from(&mut StdRng::seed_from_u64(6))?;
        assert_eq!(a.to_vec2::<f32>()?, b.to_vec2::<f32>()?);
        assert_ne!(a.to_vec2::<f32>()?, c.to_vec2::<f32>()?);

        // the draw is exactly reparameterize with the same noise
        let eps = standard_normal_like(&gauss.mean, &mut StdRng::seed_from_u64(5))?;
        let d = reparameterize(&gauss.mean, &gauss.lnvar, &eps)?;
        assert_eq!(a.to_vec2::<f32>()?, d.to_vec2::<f32>()?);

        let e = standard_normal((4, 2), &mut StdRng::seed_from_u64(5), &dev)?;
        assert_eq!(e.dims(), &[4, 2]);
        Ok(())
    }

    #[test]
    fn test_zero_noise_gives_mean() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::new(&[[0.5f32, -1.25, 3.0], [7.0, 0.0, -2.5]], &dev)?;
        let lnvar = Tensor::zeros_like(&mean)?;
        let eps = Tensor::zeros_like(&mean)?;

        let z = reparameterize(&mean, &lnvar, &eps)?;
        assert_eq!(z.to_vec2::<f32>()?, mean.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_unit_noise_shifts_by_std() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::new(&[1f32, 2.0], &dev)?;
        let lnvar = Tensor::new(&[0f32, 2.0_f32.ln() * 2.0], &dev)?;
        let eps = Tensor::new(&[1f32, -1.0], &dev)?;

        let z = reparameterize(&mean, &lnvar, &eps)?.to_vec1::<f32>()?;
        approx::assert_abs_diff_eq!(z[0], 2.0, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_is_error() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Tensor::zeros((2, 3), candle_core::DType::F32, &dev)?;
        let lnvar = Tensor::zeros((2, 4), candle_core::DType::F32, &dev)?;
        let eps = Tensor::zeros((2, 3), candle_core::DType::F32, &dev)?;

        assert!(reparameterize(&mean, &lnvar, &eps).is_err());
        assert!(reparameterize(&mean, &mean, &lnvar).is_err());
        assert!(LatentGaussian::new(mean, lnvar).is_err());
        Ok(())
    }

    #[test]
    fn test_gradient_reaches_mean_and_lnvar() -> Result<()> {
        let dev = Device::Cpu;
        let mean = Var::new(&[0.3f32, -0.7], &dev)?;
        let lnvar = Var::new(&[0.0f32, 1.0], &dev)?;
        let eps = Tensor::new(&[0.5f32, -2.0], &dev)?;

        let z = reparameterize(mean.as_tensor(), lnvar.as_tensor(), &eps)?;
        let grads = z.sum_all()?.backward()?;

        // dz/dmu = 1
        let g_mean = grads.get(&mean).expect("grad mean").to_vec1::<f32>()?;
        assert_eq!(g_mean, vec![1.0, 1.0]);

        // dz/dlnvar = 0.5 * exp(0.5 * lnvar) * eps
        let g_lnvar = grads.get(&lnvar).expect("grad lnvar").to_vec1::<f32>()?;
        approx::assert_abs_diff_eq!(g_lnvar[0], 0.25, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(g_lnvar[1], -(0.5f32).exp(), epsilon = 1e-5);
        Ok(())
    }
}
