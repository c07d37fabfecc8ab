use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::InMemoryData;
use candle_util::candle_decoder_transformer::TransformerDecoder;
use candle_util::candle_encoder_transformer::TransformerEncoder;
use candle_util::candle_inference::TrainConfig;
use candle_util::candle_transformer::TransformerArgs;
use candle_util::candle_vae_inference::{Vae, VaeT};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn tiny_args() -> TransformerArgs {
    TransformerArgs {
        d_model: 16,
        n_heads: 2,
        n_layers: 1,
        d_ff: 32,
        dropout: 0.0,
    }
}

/// closed loops of `l` points: scaled and shifted circles
fn circle_data(n: usize, l: usize, dev: &Device) -> anyhow::Result<(Tensor, Tensor)> {
    let mut points = Vec::with_capacity(n * l * 2);
    for i in 0..n {
        let r = 0.3 + 0.5 * (i as f32) / (n as f32);
        let shift = 0.2 * ((i % 3) as f32 - 1.0);
        for j in 0..l {
            let t = 2.0 * std::f32::consts::PI * (j as f32) / (l as f32);
            points.push(r * t.cos() + shift);
            points.push(r * t.sin());
        }
    }
    let points = Tensor::from_vec(points, (n, l, 2), dev)?;
    let mask = Tensor::ones((n, l), DType::F32, dev)?;
    Ok((points, mask))
}

#[test]
fn training_reduces_loss() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (max_len, n_latent) = (8, 3);

    let parameters = VarMap::new();
    let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);
    let encoder = TransformerEncoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;
    let decoder = TransformerDecoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;

    let mut data = InMemoryData::new(&circle_data(24, max_len, &dev)?)?;

    let config = TrainConfig {
        learning_rate: 3e-3,
        batch_size: 8,
        num_epochs: 60,
        show_progress: false,
        ..Default::default()
    };

    let mut vae = Vae::build(&encoder, &decoder, &parameters)?;
    let scores = vae.train_encoder_decoder(&mut data, &config)?;

    assert_eq!(scores.len(), 60);
    assert!(scores.total.iter().all(|x| x.is_finite() && *x >= 0.));
    assert!(scores.kl.iter().all(|x| *x >= -1e-5));

    let head: f32 = scores.total[..5].iter().sum::<f32>() / 5.;
    let tail: f32 = scores.total[55..].iter().sum::<f32>() / 5.;
    assert!(tail < head, "loss did not decrease: {} -> {}", head, tail);
    Ok(())
}

#[test]
fn encode_generate_and_reconstruct_shapes() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (max_len, n_latent) = (6, 4);

    let parameters = VarMap::new();
    let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);
    let encoder = TransformerEncoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;
    let decoder = TransformerDecoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;
    let vae = Vae::build(&encoder, &decoder, &parameters)?;

    let (points, mask) = circle_data(5, max_len, &dev)?;
    let mut data = InMemoryData::new(&(points.clone(), mask.clone()))?;

    let config = TrainConfig {
        batch_size: 2,
        ..Default::default()
    };

    let z = vae.encode_latent(&mut data, &config)?;
    assert_eq!(z.dims(), &[5, n_latent]);

    let recon = vae.reconstruct(&points, Some(&mask))?;
    assert_eq!(recon.dims(), &[5, max_len, 2]);

    let generated = vae.generate(3, &mut StdRng::seed_from_u64(5), &dev)?;
    assert_eq!(generated.dims(), &[3, max_len, 2]);

    let again = vae.generate(3, &mut StdRng::seed_from_u64(5), &dev)?;
    assert_eq!(generated.to_vec3::<f32>()?, again.to_vec3::<f32>()?);

    let z0 = Tensor::zeros((2, n_latent), DType::F32, &dev)?;
    let a = vae.decode(&z0)?.to_vec3::<f32>()?;
    let b = vae.decode(&z0)?.to_vec3::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn same_seed_gives_same_training_scores() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (max_len, n_latent) = (6, 2);
    let dir = tempfile::tempdir()?;
    let init = dir.path().join("init.safetensors");

    let config = TrainConfig {
        learning_rate: 1e-2,
        batch_size: 4,
        num_epochs: 5,
        show_progress: false,
        seed: Some(42),
        ..Default::default()
    };

    let mut runs = vec![];
    for _ in 0..2 {
        let mut parameters = VarMap::new();
        let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);
        let encoder = TransformerEncoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;
        let decoder = TransformerDecoder::new(max_len, n_latent, &tiny_args(), vb.clone())?;

        // both runs start from the same parameters
        if init.exists() {
            parameters.load(&init)?;
        } else {
            parameters.save(&init)?;
        }

        let mut data = InMemoryData::new(&circle_data(10, max_len, &dev)?)?;
        let mut vae = Vae::build(&encoder, &decoder, &parameters)?;
        runs.push(vae.train_encoder_decoder(&mut data, &config)?);
    }

    assert_eq!(runs[0].total, runs[1].total);
    assert_eq!(runs[0].recon, runs[1].recon);
    assert_eq!(runs[0].kl, runs[1].kl);
    Ok(())
}

#[test]
fn mismatched_modules_are_rejected() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let parameters = VarMap::new();
    let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);

    let encoder = TransformerEncoder::new(6, 4, &tiny_args(), vb.pp("a"))?;
    let decoder = TransformerDecoder::new(6, 5, &tiny_args(), vb.pp("b"))?;
    assert!(Vae::build(&encoder, &decoder, &parameters).is_err());

    let decoder = TransformerDecoder::new(7, 4, &tiny_args(), vb.pp("c"))?;
    assert!(Vae::build(&encoder, &decoder, &parameters).is_err());
    Ok(())
}
