use crate::mapvae_common::*;

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[arg(required = true, help = "Point sequence files or directories")]
    pub data_files: Vec<Box<str>>,

    #[arg(
        long,
        short,
        required = true,
        help = "Trained model header",
        long_help = "Output header of `mapvae train`.\n\
		     Reads {model}.config.json and {model}.safetensors."
    )]
    pub model: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output file",
        long_help = "Latent mean table: sequence name followed by\n\
		     one column per latent dimension."
    )]
    pub out: Box<str>,

    #[arg(long, default_value_t = 32, help = "Minibatch size")]
    pub minibatch_size: usize,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct ReconstructArgs {
    #[arg(required = true, help = "Point sequence files or directories")]
    pub data_files: Vec<Box<str>>,

    #[arg(
        long,
        short,
        required = true,
        help = "Trained model header",
        long_help = "Output header of `mapvae train`.\n\
		     Reads {model}.config.json and {model}.safetensors."
    )]
    pub model: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output prefix",
        long_help = "Output prefix for reconstructed sequences:\n\
		     - {out}.{i}.{name}.tsv\n\
		     where {i} is the input order, so equal names do not collide.\n"
    )]
    pub out: Box<str>,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

/// `{out}.{i}.{name}.tsv` for the i-th sequence
pub fn reconstruction_files(out: &str, names: &[Box<str>]) -> Vec<String> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}.{}.{}.tsv", out, i, name))
        .collect()
}

pub fn encode_sequences(args: &EncodeArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let dev = Device::Cpu;
    let model = MapVaeModel::load(&args.model, &dev)?;

    let seqs = PointFileList::from_paths(&args.data_files)?.read_sequences()?;
    let padded = model.prepare_sequences(&seqs)?;
    let mut data = InMemoryData::new(&padded)?;

    let config = TrainConfig {
        batch_size: args.minibatch_size,
        device: dev,
        ..Default::default()
    };

    let z_nk = model.vae()?.encode_latent(&mut data, &config)?;
    write_latent(&z_nk, &padded.names, &args.out)?;

    info!("encoded {} sequences", padded.num_sequences());
    Ok(())
}

pub fn reconstruct_sequences(args: &ReconstructArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let dev = Device::Cpu;
    let model = MapVaeModel::load(&args.model, &dev)?;

    let seqs = PointFileList::from_paths(&args.data_files)?.read_sequences()?;
    let padded = model.prepare_sequences(&seqs)?;
    let (x_nlc, mask_nl) = padded.to_tensors(&dev)?;

    let hat_nlc = model.vae()?.reconstruct(&x_nlc, Some(&mask_nl))?;

    let restored = model.restore_sequences(&hat_nlc, &padded.names)?;
    let files = reconstruction_files(&args.out, &padded.names);
    for ((mut seq, &len), file) in restored.into_iter().zip(padded.lengths.iter()).zip(files) {
        // padded positions carry no input
        seq.points.truncate(len);
        write_point_sequence(&seq, &file)?;
    }

    info!("reconstructed {} sequences", padded.num_sequences());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruction_files() {
        // two `E1M1` files from different directories
        let names: Vec<Box<str>> = vec!["E1M1".into(), "E1M2".into(), "E1M1".into()];
        let files = reconstruction_files("out/recon", &names);

        assert_eq!(
            files,
            vec![
                "out/recon.0.E1M1.tsv",
                "out/recon.1.E1M2.tsv",
                "out/recon.2.E1M1.tsv"
            ]
        );
        let unique: std::collections::HashSet<&String> = files.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
