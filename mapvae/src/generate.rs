use crate::mapvae_common::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Args, Debug)]
pub struct GenerateArgs {
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
        short = 'n',
        long,
        default_value_t = 10,
        help = "Number of sequences to generate"
    )]
    pub num_sequences: usize,

    #[arg(
        long,
        short,
        required = true,
        help = "Output prefix",
        long_help = "Output prefix for generated sequences:\n\
		     - {out}.{i}.tsv (or .tsv.gz with --gzip)\n"
    )]
    pub out: Box<str>,

    #[arg(
        long,
        help = "Random seed",
        long_help = "Seed for the latent draws.\n\
		     The same seed and model give the same sequences.\n\
		     Models trained with `--length-policy pad` cannot generate."
    )]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = false, help = "Gzip output files")]
    pub gzip: bool,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

pub fn generate_sequences(args: &GenerateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let model = MapVaeModel::load(&args.model, &Device::Cpu)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let seqs = model.sample_sequences(args.num_sequences, &mut rng)?;

    let ext = if args.gzip { "tsv.gz" } else { "tsv" };

    for (i, seq) in seqs.iter().enumerate() {
        let file = format!("{}.{}.{}", args.out, i, ext);
        write_point_sequence(seq, &file)?;
    }

    info!("wrote {} sequences to {}.*.{}", seqs.len(), args.out, ext);
    Ok(())
}
