use crate::mapvae_common::*;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum LengthArg {
    Resample,
    Pad,
}

impl From<&LengthArg> for LengthPolicy {
    fn from(arg: &LengthArg) -> Self {
        match arg {
            LengthArg::Resample => LengthPolicy::Resample,
            LengthArg::Pad => LengthPolicy::Pad,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        required = true,
        help = "Point sequence files or directories",
        long_help = "Point sequence files to learn from.\n\
		     Each file holds one sequence: `x y` per line, or `.json`.\n\
		     A directory contributes its .tsv, .txt, .csv and .json files\n\
		     (optionally gzipped); other files are skipped."
    )]
    pub data_files: Vec<Box<str>>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.safetensors\n\
		     - {out}.config.json\n\
		     - {out}.loss.tsv\n\
		     - {out}.latent.tsv\n"
    )]
    pub out: Box<str>,

    #[arg(
        long,
        short = 'l',
        default_value_t = 64,
        help = "Number of positions per sequence",
        long_help = "Number of positions the encoder reads and the decoder writes."
    )]
    pub max_len: usize,

    #[arg(
        long,
        value_enum,
        default_value = "resample",
        help = "Length policy",
        long_help = "How sequences are fitted to `max-len` positions.\n\
		     resample: interpolate every sequence to `max-len` points\n\
		     pad: pad shorter sequences, skip longer ones"
    )]
    pub length_policy: LengthArg,

    #[arg(
        short = 'k',
        long,
        default_value_t = 16,
        help = "Latent dimension",
        long_help = "Dimension of the latent space."
    )]
    pub n_latent: usize,

    #[arg(long, default_value_t = 64, help = "Transformer model width")]
    pub d_model: usize,

    #[arg(long, default_value_t = 4, help = "Number of attention heads")]
    pub n_heads: usize,

    #[arg(long, default_value_t = 2, help = "Number of transformer layers")]
    pub n_layers: usize,

    #[arg(long, default_value_t = 128, help = "Feed-forward hidden width")]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1, help = "Dropout rate during training")]
    pub dropout: f32,

    #[arg(
        long,
        short = 'i',
        default_value_t = 100,
        help = "Number of training epochs",
        long_help = "Number of training epochs.\n\
		     Controls how many times the model is trained over the data."
    )]
    pub epochs: usize,

    #[arg(
        long,
        default_value_t = 32,
        help = "Minibatch size",
        long_help = "Minibatch size for training.\n\
		     Controls the number of samples per training batch."
    )]
    pub minibatch_size: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_LEARNING_RATE,
        help = "Learning rate",
        long_help = "Learning rate for Adam.\n\
		     Controls the step size for parameter updates."
    )]
    pub learning_rate: f32,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "KL annealing warmup epochs",
        long_help = "Number of epochs for KL weight to warm up from 0 to 1.\n\
		     kl_weight = 1 - exp(-epoch / warmup)\n\
		     Set to 0 to disable annealing."
    )]
    pub kl_warmup_epochs: f64,

    #[arg(
        long,
        help = "Random seed",
        long_help = "Seed for minibatch order and the latent draws during training.\n\
		     Runs repeat exactly only with --dropout 0, since dropout masks\n\
		     and parameter initialization use the device generator."
    )]
    pub seed: Option<u64>,

    #[arg(
        long,
        short,
        help = "Verbosity",
        long_help = "Enable verbose output.\n\
		     Prints per-epoch losses instead of a progress bar."
    )]
    pub verbose: bool,
}

pub fn fit_vae(args: &TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    // 1. Read point sequences
    let seqs = PointFileList::from_paths(&args.data_files)?.read_sequences()?;
    info!("Read {} point sequences", seqs.len());

    // 2. Normalize coordinates and fit lengths
    let scaler = PointScaler::fit(&seqs)?;
    info!(
        "center: ({}, {}), scale: {}",
        scaler.center.x, scaler.center.y, scaler.scale
    );

    let config = ModelConfig {
        max_len: args.max_len,
        n_latent: args.n_latent,
        d_model: args.d_model,
        n_heads: args.n_heads,
        n_layers: args.n_layers,
        d_ff: args.d_ff,
        dropout: args.dropout,
        length_policy: (&args.length_policy).into(),
        scaler,
    };

    if args.seed.is_some() && args.dropout > 0. {
        warn!(
            "dropout {} is not covered by --seed; runs will differ",
            args.dropout
        );
    }

    let dev = Device::Cpu;
    let model = MapVaeModel::new(config, &dev)?;
    let padded = model.prepare_sequences(&seqs)?;
    info!(
        "{} sequences x {} positions",
        padded.num_sequences(),
        padded.max_len
    );

    // 3. Train the encoder-decoder
    let mut data = InMemoryData::new(&padded)?;

    let train_config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.minibatch_size,
        num_epochs: args.epochs,
        kl_warmup_epochs: args.kl_warmup_epochs,
        device: dev.clone(),
        verbose: args.verbose,
        show_progress: true,
        seed: args.seed,
    };

    let mut vae = model.vae()?;
    let scores = vae.train_encoder_decoder(&mut data, &train_config)?;

    model.save(&args.out)?;
    write_lines(&scores.to_lines(), &(args.out.to_string() + ".loss.tsv"))?;

    // 4. Latent states of the training sequences
    let z_nk = vae.encode_latent(&mut data, &train_config)?;
    write_latent(&z_nk, &padded.names, &(args.out.to_string() + ".latent.tsv"))?;

    Ok(())
}
