mod encode;
mod fit_vae;
mod generate;
mod mapvae_common;

use encode::*;
use fit_vae::*;
use generate::*;
use mapvae_common::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "MAPVAE",
    long_about = "Variational autoencoder for level geometry\n\
		  Point sequences (outlines of map sectors) are encoded\n\
		  by a transformer into a Gaussian latent space and decoded back."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train a VAE on point sequences",
        long_about = "Train the encoder-decoder in three stages:\n\
		      (1) Read point sequences and normalize coordinates\n\
		      (2) Fit every sequence to `max-len` positions\n\
		      (3) Minimize reconstruction error + KL divergence with Adam.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Generate new point sequences",
        long_about = "Draw latent vectors from the standard normal prior\n\
		      and decode them into point sequences in map coordinates.\n"
    )]
    Generate(GenerateArgs),

    #[command(
        about = "Encode point sequences into latent means",
        long_about = "Write the mean of the approximate posterior\n\
		      of each sequence as one row of a table.\n"
    )]
    Encode(EncodeArgs),

    /// decode the latent means of point sequences back into points
    Reconstruct(ReconstructArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            fit_vae(args)?;
        }
        Commands::Generate(args) => {
            generate_sequences(args)?;
        }
        Commands::Encode(args) => {
            encode_sequences(args)?;
        }
        Commands::Reconstruct(args) => {
            reconstruct_sequences(args)?;
        }
    }

    info!("Done");
    Ok(())
}
