use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tch::Device;
use tracing::info;

mod checkpoint;
mod config;
mod cycle;
mod cycle_generator;
mod data;
mod discriminator;
mod error;
mod generator;
mod layers;
mod losses;
mod samples;
mod vanilla;

use config::{CycleOptions, VanillaOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Vanilla GAN and CycleGAN on emoji datasets.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Seed for tensor initialisation, noise and data shuffling.
    #[arg(long, global = true, default_value_t = 11)]
    seed: u64,
    /// Stay on the CPU even when CUDA is available.
    #[arg(long, global = true, default_value_t = false)]
    cpu: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    Vanilla(VanillaOptions),
    Cycle(CycleOptions),
    /// Write sample grids from a trained vanilla generator.
    Generate {
        #[arg(long, default_value = "checkpoints_vanilla")]
        checkpoint_dir: PathBuf,
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,
        /// Number of 4x4 grids to write.
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Interpolate between two noise vectors of a trained vanilla generator.
    Morph {
        #[arg(long, default_value = "checkpoints_vanilla")]
        checkpoint_dir: PathBuf,
        #[arg(long, default_value = "results/morphing.gif")]
        out: PathBuf,
        #[arg(long, default_value_t = 100)]
        frames: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("emoji_gan=info")),
        )
        .init();

    let args = Args::parse();

    let device = if args.cpu { Device::Cpu } else { Device::cuda_if_available() };
    info!("Use Device: {device:?}");
    tch::manual_seed(args.seed as i64);
    let mut rng = StdRng::seed_from_u64(args.seed);

    match args.command {
        Command::Vanilla(opts) => {
            info!("{opts:?}");
            let history = vanilla::train(&opts, device, &mut rng)
                .context("vanilla GAN training failed")?;
            if let (Some(g), Some(d)) = (history.generator.last(), history.discriminator.last()) {
                info!("Final epoch: G_loss {g:.4} | D_loss {d:.4}");
            }
        }
        Command::Cycle(opts) => {
            info!("{opts:?}");
            cycle::train(&opts, device, &mut rng).context("CycleGAN training failed")?;
        }
        Command::Generate { checkpoint_dir, out_dir, count } => {
            if count == 0 {
                bail!("--count must be at least 1");
            }
            let (_vs, generator) = vanilla::load_generator(&checkpoint_dir, device)?;
            fs::create_dir_all(&out_dir)?;
            for i in 0..count {
                let noise = vanilla::sample_noise(vanilla::NUM_SAMPLES, generator.noise_size(), device);
                let images = tch::no_grad(|| noise.apply_t(&generator, false));
                let path = out_dir.join(format!("generate-{}.png", i + 1));
                samples::save_grid(&path, &images)?;
            }
            info!("Generated {count} grids in {}", out_dir.display());
        }
        Command::Morph { checkpoint_dir, out, frames } => {
            let (_vs, generator) = vanilla::load_generator(&checkpoint_dir, device)?;
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let start = vanilla::sample_noise(1, generator.noise_size(), device);
            let end = vanilla::sample_noise(1, generator.noise_size(), device);
            samples::morph_gif(&out, &generator, &start, &end, frames)?;
            info!("Generated {}", out.display());
        }
    }

    Ok(())
}
