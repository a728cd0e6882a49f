//! Training options for both models.
//!
//! Each options struct is a clap `Parser`, so the command line is the single
//! source of defaults: `Default` parses an empty argument list.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::data::EmojiType;
use crate::error::{GanError, Result};

/// The generator and discriminator architectures are built for 32x32 images.
pub const IMAGE_SIZE: i64 = 32;

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(about = "Train the vanilla GAN on one emoji style.")]
pub struct VanillaOptions {
    /// The side length N to convert images to NxN.
    #[arg(long, default_value_t = IMAGE_SIZE)]
    pub image_size: i64,
    #[arg(long, default_value_t = 32)]
    pub conv_dim: i64,
    #[arg(long, default_value_t = 100)]
    pub noise_size: i64,

    #[arg(long, default_value_t = 1000)]
    pub num_epochs: usize,
    /// The number of images in a batch.
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 0.0003)]
    pub lr: f64,
    #[arg(long, default_value_t = 0.5)]
    pub beta1: f64,
    #[arg(long, default_value_t = 0.999)]
    pub beta2: f64,

    /// Choose the type of emojis to generate.
    #[arg(long, value_enum, default_value_t = EmojiType::Apple)]
    pub emoji: EmojiType,
    #[arg(long, default_value = "emojis")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "checkpoints_vanilla")]
    pub checkpoint_dir: PathBuf,
    #[arg(long, default_value = "samples_vanilla")]
    pub sample_dir: PathBuf,
    /// Restore G.ot / D.ot from this directory before training.
    #[arg(long)]
    pub load: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    pub log_step: usize,
    #[arg(long, default_value_t = 200)]
    pub sample_every: usize,
    #[arg(long, default_value_t = 400)]
    pub checkpoint_every: usize,
}

impl Default for VanillaOptions {
    fn default() -> Self {
        VanillaOptions::parse_from(["vanilla"])
    }
}

impl VanillaOptions {
    pub fn validate(&self) -> Result<()> {
        check_image_size(self.image_size)?;
        check_positive("conv_dim", self.conv_dim)?;
        check_positive("noise_size", self.noise_size)?;
        check_positive("num_epochs", self.num_epochs as i64)?;
        check_positive("batch_size", self.batch_size as i64)?;
        check_adam(self.lr, self.beta1, self.beta2)?;
        check_cadence(self.log_step, self.sample_every, self.checkpoint_every)
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(about = "Train a CycleGAN translating between two emoji styles.")]
pub struct CycleOptions {
    #[arg(long, default_value_t = IMAGE_SIZE)]
    pub image_size: i64,
    #[arg(long, default_value_t = 32)]
    pub g_conv_dim: i64,
    #[arg(long, default_value_t = 32)]
    pub d_conv_dim: i64,
    /// Start the generator encoders from near-zero weights.
    #[arg(long)]
    pub init_zero_weights: bool,
    #[arg(long)]
    pub use_cycle_consistency_loss: bool,
    #[arg(long, default_value_t = 10.0)]
    pub lambda_cycle: f64,

    #[arg(long, default_value_t = 600)]
    pub train_iters: usize,
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 0.0003)]
    pub lr: f64,
    #[arg(long, default_value_t = 0.5)]
    pub beta1: f64,
    #[arg(long, default_value_t = 0.999)]
    pub beta2: f64,

    #[arg(short = 'X', long = "x", value_enum, default_value_t = EmojiType::Apple)]
    pub x: EmojiType,
    #[arg(short = 'Y', long = "y", value_enum, default_value_t = EmojiType::Windows)]
    pub y: EmojiType,
    #[arg(long, default_value = "emojis")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "checkpoints_cyclegan")]
    pub checkpoint_dir: PathBuf,
    #[arg(long, default_value = "samples_cyclegan")]
    pub sample_dir: PathBuf,
    /// Restore G.ot / D.ot from this directory before training.
    #[arg(long)]
    pub load: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    pub log_step: usize,
    #[arg(long, default_value_t = 100)]
    pub sample_every: usize,
    #[arg(long, default_value_t = 800)]
    pub checkpoint_every: usize,
}

impl Default for CycleOptions {
    fn default() -> Self {
        CycleOptions::parse_from(["cycle"])
    }
}

impl CycleOptions {
    pub fn validate(&self) -> Result<()> {
        check_image_size(self.image_size)?;
        check_positive("g_conv_dim", self.g_conv_dim)?;
        check_positive("d_conv_dim", self.d_conv_dim)?;
        check_positive("train_iters", self.train_iters as i64)?;
        check_positive("batch_size", self.batch_size as i64)?;
        check_adam(self.lr, self.beta1, self.beta2)?;
        if self.lambda_cycle.is_nan() || self.lambda_cycle < 0.0 {
            return Err(GanError::invalid("lambda_cycle", "must be non-negative"));
        }
        if self.x == self.y {
            return Err(GanError::invalid("x", format!("X and Y are both {}", self.x)));
        }
        check_cadence(self.log_step, self.sample_every, self.checkpoint_every)
    }
}

fn check_image_size(image_size: i64) -> Result<()> {
    if image_size != IMAGE_SIZE {
        return Err(GanError::invalid("image_size",
                                     format!("models are built for {IMAGE_SIZE}, got {image_size}")));
    }
    Ok(())
}

fn check_positive(name: &'static str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(GanError::invalid(name, format!("must be positive, got {value}")));
    }
    Ok(())
}

fn check_adam(lr: f64, beta1: f64, beta2: f64) -> Result<()> {
    if lr.is_nan() || lr <= 0.0 {
        return Err(GanError::invalid("lr", format!("must be positive, got {lr}")));
    }
    for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
        if !(0.0..1.0).contains(&beta) {
            return Err(GanError::invalid(name, format!("must be in [0, 1), got {beta}")));
        }
    }
    Ok(())
}

fn check_cadence(log_step: usize, sample_every: usize, checkpoint_every: usize) -> Result<()> {
    check_positive("log_step", log_step as i64)?;
    check_positive("sample_every", sample_every as i64)?;
    check_positive("checkpoint_every", checkpoint_every as i64)
}
