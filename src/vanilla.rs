//! Vanilla GAN: a DCGAN generator against a convolutional discriminator,
//! trained with the least-squares objective.

use std::fs;
use std::path::Path;

use rand::Rng;
use tch::{nn, nn::ModuleT, nn::OptimizerConfig, Device, Kind, Tensor};
use tqdm::tqdm;
use tracing::{debug, info};

use crate::checkpoint;
use crate::config::VanillaOptions;
use crate::data::EmojiDataset;
use crate::discriminator::DCDiscriminator;
use crate::error::{GanError, Result};
use crate::generator::DCGenerator;
use crate::losses::{fake_loss, generator_loss, real_loss, scalar, LossHistory};
use crate::samples;

/// Number of fixed noise vectors rendered at every sampling step (a 4x4 grid).
pub const NUM_SAMPLES: i64 = 16;

/// Uniform noise in [-1, 1], shaped `[batch_size, noise_size, 1, 1]`.
pub fn sample_noise(batch_size: i64, noise_size: i64, device: Device) -> Tensor {
    Tensor::rand([batch_size, noise_size, 1, 1], (Kind::Float, device)) * 2.0 - 1.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub d_real: f64,
    pub d_fake: f64,
    pub g: f64,
}

impl StepLosses {
    pub fn d_total(&self) -> f64 {
        self.d_real + self.d_fake
    }
}

pub struct VanillaGan {
    pub g_vs: nn::VarStore,
    pub d_vs: nn::VarStore,
    pub generator: DCGenerator,
    pub discriminator: DCDiscriminator,
    optimizer_g: nn::Optimizer,
    optimizer_d: nn::Optimizer,
    device: Device,
    batch_size: i64,
}

impl VanillaGan {
    pub fn new(opts: &VanillaOptions, device: Device) -> Result<VanillaGan> {
        // Build Generator
        let g_vs = nn::VarStore::new(device);
        let generator = DCGenerator::new(g_vs.root(), opts.noise_size, opts.conv_dim);
        let optimizer_g = nn::adam(opts.beta1, opts.beta2, 0.).build(&g_vs, opts.lr)?;

        // Build Discriminator
        let d_vs = nn::VarStore::new(device);
        let discriminator = DCDiscriminator::new(d_vs.root(), opts.conv_dim);
        let optimizer_d = nn::adam(opts.beta1, opts.beta2, 0.).build(&d_vs, opts.lr)?;

        Ok(VanillaGan {
            g_vs, d_vs, generator, discriminator, optimizer_g, optimizer_d, device,
            batch_size: opts.batch_size as i64,
        })
    }

    pub fn noise(&self, batch_size: i64) -> Tensor {
        sample_noise(batch_size, self.generator.noise_size(), self.device)
    }

    /// `G(z)` in train mode for a full configured batch of noise, whatever
    /// the size of the real batch it is paired with.
    pub fn sample_fakes(&self) -> Tensor {
        self.noise(self.batch_size).apply_t(&self.generator, true)
    }

    /// One discriminator update followed by one generator update on `real`.
    pub fn train_step(&mut self, real: &Tensor) -> StepLosses {
        // Train Discriminator
        self.d_vs.unfreeze();
        self.g_vs.freeze();
        let d_real_loss = real_loss(&real.apply_t(&self.discriminator, true));
        let fake_images = self.sample_fakes().detach();
        let d_fake_loss = fake_loss(&fake_images.apply_t(&self.discriminator, true));
        let d_loss = &d_real_loss + &d_fake_loss;
        self.optimizer_d.backward_step(&d_loss);

        // Train Generator
        self.d_vs.freeze();
        self.g_vs.unfreeze();
        let g_loss = generator_loss(&self.sample_fakes().apply_t(&self.discriminator, true));
        self.optimizer_g.backward_step(&g_loss);

        StepLosses { d_real: scalar(&d_real_loss), d_fake: scalar(&d_fake_loss), g: scalar(&g_loss) }
    }

    /// Renders `G(noise)` in eval mode as one grid image.
    pub fn save_samples(&self, noise: &Tensor, path: &Path) -> Result<()> {
        let images = tch::no_grad(|| noise.apply_t(&self.generator, false));
        samples::save_grid(path, &images)
    }

    pub fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        checkpoint::save(dir, &[("G", &self.g_vs), ("D", &self.d_vs)])
    }

    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<()> {
        checkpoint::load(dir, &mut [("G", &mut self.g_vs), ("D", &mut self.d_vs)])
    }
}

/// Rebuilds the generator recorded in `dir/opts.json` and restores its
/// weights from `dir/G.ot`.
pub fn load_generator(dir: &Path, device: Device) -> Result<(nn::VarStore, DCGenerator)> {
    let opts_path = dir.join("opts.json");
    if !opts_path.is_file() {
        return Err(GanError::MissingCheckpoint(opts_path));
    }
    let saved: VanillaOptions = serde_json::from_str(&fs::read_to_string(&opts_path)?)?;

    let mut vs = nn::VarStore::new(device);
    let generator = DCGenerator::new(vs.root(), saved.noise_size, saved.conv_dim);
    checkpoint::load(dir, &mut [("G", &mut vs)])?;
    Ok((vs, generator))
}

/// Trains on `{data_dir}/{emoji}` for `num_epochs` epochs and returns the
/// per-epoch mean losses.
pub fn train<R: Rng>(opts: &VanillaOptions, device: Device, rng: &mut R) -> Result<LossHistory> {
    opts.validate()?;

    let train_dir = opts.emoji.train_dir(&opts.data_dir);
    info!("Loading Dataset from {}", train_dir.display());
    let dataset = EmojiDataset::load(&train_dir, opts.image_size)?;
    info!("Loaded {} images", dataset.len());

    fs::create_dir_all(&opts.sample_dir)?;

    let mut gan = VanillaGan::new(opts, device)?;
    if let Some(dir) = &opts.load {
        gan.load_checkpoint(dir)?;
    }
    checkpoint::write_options(&opts.checkpoint_dir, opts)?;

    let fixed_noise = gan.noise(NUM_SAMPLES);
    let total_train_iters = opts.num_epochs * dataset.num_batches(opts.batch_size);
    let mut history = LossHistory::new();
    let mut iteration = 1;

    for epoch in tqdm(0..opts.num_epochs) {
        debug!("Epoch: {}/{}", epoch + 1, opts.num_epochs);

        for batch in dataset.batches(opts.batch_size, device, rng) {
            let losses = gan.train_step(&batch);
            history.record(losses.g, losses.d_total());

            if iteration % opts.log_step == 0 {
                info!("Iteration [{:4}/{:4}] | D_real_loss: {:6.4} | D_fake_loss: {:6.4} | G_loss: {:6.4}",
                      iteration, total_train_iters, losses.d_real, losses.d_fake, losses.g);
            }

            if iteration % opts.sample_every == 0 {
                let path = opts.sample_dir.join(format!("sample-{iteration:06}.png"));
                gan.save_samples(&fixed_noise, &path)?;
                debug!("Saved {}", path.display());
            }

            if iteration % opts.checkpoint_every == 0 {
                gan.save_checkpoint(&opts.checkpoint_dir)?;
            }

            iteration += 1;
        }

        if let Some((g, d)) = history.end_epoch() {
            debug!(epoch = epoch + 1, generator = g, discriminator = d, "epoch mean losses");
        }
    }

    let losses_path = opts.sample_dir.join("losses.json");
    history.save(&losses_path)?;
    info!("Wrote {} epoch losses to {}", history.epochs(), losses_path.display());
    Ok(history)
}
